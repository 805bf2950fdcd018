//! TCP reachability probe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::ports::Connectivity;

/// Online when a TCP connection to `target` (host:port) opens within `timeout`.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    target: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_online(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.target.as_str())).await {
            Ok(Ok(_)) => true,
            Ok(Err(err)) => {
                debug!(target = %self.target, error = %err, "connectivity probe failed");
                false
            }
            Err(_) => {
                debug!(target = %self.target, "connectivity probe timed out");
                false
            }
        }
    }
}
