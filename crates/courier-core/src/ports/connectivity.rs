//! Connectivity port - ネットワーク到達性

use async_trait::async_trait;

/// Precondition checked by the scheduler before a sweep starts.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// For deployments without a probe target.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}
