//! Configuration management.
//!
//! A JSON file (every key optional) overlaid with `COURIER_*` environment
//! variables. The CLI applies its own flags last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::backoff::RetryPolicy;
use crate::app::policy::{DriverPolicy, PermanentFailurePolicy};
use crate::app::scheduler::SchedulerConfig;
use crate::impls::{DEFAULT_BOT_API_BASE, DEFAULT_INGEST_PATH, HttpTimeouts};
use crate::ports::ChannelSettings;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const ENV_PREFIX: &str = "COURIER_";

pub const DOCUMENT_STORE_FILE: &str = "document-outbox.json";
pub const HTTP_STORE_FILE: &str = "http-outbox.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: String, value: String },
}

/// Per-driver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSection {
    /// Unset uses the driver's own cap (document 8, http 30).
    pub max_attempts: Option<u32>,
    pub permanent_failures: PermanentFailurePolicy,
    pub reconstruct: bool,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            max_attempts: None,
            permanent_failures: PermanentFailurePolicy::Retry,
            reconstruct: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
    /// `host:port` probed before each sweep. Unset means always online.
    pub connectivity_probe: Option<String>,
    pub connectivity_poll_ms: u64,
    pub max_retries: Option<u32>,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            base_delay_ms: 30_000,
            max_delay_ms: 5 * 60 * 60 * 1000,
            jitter: 0.1,
            connectivity_probe: None,
            connectivity_poll_ms: 5_000,
            max_retries: None,
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    /// Holds the two outbox store files.
    pub data_dir: PathBuf,
    /// Where exported artifacts are expected.
    pub export_dir: PathBuf,
    /// Canonical finished-match records.
    pub source_dir: PathBuf,

    pub channel_token: String,
    pub chat_id: String,
    pub http_base_url: String,
    pub api_key: String,

    pub document_api_base: String,
    pub ingest_path: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,

    pub document: DriverSection,
    pub http: DriverSection,
    pub scheduler: SchedulerSection,

    pub claim_timeout_ms: u64,
    /// Unset keeps delivered items forever.
    pub retain_sent_days: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            export_dir: PathBuf::from("exports"),
            source_dir: PathBuf::from("records"),
            channel_token: String::new(),
            chat_id: String::new(),
            http_base_url: String::new(),
            api_key: String::new(),
            document_api_base: DEFAULT_BOT_API_BASE.to_string(),
            ingest_path: DEFAULT_INGEST_PATH.to_string(),
            connect_timeout_ms: 10_000,
            read_timeout_ms: 15_000,
            document: DriverSection::default(),
            http: DriverSection::default(),
            scheduler: SchedulerSection::default(),
            claim_timeout_ms: 10 * 60 * 1000,
            retain_sent_days: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl CourierConfig {
    /// Defaults, then the file if it exists, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override from `COURIER_<FIELD>` variables, looked up through `get`.
    pub fn apply_env_from(
        &mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |field: &str| get(&format!("{ENV_PREFIX}{field}"));

        if let Some(v) = var("DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("EXPORT_DIR") {
            self.export_dir = PathBuf::from(v);
        }
        if let Some(v) = var("SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = var("CHANNEL_TOKEN") {
            self.channel_token = v;
        }
        if let Some(v) = var("CHAT_ID") {
            self.chat_id = v;
        }
        if let Some(v) = var("HTTP_BASE_URL") {
            self.http_base_url = v;
        }
        if let Some(v) = var("API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = var("CONNECTIVITY_PROBE") {
            self.scheduler.connectivity_probe = (!v.trim().is_empty()).then_some(v);
        }
        if let Some(v) = var("RETAIN_SENT_DAYS") {
            self.retain_sent_days = Some(parse_env("RETAIN_SENT_DAYS", &v)?);
        }
        if let Some(v) = var("CLAIM_TIMEOUT_MS") {
            self.claim_timeout_ms = parse_env("CLAIM_TIMEOUT_MS", &v)?;
        }
        Ok(())
    }

    pub fn document_store_path(&self) -> PathBuf {
        self.data_dir.join(DOCUMENT_STORE_FILE)
    }

    pub fn http_store_path(&self) -> PathBuf {
        self.data_dir.join(HTTP_STORE_FILE)
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            channel_token: self.channel_token.clone(),
            chat_id: self.chat_id.clone(),
            http_base_url: self.http_base_url.clone(),
            api_key: self.api_key.clone(),
        }
    }

    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            read: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn document_policy(&self) -> DriverPolicy {
        self.driver_policy(&self.document, DriverPolicy::document())
    }

    pub fn http_policy(&self) -> DriverPolicy {
        self.driver_policy(&self.http, DriverPolicy::http())
    }

    fn driver_policy(&self, section: &DriverSection, base: DriverPolicy) -> DriverPolicy {
        DriverPolicy {
            max_attempts: section.max_attempts.unwrap_or(base.max_attempts),
            permanent_failures: section.permanent_failures,
            reconstruct: section.reconstruct,
            claim_timeout: Duration::from_millis(self.claim_timeout_ms),
            retain_sent: self
                .retain_sent_days
                .map(|days| Duration::from_secs(days.saturating_mul(86_400))),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        let section = &self.scheduler;
        SchedulerConfig {
            backoff: RetryPolicy {
                base_delay: Duration::from_millis(section.base_delay_ms),
                max_delay: Duration::from_millis(section.max_delay_ms),
                jitter: section.jitter,
                ..RetryPolicy::default()
            },
            connectivity_poll: Duration::from_millis(section.connectivity_poll_ms),
            max_retries: section.max_retries,
        }
    }
}

fn parse_env<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name: format!("{ENV_PREFIX}{field}"),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = CourierConfig::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.document_policy().max_attempts, 8);
        assert_eq!(config.http_policy().max_attempts, 30);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.read_timeout_ms, 15_000);
        assert_eq!(config.retain_sent_days, None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.json");
        std::fs::write(
            &path,
            r#"{
                "chat_id": "42",
                "document": { "max_attempts": 3 },
                "http": { "permanent_failures": "give_up" },
                "scheduler": { "base_delay_ms": 1000 }
            }"#,
        )
        .unwrap();

        let config = CourierConfig::load_from_file(&path).unwrap();
        assert_eq!(config.chat_id, "42");
        assert_eq!(config.http_policy().max_attempts, 30);
        assert_eq!(config.http_policy().permanent_failures, PermanentFailurePolicy::GiveUp);
        assert_eq!(config.document_policy().max_attempts, 3);
        assert_eq!(config.scheduler.base_delay_ms, 1000);
        assert_eq!(config.scheduler.jitter, 0.1);
    }

    #[test]
    fn test_unparsable_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("courier.json");
        std::fs::write(&path, "{").unwrap();
        assert!(matches!(
            CourierConfig::load_from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("COURIER_CHANNEL_TOKEN", "tok"),
            ("COURIER_DATA_DIR", "/var/lib/courier"),
            ("COURIER_RETAIN_SENT_DAYS", "30"),
        ]);
        let mut config = CourierConfig::default();
        config
            .apply_env_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.channel_token, "tok");
        assert_eq!(config.document_store_path(), PathBuf::from("/var/lib/courier/document-outbox.json"));
        assert_eq!(
            config.document_policy().retain_sent,
            Some(Duration::from_secs(30 * 86_400))
        );
    }

    #[test]
    fn test_invalid_env_number() {
        let mut config = CourierConfig::default();
        let err = config
            .apply_env_from(|name| (name == "COURIER_CLAIM_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
