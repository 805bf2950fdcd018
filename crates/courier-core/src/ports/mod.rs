//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（配送先、正本、設定、時刻、ネットワーク）へのインターフェース。
//! Implementations live in `impls`; tests substitute their own.

pub mod clock;
pub mod connectivity;
pub mod settings;
pub mod source;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connectivity::{AlwaysOnline, Connectivity};
pub use self::settings::{ChannelSettings, SettingsProvider, StaticSettings};
pub use self::source::{ArtifactBuilder, SourceRecordLookup};
pub use self::transport::{DocumentChannelClient, HttpUploadClient};

/// Error returned by collaborators whose failures are only reported, never matched on.
pub type PortError = Box<dyn std::error::Error + Send + Sync>;
