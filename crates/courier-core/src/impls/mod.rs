//! Impls - ports の実装
//!
//! - TelegramDocumentClient: document channel over the Bot API
//! - ReqwestUploadClient: JSON ingest endpoint
//! - FsSourceRecordLookup / JsonArtifactBuilder: canonical records on disk
//! - TcpProbe: connectivity check

pub mod connectivity;
pub mod fs_source;
pub mod http;
pub mod http_upload;
pub mod telegram;

pub use self::connectivity::TcpProbe;
pub use self::fs_source::{FsSourceRecordLookup, JsonArtifactBuilder};
pub use self::http::HttpTimeouts;
pub use self::http_upload::{DEFAULT_INGEST_PATH, ReqwestUploadClient};
pub use self::telegram::{DEFAULT_BOT_API_BASE, TelegramDocumentClient};
