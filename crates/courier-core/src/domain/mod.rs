//! Domain model (keys, artifact references, items, states, errors).

pub mod artifact;
pub mod errors;
pub mod item;
pub mod key;
pub mod state;

pub use artifact::{ArtifactRef, ExportFileRef, UploadBodyRef};
pub use errors::{DeliveryError, FailureKind, ResolveError, StoreError};
pub use item::OutboxItem;
pub use key::OutboxKey;
pub use state::DeliveryStatus;
