//! App - アプリケーション層
//!
//! ports と store を組み合わせて配送ロジックを実装します。
//!
//! # 主要コンポーネント
//! - **RetryDriver**: 1 回の sweep（claim→resolve→send→record）
//! - **SweepScheduler**: sweep の起動、重複排除、接続待ち、バックオフ
//! - **Enqueuer**: 生産者からの投入口
//! - **CourierBuilder**: 構成からのワイヤリング

pub mod backoff;
pub mod builder;
pub mod channel;
pub mod driver;
pub mod enqueue;
pub mod policy;
pub mod resolver;
pub mod scheduler;

// 主要な型を再エクスポート
pub use self::backoff::RetryPolicy;
pub use self::builder::{BuildError, Courier, CourierBuilder, DOCUMENT_JOB, HTTP_JOB};
pub use self::channel::{DeliveryChannel, DocumentChannel, HttpIngestChannel};
pub use self::driver::{RetryDriver, SweepReport};
pub use self::enqueue::{EnqueueError, Enqueuer};
pub use self::policy::{DriverPolicy, PermanentFailurePolicy};
pub use self::resolver::ArtifactResolver;
pub use self::scheduler::{
    JobId, SchedulerConfig, SchedulerError, SweepHandle, SweepJob, SweepOutcome, SweepRegistry,
    SweepScheduler,
};
