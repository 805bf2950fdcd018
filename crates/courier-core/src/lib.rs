//! courier-core
//!
//! Durable outbox for delivering finished-match artifacts to external channels.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（OutboxKey, OutboxItem, DeliveryStatus, errors）
//! - **store**: 永続化された outbox（OutboxStore trait, FileOutboxStore）
//! - **ports**: 抽象化レイヤー（transport clients, source lookup, settings, clock, connectivity）
//! - **app**: 配送ロジック（RetryDriver, SweepScheduler, Enqueuer, CourierBuilder）
//! - **impls**: ports の実装（reqwest clients, file-backed records, TCP probe）
//! - **config**: 設定ファイルと環境変数

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod store;

pub use crate::config::{ConfigError, CourierConfig};
