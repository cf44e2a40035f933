//! depot-core
//!
//! アップロードサービス depot のコア。レコードストア、cleanup ジョブ、
//! cron スケジューラ、worker supervisor を持つ。
//!
//! # モジュール構成
//! - **domain**: レコード、ID、ジョブ定義/イベント、worker スロット
//! - **ports**: 外部との境界 (ThingStore, FileSystem, Clock, JobAction, WorkerLauncher)
//! - **impls**: ports の実装 (インメモリ/ディスクのストア、ローカル fs、子プロセス)
//! - **schedule**: cron 式、スケジューラ、ジョブカタログ
//! - **app**: cleanup ジョブ、supervisor、アップロードレコード操作
//! - **config**: プロセス設定とスケジュールファイル
//! - **observability**: ログ設定
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod schedule;
