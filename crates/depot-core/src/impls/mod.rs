//! Impls - ports の実装
//!
//! # 含まれるもの
//! - **InMemoryThingStore**: テスト用ドキュメントストア
//! - **DocumentDirStore**: プロセス間で共有するディスク上のドキュメントストア
//! - **LocalFileSystem**: `tokio::fs` によるファイル操作
//! - **ProcessLauncher**: 子プロセスとしての worker
//! - **SubprocessAction**: 子プロセスとして動く定期ジョブ

pub mod document_dir;
pub mod inmem_store;
pub mod local_fs;
pub mod process;
pub mod subprocess_action;

pub use self::document_dir::DocumentDirStore;
pub use self::inmem_store::InMemoryThingStore;
pub use self::local_fs::LocalFileSystem;
pub use self::process::ProcessLauncher;
pub use self::subprocess_action::SubprocessAction;
