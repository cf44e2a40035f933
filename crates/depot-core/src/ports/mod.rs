//! Ports - 抽象化層
//!
//! 各 trait はコアの外側との境界: ドキュメントストア、ファイルシステム、
//! 壁時計、worker プロセス、ジョブのエントリポイント。実装は `impls` にある。

pub mod clock;
pub mod file_system;
pub mod id_generator;
pub mod job_action;
pub mod thing_store;
pub mod worker_launcher;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::file_system::FileSystem;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_action::JobAction;
pub use self::thing_store::ThingStore;
pub use self::worker_launcher::{WorkerLauncher, WorkerProcess};
