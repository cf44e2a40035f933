//! App - アプリケーション層
//!
//! ports を組み合わせて3つのプロセスロールの振る舞いを作る:
//! - **CleanupJob**: 論理削除されたレコードとファイルを消す
//! - **Supervisor**: N 個の worker プロセスを維持 (coordinator)
//! - **uploads**: HTTP 層から呼ばれるレコード操作
//! - **RetryPolicy**: worker 再起動のバックオフ

pub mod cleanup;
pub mod retry;
pub mod supervisor;
pub mod uploads;

pub use self::cleanup::{CleanupJob, CleanupReport, RecordFailure};
pub use self::retry::RetryPolicy;
pub use self::supervisor::{ExitAction, Step, Supervisor};
pub use self::uploads::{UploadPolicy, UploadedFile};
