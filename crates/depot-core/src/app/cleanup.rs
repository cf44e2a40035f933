//! CleanupJob - 論理削除されたレコードとそのファイルを消す
//!
//! # フロー
//! 1. `is_deleted = true` のレコードをすべて取得
//! 2. レコードごとに `JoinSet` 上で並行に処理:
//!    - `path` 属性がない、またはファイルが既にない: レコードだけ削除
//!    - ファイルがある: ファイルを消してからレコードを削除
//! 3. 全件の完了を待ち `CleanupReport` を返す
//!
//! ファイル削除に失敗したレコードはストアに残り、次回の実行で再試行される。
//! ファイルは消えたがレコード削除に失敗した場合は、次回ファイル欠落の
//! 分岐で回収される。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::domain::{Thing, ThingFilter, ThingId};
use crate::error::{CleanupError, FileSystemError, JobError, PersistenceError};
use crate::ports::{FileSystem, JobAction, ThingStore};

/// Per-record failure collected by a run.
#[derive(Debug)]
pub struct RecordFailure {
    pub id: ThingId,
    pub error: CleanupError,
}

/// Summary of one cleanup run.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Records removed from the store.
    pub purged: usize,
    pub files_removed: usize,
    /// Records whose file was already gone (or never recorded).
    pub missing_files: usize,
    pub failures: Vec<RecordFailure>,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.purged + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purged {
    WithFile,
    RecordOnly,
}

pub struct CleanupJob {
    store: Arc<dyn ThingStore>,
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl CleanupJob {
    /// `root` is the directory relative `path` attributes resolve against.
    pub fn new(store: Arc<dyn ThingStore>, fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            fs,
            root: root.into(),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Only a failure to list the deleted records fails the whole run;
    /// everything else lands in `CleanupReport::failures`.
    pub async fn run(&self) -> Result<CleanupReport, CleanupError> {
        let deleted = self.store.find(ThingFilter::deleted()).await?;
        if deleted.is_empty() {
            tracing::info!("nothing to do");
            return Ok(CleanupReport::default());
        }
        tracing::info!(records = deleted.len(), root = %self.root.display(), "cleanup started");

        let mut tasks = JoinSet::new();
        for thing in deleted {
            let id = thing.id;
            let store = Arc::clone(&self.store);
            let fs = Arc::clone(&self.fs);
            let root = self.root.clone();
            tasks.spawn(async move {
                // inner task so a panic is attributed to its record
                let joined = tokio::spawn(async move { reconcile(&*store, &*fs, &root, thing).await }).await;
                let result = match joined {
                    Ok(result) => result,
                    Err(e) => Err(CleanupError::Aborted(e.to_string())),
                };
                (id, result)
            });
        }

        let mut report = CleanupReport::default();
        while let Some(joined) = tasks.join_next().await {
            let (id, result) = match joined {
                Ok(settled) => settled,
                // outer tasks only await the inner one; never cancelled
                Err(e) => {
                    tracing::error!(error = %e, "reconciliation task lost");
                    continue;
                }
            };
            match result {
                Ok(purged) => {
                    report.purged += 1;
                    match purged {
                        Purged::WithFile => report.files_removed += 1,
                        Purged::RecordOnly => report.missing_files += 1,
                    }
                }
                Err(error) => {
                    tracing::error!(thing_id = %id, error = %error, "failed to purge record");
                    report.failures.push(RecordFailure { id, error });
                }
            }
        }

        tracing::info!(
            purged = report.purged,
            files_removed = report.files_removed,
            missing_files = report.missing_files,
            failed = report.failures.len(),
            "end clean up"
        );
        Ok(report)
    }
}

#[async_trait]
impl JobAction for CleanupJob {
    async fn run(&self) -> Result<(), JobError> {
        let report = CleanupJob::run(self).await?;
        if report.is_complete() {
            Ok(())
        } else {
            Err(JobError::Incomplete {
                failed: report.failures.len(),
                total: report.total(),
            })
        }
    }
}

/// Absolute paths are kept as they are; relative ones hang off `root`.
fn resolve(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

async fn reconcile(
    store: &dyn ThingStore,
    fs: &dyn FileSystem,
    root: &Path,
    thing: Thing,
) -> Result<Purged, CleanupError> {
    let id = thing.id;
    let purged = match thing.path() {
        None => {
            tracing::warn!(thing_id = %id, "record has no path attribute");
            Purged::RecordOnly
        }
        Some(path) => {
            let full_path = resolve(root, path);
            if fs.exists(&full_path).await? {
                tracing::info!(thing_id = %id, path = %full_path.display(), "found file");
                match fs.remove(&full_path).await {
                    Ok(()) => Purged::WithFile,
                    Err(FileSystemError::NotFound(_)) => {
                        tracing::debug!(thing_id = %id, path = %full_path.display(), "file vanished before removal");
                        Purged::RecordOnly
                    }
                    Err(e) => return Err(e.into()),
                }
            } else {
                tracing::warn!(thing_id = %id, path = %full_path.display(), "file not found");
                Purged::RecordOnly
            }
        }
    };

    match store.delete_one(id).await {
        Ok(()) => {}
        Err(PersistenceError::NotFound(_)) => {
            tracing::debug!(thing_id = %id, "record already removed");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(purged)
}
