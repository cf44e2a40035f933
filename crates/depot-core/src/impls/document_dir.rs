//! DocumentDirStore - ディレクトリに1レコード1 JSON ドキュメントで保存
//!
//! # レイアウト
//! - `<dir>/<ulid>.json` に `Thing` を1つ
//! - 書き込みは `<dir>/.<ulid>.<pid>.<nonce>.tmp` に書いてから rename
//!   するので、読み手には旧か新のどちらかしか見えない
//!
//! デプロイ内の全プロセスが同じディレクトリを開く。一時ファイルは書き込み
//! ごとに別なので、同じレコードへの並行更新は後勝ちになり、書きかけの
//! ドキュメントが見えることはない。
//!
//! 壊れたドキュメントは走査時にログを出して読み飛ばす。id 指定の読み込み
//! ではエラーのまま。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{NewThing, Thing, ThingFilter, ThingId, ThingUpdate};
use crate::error::PersistenceError;
use crate::ports::{Clock, IdGenerator, SystemClock, ThingStore, UlidGenerator};

const DOC_EXT: &str = "json";

pub struct DocumentDirStore {
    dir: PathBuf,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl DocumentDirStore {
    /// Open (and create if needed) the document directory.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        Self::open_with_clock(dir, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        dir: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            PersistenceError::Unavailable(format!("cannot open {}: {e}", dir.display()))
        })?;
        let meta = tokio::fs::metadata(&dir).await?;
        if !meta.is_dir() {
            return Err(PersistenceError::Unavailable(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        tracing::debug!(dir = %dir.display(), "document store opened");
        Ok(Self {
            dir,
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn doc_path(&self, id: ThingId) -> PathBuf {
        self.dir.join(format!("{}.{DOC_EXT}", id.as_ulid()))
    }

    fn tmp_path(&self, id: ThingId) -> PathBuf {
        let nonce: u64 = rand::random();
        self.dir.join(format!(
            ".{}.{}.{nonce:016x}.tmp",
            id.as_ulid(),
            std::process::id()
        ))
    }

    async fn read_doc(&self, path: &Path) -> Result<Option<Thing>, PersistenceError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            // removed between listing and reading
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Decode {
                path: path.to_path_buf(),
                source,
            })
    }

    async fn write_doc(&self, thing: &Thing) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(thing).map_err(PersistenceError::Encode)?;
        let tmp = self.tmp_path(thing.id);
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, self.doc_path(thing.id)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
                && cleanup.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp document");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn load(&self, id: ThingId) -> Result<Thing, PersistenceError> {
        self.read_doc(&self.doc_path(id))
            .await?
            .ok_or(PersistenceError::NotFound(id))
    }

    async fn load_all(&self) -> Result<Vec<Thing>, PersistenceError> {
        let mut things = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_doc = path.extension().is_some_and(|ext| ext == DOC_EXT)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if !is_doc {
                continue;
            }
            match self.read_doc(&path).await {
                Ok(Some(thing)) => things.push(thing),
                Ok(None) => {}
                Err(e @ PersistenceError::Decode { .. }) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed document");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(things)
    }
}

#[async_trait]
impl ThingStore for DocumentDirStore {
    async fn find(&self, filter: ThingFilter) -> Result<Vec<Thing>, PersistenceError> {
        if let Some(id) = filter.id {
            let found = self.read_doc(&self.doc_path(id)).await?;
            return Ok(filter.select(found));
        }
        Ok(filter.select(self.load_all().await?))
    }

    async fn insert(&self, new: NewThing) -> Result<Thing, PersistenceError> {
        let now = self.clock.now();
        let thing = Thing {
            id: self.ids.generate_thing_id(),
            is_deleted: false,
            attrs: new.attrs,
            created_at: now,
            updated_at: now,
        };
        self.write_doc(&thing).await?;
        Ok(thing)
    }

    async fn update_one(
        &self,
        id: ThingId,
        update: ThingUpdate,
    ) -> Result<Thing, PersistenceError> {
        let mut thing = self.load(id).await?;
        update.apply(&mut thing, self.clock.now());
        self.write_doc(&thing).await?;
        Ok(thing)
    }

    async fn delete_one(&self, id: ThingId) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.doc_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PersistenceError::NotFound(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}
