//! Upload records: what the HTTP layer calls on upload, listing and delete.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Attr, NewThing, Thing, ThingFilter, ThingId, ThingUpdate};
use crate::error::{PersistenceError, UploadError};
use crate::ports::ThingStore;

/// Attributes a listing exposes.
pub const LISTED_ATTRS: &[&str] = &["filename", "size"];

pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Extension token -> the MIME type it is expected to arrive with.
const KNOWN_TYPES: &[(&str, &str)] = &[
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("png", "image/png"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
];

/// A file the storage engine has already written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub fieldname: String,
    pub originalname: String,
    pub encoding: String,
    pub mimetype: String,
    pub destination: String,
    pub filename: String,
    pub path: String,
    pub size: u64,
}

impl UploadedFile {
    fn into_attrs(self) -> Vec<Attr> {
        vec![
            Attr::new("fieldname", self.fieldname),
            Attr::new("originalname", self.originalname),
            Attr::new("encoding", self.encoding),
            Attr::new("mimetype", self.mimetype),
            Attr::new("destination", self.destination),
            Attr::new("filename", self.filename),
            Attr::new("path", self.path),
            Attr::new("size", self.size),
        ]
    }
}

/// Which files are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Lowercase extension tokens.
    pub allowed: Vec<String>,
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed: ["jpeg", "jpg", "png", "xlsx"].map(String::from).to_vec(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl UploadPolicy {
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Accept when the extension is allowed, the MIME type belongs to an
    /// allowed token, and the size is within the limit.
    pub fn check(&self, original_name: &str, mimetype: &str, size: u64) -> Result<(), UploadError> {
        let ext = extension(original_name).map(str::to_ascii_lowercase);
        let ext_ok = ext.is_some_and(|ext| self.allowed.iter().any(|token| *token == ext));
        if !ext_ok || !self.mime_allowed(mimetype) {
            return Err(UploadError::NotAllowed {
                name: original_name.to_string(),
                mimetype: mimetype.to_string(),
            });
        }
        if size > self.max_bytes {
            return Err(UploadError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    fn mime_allowed(&self, mimetype: &str) -> bool {
        let mimetype = mimetype.to_ascii_lowercase();
        self.allowed.iter().any(|token| {
            match KNOWN_TYPES.iter().find(|(known, _)| *known == token.as_str()) {
                Some((_, mime)) => *mime == mimetype,
                None => mimetype.contains(token.as_str()),
            }
        })
    }
}

fn extension(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}

/// Name a stored file gets: `<fieldname>-<unix millis><.ext>`.
pub fn stored_filename(fieldname: &str, original_name: &str, now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis();
    match extension(original_name) {
        Some(ext) => format!("{fieldname}-{millis}.{ext}"),
        None => format!("{fieldname}-{millis}"),
    }
}

/// Store the metadata of an accepted upload.
pub async fn record_upload(store: &dyn ThingStore, file: UploadedFile) -> Result<Thing, PersistenceError> {
    let thing = store.insert(NewThing::new(file.into_attrs())).await?;
    tracing::info!(thing_id = %thing.id, path = thing.path(), "file successfully created");
    Ok(thing)
}

/// One page of live records, newest first, with only the listed
/// attributes. Pages start at 1; 0 is read as 1.
pub async fn list_page(
    store: &dyn ThingStore,
    page: usize,
    per_page: usize,
) -> Result<Vec<Thing>, PersistenceError> {
    let skip = page.max(1).saturating_sub(1).saturating_mul(per_page);
    let mut things = store.find(ThingFilter::live().page(skip, per_page)).await?;
    for thing in &mut things {
        thing.retain_attrs(LISTED_ATTRS);
    }
    Ok(things)
}

/// Flag a live record as deleted. Its file stays until the cleanup job
/// runs.
pub async fn soft_delete(store: &dyn ThingStore, id: ThingId) -> Result<Thing, PersistenceError> {
    let live = store.find(ThingFilter::live().with_id(id)).await?;
    if live.is_empty() {
        return Err(PersistenceError::NotFound(id));
    }
    let thing = store.update_one(id, ThingUpdate::soft_delete()).await?;
    tracing::info!(thing_id = %id, "file successfully set as deleted");
    Ok(thing)
}
