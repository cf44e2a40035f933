//! ThingStore port - the document store holding upload records.
//!
//! Every operation is a single-document operation; there are no
//! cross-record transactions. Implementations must be safe to share
//! between the coordinator and all tasks of a worker.
//!
//! # Implementations
//! - `InMemoryThingStore`: tests and single-process runs
//! - `DocumentDirStore`: one JSON document per record on disk, shared by
//!   every process of a deployment

use async_trait::async_trait;

use crate::domain::{NewThing, Thing, ThingFilter, ThingId, ThingUpdate};
use crate::error::PersistenceError;

#[async_trait]
pub trait ThingStore: Send + Sync {
    /// Records matching `filter`, sorted and paged as it asks.
    async fn find(&self, filter: ThingFilter) -> Result<Vec<Thing>, PersistenceError>;

    /// Store a new record. Assigns id, `is_deleted = false` and timestamps.
    async fn insert(&self, new: NewThing) -> Result<Thing, PersistenceError>;

    /// Apply `update` to one record and return it as stored.
    async fn update_one(
        &self,
        id: ThingId,
        update: ThingUpdate,
    ) -> Result<Thing, PersistenceError>;

    /// Remove one record. Unknown ids fail with `NotFound`.
    async fn delete_one(&self, id: ThingId) -> Result<(), PersistenceError>;
}
