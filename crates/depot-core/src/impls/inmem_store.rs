//! InMemoryThingStore - development/test document store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{NewThing, Thing, ThingFilter, ThingId, ThingUpdate};
use crate::error::PersistenceError;
use crate::ports::{Clock, IdGenerator, SystemClock, ThingStore, UlidGenerator};

/// HashMap-backed store. The lock is held only for the map operation,
/// never across an await.
pub struct InMemoryThingStore {
    things: Mutex<HashMap<ThingId, Thing>>,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryThingStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            things: Mutex::new(HashMap::new()),
            ids: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.things.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.things.lock().await.is_empty()
    }
}

impl Default for InMemoryThingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThingStore for InMemoryThingStore {
    async fn find(&self, filter: ThingFilter) -> Result<Vec<Thing>, PersistenceError> {
        let things = self.things.lock().await;
        Ok(filter.select(things.values().cloned()))
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
        self.things.lock().await.insert(thing.id, thing.clone());
        Ok(thing)
    }

    async fn update_one(
        &self,
        id: ThingId,
        update: ThingUpdate,
    ) -> Result<Thing, PersistenceError> {
        let now = self.clock.now();
        let mut things = self.things.lock().await;
        let thing = things.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;
        update.apply(thing, now);
        Ok(thing.clone())
    }

    async fn delete_one(&self, id: ThingId) -> Result<(), PersistenceError> {
        self.things
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(PersistenceError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Attr;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn insert_assigns_id_and_timestamps() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let store = InMemoryThingStore::with_clock(Arc::new(FixedClock::new(start)));

        let thing = store
            .insert(NewThing::new(vec![Attr::new("filename", "a.png")]))
            .await
            .unwrap();

        assert!(!thing.is_deleted);
        assert_eq!(thing.created_at, start);
        assert_eq!(thing.updated_at, start);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_refreshes_updated_at() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let store = InMemoryThingStore::with_clock(clock.clone());
        let thing = store.insert(NewThing::default()).await.unwrap();

        clock.advance(Duration::minutes(5));
        let updated = store
            .update_one(thing.id, ThingUpdate::soft_delete())
            .await
            .unwrap();

        assert!(updated.is_deleted);
        assert_eq!(updated.created_at, start);
        assert_eq!(updated.updated_at, start + Duration::minutes(5));
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let store = InMemoryThingStore::new();
        let thing = store.insert(NewThing::default()).await.unwrap();

        store.delete_one(thing.id).await.unwrap();
        let err = store.delete_one(thing.id).await.unwrap_err();

        assert!(matches!(err, PersistenceError::NotFound(id) if id == thing.id));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn find_filters_on_deleted_flag() {
        let store = InMemoryThingStore::new();
        let a = store.insert(NewThing::default()).await.unwrap();
        let _b = store.insert(NewThing::default()).await.unwrap();
        store
            .update_one(a.id, ThingUpdate::soft_delete())
            .await
            .unwrap();

        let deleted = store.find(ThingFilter::deleted()).await.unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, a.id);
        assert_eq!(store.find(ThingFilter::live()).await.unwrap().len(), 1);
    }
}
