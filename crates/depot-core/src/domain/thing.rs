//! Thing record: one uploaded file's metadata.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::ids::ThingId;

/// Attribute name that points at the stored file.
pub const PATH_ATTR: &str = "path";

/// One `name -> value` entry of a record's attribute list.
///
/// Serialized as a single-key JSON object (`{"size": 12}`), so the whole
/// list stays an ordered, semi-structured sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Attr {
    pub name: String,
    pub value: serde_json::Value,
}

impl Attr {
    pub fn new(name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Serialize for Attr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for Attr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AttrVisitor;

        impl<'de> Visitor<'de> for AttrVisitor {
            type Value = Attr;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object with exactly one key")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Attr, A::Error> {
                let Some((name, value)) = map.next_entry::<String, serde_json::Value>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                if map.next_key::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(Attr { name, value })
            }
        }

        deserializer.deserialize_map(AttrVisitor)
    }
}

/// A stored upload record.
///
/// `is_deleted` only ever goes false -> true. A deleted record waits for
/// the cleanup job, which removes its file and then the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thing {
    pub id: ThingId,
    #[serde(rename = "is_deleted", default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub attrs: Vec<Attr>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thing {
    /// First attribute with the given name.
    pub fn attr(&self, name: &str) -> Option<&serde_json::Value> {
        self.attrs
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }

    /// Stored file location, if the record has a string `path` attribute.
    pub fn path(&self) -> Option<&str> {
        self.attr(PATH_ATTR).and_then(|v| v.as_str())
    }

    /// Keep only attributes whose name is in `allowed`, preserving order.
    pub fn retain_attrs(&mut self, allowed: &[&str]) {
        self.attrs.retain(|attr| allowed.contains(&attr.name.as_str()));
    }
}

/// Input for `ThingStore::insert`. The store assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewThing {
    pub attrs: Vec<Attr>,
}

impl NewThing {
    pub fn new(attrs: Vec<Attr>) -> Self {
        Self { attrs }
    }
}

/// Field changes for `ThingStore::update_one`.
///
/// Nothing here clears `is_deleted`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingUpdate {
    pub mark_deleted: bool,
    pub push_attrs: Vec<Attr>,
}

impl ThingUpdate {
    pub fn soft_delete() -> Self {
        Self {
            mark_deleted: true,
            push_attrs: Vec::new(),
        }
    }

    pub fn apply(&self, thing: &mut Thing, now: DateTime<Utc>) {
        if self.mark_deleted {
            thing.is_deleted = true;
        }
        thing.attrs.extend(self.push_attrs.iter().cloned());
        thing.updated_at = now;
    }
}

/// Sort order for `find`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Query for `ThingStore::find`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingFilter {
    pub id: Option<ThingId>,
    pub is_deleted: Option<bool>,
    pub sort: SortOrder,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl ThingFilter {
    /// Every soft-deleted record.
    pub fn deleted() -> Self {
        Self {
            is_deleted: Some(true),
            ..Self::default()
        }
    }

    /// Live records, newest first.
    pub fn live() -> Self {
        Self {
            is_deleted: Some(false),
            sort: SortOrder::NewestFirst,
            ..Self::default()
        }
    }

    pub fn by_id(id: ThingId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: ThingId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, thing: &Thing) -> bool {
        self.id.is_none_or(|id| id == thing.id)
            && self.is_deleted.is_none_or(|d| d == thing.is_deleted)
    }

    /// Filter, sort and page a set of records. Stores that hold everything
    /// in memory (or on disk as plain documents) share this.
    pub fn select<I>(&self, things: I) -> Vec<Thing>
    where
        I: IntoIterator<Item = Thing>,
    {
        let mut hits: Vec<Thing> = things.into_iter().filter(|t| self.matches(t)).collect();
        // ULIDs carry creation time, so the id breaks timestamp ties.
        hits.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        if self.sort == SortOrder::NewestFirst {
            hits.reverse();
        }
        let hits = hits.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => hits.take(limit).collect(),
            None => hits.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use ulid::Ulid;

    fn thing(attrs: Vec<Attr>) -> Thing {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Thing {
            id: ThingId::from_ulid(Ulid::new()),
            is_deleted: false,
            attrs,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn attrs_serialize_as_single_key_objects() {
        let t = thing(vec![
            Attr::new("filename", "a.png"),
            Attr::new("size", 12),
        ]);
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["attrs"], json!([{"filename": "a.png"}, {"size": 12}]));
        assert_eq!(value["is_deleted"], json!(false));
        assert!(value.get("createdAt").is_some());

        let back: Thing = serde_json::from_value(value).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn attr_with_two_keys_is_rejected() {
        let err = serde_json::from_value::<Attr>(json!({"a": 1, "b": 2}));
        assert!(err.is_err());
        let err = serde_json::from_value::<Attr>(json!({}));
        assert!(err.is_err());
    }

    #[test]
    fn path_is_first_matching_attr() {
        let t = thing(vec![
            Attr::new("filename", "a.png"),
            Attr::new("path", "public/uploads/a.png"),
            Attr::new("path", "elsewhere/a.png"),
        ]);
        assert_eq!(t.path(), Some("public/uploads/a.png"));
    }

    #[test]
    fn path_must_be_a_string() {
        let t = thing(vec![Attr::new("path", 42)]);
        assert_eq!(t.path(), None);
        assert_eq!(thing(vec![]).path(), None);
    }

    #[test]
    fn soft_delete_update_never_undeletes() {
        let mut t = thing(vec![]);
        t.is_deleted = true;
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        ThingUpdate::default().apply(&mut t, later);
        assert!(t.is_deleted);
        assert_eq!(t.updated_at, later);
    }

    #[test]
    fn select_filters_sorts_and_pages() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let things: Vec<Thing> = (0..5)
            .map(|i| {
                let mut t = thing(vec![Attr::new("n", i)]);
                t.created_at = base + chrono::Duration::minutes(i);
                t.is_deleted = i == 2;
                t
            })
            .collect();

        let page = ThingFilter::live().page(1, 2).select(things.clone());
        let ns: Vec<_> = page.iter().map(|t| t.attr("n").cloned()).collect();
        assert_eq!(ns, vec![Some(json!(3)), Some(json!(1))]);

        let deleted = ThingFilter::deleted().select(things);
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].attr("n"), Some(&json!(2)));
    }
}
