use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A typed 64-bit entity id.
///
/// Ids are assigned monotonically per table and are phantom-typed so an id
/// from one table cannot address another. An undone insert releases its id
/// back to the allocator only on session rollback.
pub struct EntityId<T> {
    raw: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EntityId<T> {
    pub(crate) const fn new(raw: u64) -> Self {
        EntityId {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn raw(&self) -> u64 {
        self.raw
    }
}

// Manual impls so EntityId is Copy/Ord/... regardless of T.

impl<T> Clone for EntityId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for EntityId<T> {}

impl<T> PartialEq for EntityId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for EntityId<T> {}

impl<T> PartialOrd for EntityId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for EntityId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T> Hash for EntityId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.raw)
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl<T> Serialize for EntityId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for EntityId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(EntityId::new(u64::deserialize(deserializer)?))
    }
}

/// Schema contract for a stored entity kind.
///
/// Each entity declares its table name, a reflected field list for generic
/// persistence tooling, and exactly one secondary unique key alongside the
/// implicit primary ordering by id.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Secondary unique key (ordered index)
    type Key: Ord + Clone + fmt::Debug;

    const TABLE_NAME: &'static str;

    /// Reflected field list; part of the persisted schema version
    const FIELDS: &'static [&'static str];

    fn id(&self) -> EntityId<Self>;

    fn key(&self) -> Self::Key;
}
