use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::EntityId;

/// A primitive attribute value observed on an entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

/// Flat attribute map for one entity. Empty when only presence is tracked.
pub type EntityRecord = BTreeMap<String, FieldValue>;

/// Everything observed for one target at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: BTreeMap<EntityId, EntityRecord>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Presence-only snapshot from a list of identities. Duplicates collapse.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        let mut snap = Self::new();
        for id in ids {
            snap.insert_id(id);
        }
        snap
    }

    /// Inserts or replaces the record for `id`.
    pub fn insert(&mut self, id: impl Into<EntityId>, record: EntityRecord) {
        self.entries.insert(id.into(), record);
    }

    /// Marks `id` present, keeping any record already stored for it.
    pub fn insert_id(&mut self, id: impl Into<EntityId>) {
        self.entries.entry(id.into()).or_default();
    }

    pub fn get(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityRecord)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 over the canonical JSON encoding (keys sorted by the BTreeMap).
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.entries).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

impl FromIterator<(EntityId, EntityRecord)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (EntityId, EntityRecord)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}
