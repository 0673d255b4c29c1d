use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::model::{FieldValue, Snapshot};

/// Difference between two snapshots. The three sets are disjoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    pub added: BTreeSet<EntityId>,
    pub removed: BTreeSet<EntityId>,
    pub changed: BTreeSet<EntityId>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Some entity present on both sides has different fields.
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    /// The delta of the reverse comparison.
    pub fn inverse(&self) -> Delta {
        Delta {
            added: self.removed.clone(),
            removed: self.added.clone(),
            changed: self.changed.clone(),
        }
    }
}

/// One differing attribute of an entity present in both snapshots.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: Option<FieldValue>,
    pub after: Option<FieldValue>,
}

/// Pure comparison. An empty `previous` reports every current entity as added.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> Delta {
    let mut delta = Delta::default();

    for (id, record) in current.iter() {
        match previous.get(id) {
            None => {
                delta.added.insert(id.clone());
            }
            Some(before) if before != record => {
                delta.changed.insert(id.clone());
            }
            Some(_) => {}
        }
    }

    for id in previous.ids() {
        if !current.contains(id) {
            delta.removed.insert(id.clone());
        }
    }

    delta
}

/// Field-level differences for `id`. Empty when the entity is missing from either side.
pub fn field_changes(previous: &Snapshot, current: &Snapshot, id: &EntityId) -> Vec<FieldChange> {
    let (Some(before), Some(after)) = (previous.get(id), current.get(id)) else {
        return vec![];
    };

    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    fields
        .into_iter()
        .filter_map(|field| {
            let b = before.get(field);
            let a = after.get(field);
            if b == a {
                return None;
            }
            Some(FieldChange {
                field: field.clone(),
                before: b.cloned(),
                after: a.cloned(),
            })
        })
        .collect()
}
