use serde::{Deserialize, Serialize};

use crate::ids::EntityId;
use crate::model::{EntityRecord, FieldValue, Snapshot};

/// Per-target alert condition evaluated against each current observation.
pub trait AlertPredicate {
    fn should_alert(&self, id: &EntityId, record: &EntityRecord) -> bool;
}

impl<F> AlertPredicate for F
where
    F: Fn(&EntityId, &EntityRecord) -> bool,
{
    fn should_alert(&self, id: &EntityId, record: &EntityRecord) -> bool {
        self(id, record)
    }
}

/// Built-in predicates that can be expressed in config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertRule {
    /// Numeric field strictly below `threshold`. Missing or non-numeric never alerts.
    Below { field: String, threshold: f64 },
    /// Numeric field strictly above `threshold`. Missing or non-numeric never alerts.
    Above { field: String, threshold: f64 },
    /// Field absent or different from `value`.
    NotEqual { field: String, value: FieldValue },
    Missing { field: String },
}

impl AlertPredicate for AlertRule {
    fn should_alert(&self, _id: &EntityId, record: &EntityRecord) -> bool {
        match self {
            AlertRule::Below { field, threshold } => record
                .get(field)
                .and_then(FieldValue::as_f64)
                .is_some_and(|v| v < *threshold),
            AlertRule::Above { field, threshold } => record
                .get(field)
                .and_then(FieldValue::as_f64)
                .is_some_and(|v| v > *threshold),
            AlertRule::NotEqual { field, value } => match record.get(field) {
                None => true,
                Some(v) => !same_value(v, value),
            },
            AlertRule::Missing { field } => !record.contains_key(field),
        }
    }
}

// 200 and 200.0 are the same status.
fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// How a target decides whether a run should notify.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertMode {
    /// Notify when new entities appear.
    #[default]
    Added,
    /// Notify on any addition, removal or record change.
    AnyChange,
    /// Notify when any current entity matches `rule`, independent of the delta.
    Predicate {
        rule: AlertRule,
        /// Also send an informational message when nothing matches.
        #[serde(default)]
        report_all_clear: bool,
    },
}

/// Current entities matching `predicate`, in identity order.
pub fn matching<'a, P>(snapshot: &'a Snapshot, predicate: &P) -> Vec<(&'a EntityId, &'a EntityRecord)>
where
    P: AlertPredicate + ?Sized,
{
    snapshot.iter().filter(|(id, rec)| predicate.should_alert(id, rec)).collect()
}
