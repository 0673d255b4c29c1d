use serde::{Deserialize, Serialize};

use crate::diff::{field_changes, Delta};
use crate::ids::EntityId;
use crate::model::{EntityRecord, Snapshot};

/// Plain-text notification: short subject, one line per entity in the body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

fn fields_inline(record: &EntityRecord) -> String {
    record
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn entity_line(prefix: char, id: &EntityId, record: Option<&EntityRecord>) -> String {
    match record {
        Some(rec) if !rec.is_empty() => format!("{} {}  {}", prefix, id, fields_inline(rec)),
        _ => format!("{} {}", prefix, id),
    }
}

/// Counts appear in the subject only for the non-empty sets.
pub fn render_delta(label: &str, delta: &Delta, previous: &Snapshot, current: &Snapshot) -> Message {
    let mut counts = Vec::new();
    if !delta.added.is_empty() {
        counts.push(format!("{} new", delta.added.len()));
    }
    if !delta.removed.is_empty() {
        counts.push(format!("{} removed", delta.removed.len()));
    }
    if !delta.changed.is_empty() {
        counts.push(format!("{} changed", delta.changed.len()));
    }
    let summary = if counts.is_empty() { "no changes".to_string() } else { counts.join(", ") };

    let mut lines = Vec::new();
    for id in &delta.added {
        lines.push(entity_line('+', id, current.get(id)));
    }
    for id in &delta.removed {
        lines.push(entity_line('-', id, previous.get(id)));
    }
    for id in &delta.changed {
        let changes = field_changes(previous, current, id)
            .into_iter()
            .map(|c| {
                let before = c.before.map(|v| v.to_string()).unwrap_or_else(|| "(none)".into());
                let after = c.after.map(|v| v.to_string()).unwrap_or_else(|| "(none)".into());
                format!("{}: {} -> {}", c.field, before, after)
            })
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("~ {}  {}", id, changes));
    }

    Message {
        subject: format!("[snapwatch] {}: {}", label, summary),
        body: lines.join("\n"),
    }
}

pub fn render_matches(label: &str, matches: &[(&EntityId, &EntityRecord)]) -> Message {
    let body = matches
        .iter()
        .map(|(id, rec)| entity_line('!', id, Some(rec)))
        .collect::<Vec<_>>()
        .join("\n");
    Message {
        subject: format!("[Alert] {}: {} matching", label, matches.len()),
        body,
    }
}

pub fn render_all_clear(label: &str, checked: usize) -> Message {
    Message {
        subject: format!("[Info] {}: all clear", label),
        body: format!("All {} checked entities are within bounds.", checked),
    }
}
