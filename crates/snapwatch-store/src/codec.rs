//! On-disk snapshot documents.
//!
//! The native format is a JSON object keyed by entity id. A bare JSON array of
//! ids (the format older listing watchers wrote) still decodes, as a
//! presence-only snapshot.

use serde::Deserialize;
use snapwatch_core::{EntityId, Snapshot};

#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Records(Snapshot),
    Ids(Vec<EntityId>),
}

pub fn decode(bytes: &[u8]) -> Result<Snapshot, serde_json::Error> {
    let stored: Stored = serde_json::from_slice(bytes)?;
    Ok(match stored {
        Stored::Records(snap) => snap,
        Stored::Ids(ids) => Snapshot::from_ids(ids),
    })
}

pub fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(snapshot)
}
