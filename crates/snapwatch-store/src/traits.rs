use snapwatch_core::{Snapshot, StoreCorruptError, TargetName};

use crate::history::HistoryEntry;

pub trait SnapshotStore: Send + Sync {
    /// Raw read. `Ok(None)` when nothing has been saved for `target`.
    fn read(&self, target: &TargetName) -> Result<Option<Snapshot>, StoreCorruptError>;

    /// Replace the stored snapshot. Readers see either the old or the new document, never a mix.
    fn save(&self, target: &TargetName, snapshot: &Snapshot) -> anyhow::Result<()>;

    /// Forget `target`. Returns whether anything was stored.
    fn remove(&self, target: &TargetName) -> anyhow::Result<bool>;

    fn targets(&self) -> anyhow::Result<Vec<TargetName>>;

    /// Append to the target's run history. Entries are never rewritten, and
    /// `remove` leaves the history in place.
    fn append_history(&self, target: &TargetName, entry: &HistoryEntry) -> anyhow::Result<()>;

    /// Recorded runs for `target`, oldest first.
    fn history(&self, target: &TargetName) -> anyhow::Result<Vec<HistoryEntry>>;

    /// Previous baseline for `target`; never fails.
    ///
    /// A missing store is a first run. An unreadable one is treated the same
    /// way, which costs one "everything is new" notification.
    fn load(&self, target: &TargetName) -> Snapshot {
        match self.read(target) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::debug!(target_name = %target, "no stored snapshot; first run");
                Snapshot::new()
            }
            Err(e) => {
                tracing::warn!(target_name = %target, error = %e, "discarding unreadable snapshot");
                Snapshot::new()
            }
        }
    }
}
