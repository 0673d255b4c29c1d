use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use snapwatch_core::{Snapshot, StoreCorruptError, TargetName};

use crate::codec;
use crate::history::HistoryEntry;
use crate::traits::SnapshotStore;

/// In-memory store for tests. Not durable, but keeps encoded bytes so
/// corruption can be simulated with [`InMemorySnapshotStore::put_raw`].
#[derive(Default)]
pub struct InMemorySnapshotStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    docs: HashMap<String, Vec<u8>>,
    history: HashMap<String, Vec<HistoryEntry>>,
    saves: usize,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_raw(&self, target: &TargetName, bytes: &[u8]) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.docs.insert(target.0.clone(), bytes.to_vec());
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).saves
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn read(&self, target: &TargetName) -> Result<Option<Snapshot>, StoreCorruptError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(bytes) = inner.docs.get(target.as_str()) else {
            return Ok(None);
        };
        codec::decode(bytes).map(Some).map_err(|e| StoreCorruptError {
            target: target.0.clone(),
            reason: e.to_string(),
        })
    }

    fn save(&self, target: &TargetName, snapshot: &Snapshot) -> anyhow::Result<()> {
        let bytes = codec::encode(snapshot)?;
        let mut inner = self.inner.lock().map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        inner.docs.insert(target.0.clone(), bytes);
        inner.saves += 1;
        Ok(())
    }

    fn remove(&self, target: &TargetName) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        Ok(inner.docs.remove(target.as_str()).is_some())
    }

    fn targets(&self) -> anyhow::Result<Vec<TargetName>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        let mut names: Vec<TargetName> = inner.docs.keys().map(|k| TargetName::from_str(k.as_str())).collect();
        names.sort();
        Ok(names)
    }

    fn append_history(&self, target: &TargetName, entry: &HistoryEntry) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        inner.history.entry(target.0.clone()).or_default().push(entry.clone());
        Ok(())
    }

    fn history(&self, target: &TargetName) -> anyhow::Result<Vec<HistoryEntry>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("snapshot store lock poisoned"))?;
        Ok(inner.history.get(target.as_str()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapwatch_core::{EntityRecord, FieldValue, RunId};

    fn target() -> TargetName {
        TargetName::from("camry")
    }

    #[test]
    fn test_new_store_loads_empty() {
        let store = InMemorySnapshotStore::new();
        assert!(store.load(&target()).is_empty());
        assert!(store.read(&target()).unwrap().is_none());
        assert_eq!(store.save_count(), 0);
    }

    #[test]
    fn test_save_then_load() {
        let store = InMemorySnapshotStore::new();
        let mut snap = Snapshot::from_ids(["url1", "url2"]);
        let mut rec = EntityRecord::new();
        rec.insert("price".into(), FieldValue::Integer(17450));
        snap.insert("vin1", rec);
        store.save(&target(), &snap).unwrap();
        assert_eq!(store.load(&target()), snap);
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn test_corrupt_document_loads_empty() {
        let store = InMemorySnapshotStore::new();
        store.put_raw(&target(), b"{not json");
        assert!(store.read(&target()).is_err());
        assert!(store.load(&target()).is_empty());
    }

    #[test]
    fn test_remove_and_targets() {
        let store = InMemorySnapshotStore::new();
        store.save(&TargetName::from("b"), &Snapshot::new()).unwrap();
        store.save(&TargetName::from("a"), &Snapshot::new()).unwrap();
        assert_eq!(store.targets().unwrap(), vec![TargetName::from("a"), TargetName::from("b")]);
        assert!(store.remove(&TargetName::from("a")).unwrap());
        assert!(!store.remove(&TargetName::from("a")).unwrap());
        assert_eq!(store.targets().unwrap().len(), 1);
    }

    #[test]
    fn test_history_survives_remove() {
        let store = InMemorySnapshotStore::new();
        assert!(store.history(&target()).unwrap().is_empty());
        store
            .append_history(&target(), &HistoryEntry::new(RunId::new(), 1, Snapshot::from_ids(["url1"])))
            .unwrap();
        store
            .append_history(&target(), &HistoryEntry::new(RunId::new(), 2, Snapshot::from_ids(["url2"])))
            .unwrap();
        store.remove(&target()).unwrap();
        let history = store.history(&target()).unwrap();
        assert_eq!(history.iter().map(|e| e.recorded_at).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.targets().unwrap().is_empty());
    }
}
