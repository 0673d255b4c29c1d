use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use snapwatch_collect::Collector;
use snapwatch_core::{now_unix, plan, AlertMode, CollectionError, DispatchError, Plan, RunId, Snapshot, TargetName};
use snapwatch_notify::Notifier;
use snapwatch_store::{HistoryEntry, LockError, SnapshotStore, TargetLock};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("target {0} is already being run by another process")]
    Locked(String),
    #[error("collection failed: {0}")]
    Collection(#[from] CollectionError),
    #[error("{0}; baseline left unchanged")]
    Dispatch(#[from] DispatchError),
    #[error("store: {0}")]
    Store(String),
}

impl From<LockError> for RunError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Held(target) => RunError::Locked(target),
            other => RunError::Store(other.to_string()),
        }
    }
}

/// Outcome of one target run, printed by the CLI.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub target: TargetName,
    pub entities: usize,
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub matched: usize,
    pub alerted: bool,
    pub saved: bool,
    /// Appended to the run history.
    pub recorded: bool,
    pub fingerprint: String,
    pub finished_at: i64,
}

impl RunReport {
    fn new(target: &TargetName, current: &Snapshot, plan: &Plan) -> Self {
        Self {
            run_id: RunId::new(),
            target: target.clone(),
            entities: current.len(),
            added: plan.delta.added.len(),
            removed: plan.delta.removed.len(),
            changed: plan.delta.changed.len(),
            matched: plan.matched.len(),
            alerted: false,
            saved: false,
            recorded: false,
            fingerprint: current.fingerprint(),
            finished_at: now_unix(),
        }
    }
}

/// Result of a dry run: the plan that a real run would execute.
#[derive(Clone, Debug)]
pub struct Check {
    pub report: RunReport,
    pub plan: Plan,
}

/// Load, collect, plan, dispatch, save. The baseline only advances after
/// a successful collection and, if a message was planned, a successful send.
pub struct Pipeline {
    pub store: Arc<dyn SnapshotStore>,
    pub notifier: Arc<dyn Notifier>,
    pub lock_dir: Option<PathBuf>,
    /// Append each saved snapshot to the store's run history.
    pub history: bool,
}

impl Pipeline {
    pub fn new(store: Arc<dyn SnapshotStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier, lock_dir: None, history: false }
    }

    pub fn with_history(mut self, history: bool) -> Self {
        self.history = history;
        self
    }

    pub fn with_lock_dir(mut self, dir: PathBuf) -> Self {
        self.lock_dir = Some(dir);
        self
    }

    fn lock(&self, target: &TargetName) -> Result<Option<TargetLock>, RunError> {
        match &self.lock_dir {
            Some(dir) => Ok(Some(TargetLock::acquire(dir, target)?)),
            None => Ok(None),
        }
    }

    pub fn run_target(
        &self,
        target: &TargetName,
        label: &str,
        mode: &AlertMode,
        collector: &dyn Collector,
    ) -> Result<RunReport, RunError> {
        let _lock = self.lock(target)?;

        let previous = self.store.load(target);
        tracing::info!(target_name = %target, source = %collector.describe(), "collecting");
        let current = collector.collect().map_err(|e| {
            tracing::error!(target_name = %target, error = %e, "collection failed; nothing sent or saved");
            e
        })?;

        let plan = plan(label, mode, &previous, &current);
        let mut report = RunReport::new(target, &current, &plan);

        if let Some(message) = &plan.message {
            self.notifier.send(message).map_err(|e| {
                tracing::error!(target_name = %target, notifier = %self.notifier.describe(), error = %e, "dispatch failed");
                e
            })?;
            report.alerted = true;
        }

        self.store
            .save(target, &current)
            .map_err(|e| RunError::Store(format!("{:#}", e)))?;
        report.saved = true;

        if self.history {
            let entry = HistoryEntry::new(report.run_id.clone(), report.finished_at, current);
            // baseline is already saved; history failures only warn
            match self.store.append_history(target, &entry) {
                Ok(()) => report.recorded = true,
                Err(e) => tracing::warn!(target_name = %target, error = %format!("{:#}", e), "history append failed"),
            }
        }

        tracing::info!(
            target_name = %target,
            entities = report.entities,
            added = report.added,
            removed = report.removed,
            changed = report.changed,
            matched = report.matched,
            alerted = report.alerted,
            "run complete"
        );
        Ok(report)
    }

    /// Collect and plan against the stored baseline; sends nothing, saves nothing.
    pub fn check_target(
        &self,
        target: &TargetName,
        label: &str,
        mode: &AlertMode,
        collector: &dyn Collector,
    ) -> Result<Check, RunError> {
        let previous = self.store.load(target);
        let current = collector.collect()?;
        let plan = plan(label, mode, &previous, &current);
        let report = RunReport::new(target, &current, &plan);
        Ok(Check { report, plan })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapwatch_collect::{FailingCollector, StaticCollector};
    use snapwatch_core::{AlertRule, EntityId, EntityRecord, FieldValue};
    use snapwatch_notify::{FailingNotifier, RecordingNotifier};
    use snapwatch_store::InMemorySnapshotStore;

    fn name() -> TargetName {
        TargetName::from("camry")
    }

    fn ids(items: &[&str]) -> Snapshot {
        Snapshot::from_ids(items.iter().copied())
    }

    fn pipeline(store: &Arc<InMemorySnapshotStore>, notifier: Arc<dyn Notifier>) -> Pipeline {
        Pipeline::new(store.clone(), notifier)
    }

    #[test]
    fn first_run_reports_everything_as_added() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let p = pipeline(&store, rec.clone());

        let report = p
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1", "url2"])))
            .unwrap();
        assert_eq!(report.added, 2);
        assert!(report.alerted && report.saved);
        assert_eq!(rec.sent().len(), 1);
        assert_eq!(store.load(&name()), ids(&["url1", "url2"]));
    }

    #[test]
    fn added_and_removed_between_runs() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.save(&name(), &ids(&["url1", "url2"])).unwrap();
        let rec = Arc::new(RecordingNotifier::new());
        let p = pipeline(&store, rec.clone());

        let report = p
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url2", "url3"])))
            .unwrap();
        assert_eq!((report.added, report.removed), (1, 1));
        let sent = rec.sent();
        assert!(sent[0].body.contains("url3"));
        assert!(!sent[0].body.contains("url1"));
        assert_eq!(store.load(&name()), ids(&["url2", "url3"]));
    }

    #[test]
    fn unchanged_snapshot_sends_nothing_but_saves() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.save(&name(), &ids(&["url1"])).unwrap();
        let rec = Arc::new(RecordingNotifier::new());
        let report = pipeline(&store, rec.clone())
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1"])))
            .unwrap();
        assert!(!report.alerted);
        assert!(rec.sent().is_empty());
        assert_eq!(store.save_count(), 2);
    }

    #[test]
    fn collection_error_neither_notifies_nor_saves() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.save(&name(), &ids(&["url1"])).unwrap();
        let rec = Arc::new(RecordingNotifier::new());
        let err = pipeline(&store, rec.clone())
            .run_target(&name(), "Camry", &AlertMode::AnyChange, &FailingCollector { reason: "timed out".into() })
            .unwrap_err();
        assert!(matches!(err, RunError::Collection(_)));
        assert!(rec.sent().is_empty());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load(&name()), ids(&["url1"]));
    }

    #[test]
    fn dispatch_failure_keeps_old_baseline() {
        let store = Arc::new(InMemorySnapshotStore::new());
        store.save(&name(), &ids(&["url1"])).unwrap();
        let failing = Arc::new(FailingNotifier::new());
        let err = pipeline(&store, failing.clone())
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1", "url2"])))
            .unwrap_err();
        assert!(matches!(err, RunError::Dispatch(_)));
        assert_eq!(failing.attempts(), 1);
        assert_eq!(store.load(&name()), ids(&["url1"]));

        // next run re-detects the same addition
        let rec = Arc::new(RecordingNotifier::new());
        let report = pipeline(&store, rec.clone())
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1", "url2"])))
            .unwrap();
        assert_eq!(report.added, 1);
        assert_eq!(rec.sent().len(), 1);
    }

    fn reviews(n: i64) -> EntityRecord {
        let mut rec = EntityRecord::new();
        rec.insert("reviews".into(), FieldValue::Integer(n));
        rec
    }

    #[test]
    fn predicate_false_everywhere_saves_without_dispatch() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let mut current = Snapshot::new();
        current.insert("Ghost 16", reviews(1204));
        let mode = AlertMode::Predicate {
            rule: AlertRule::Below { field: "reviews".into(), threshold: 1.0 },
            report_all_clear: false,
        };
        let report = pipeline(&store, rec.clone())
            .run_target(&name(), "Ratings", &mode, &StaticCollector::new(current.clone()))
            .unwrap();
        assert!(!report.alerted);
        assert!(report.saved);
        assert!(rec.sent().is_empty());
        assert_eq!(store.load(&name()), current);
    }

    #[test]
    fn predicate_match_alerts_on_every_run() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let mut current = Snapshot::new();
        current.insert("Glycerin 22", reviews(0));
        let mode = AlertMode::Predicate {
            rule: AlertRule::Below { field: "reviews".into(), threshold: 1.0 },
            report_all_clear: false,
        };
        let p = pipeline(&store, rec.clone());
        let collector = StaticCollector::new(current);
        p.run_target(&name(), "Ratings", &mode, &collector).unwrap();
        let report = p.run_target(&name(), "Ratings", &mode, &collector).unwrap();
        assert_eq!(report.matched, 1);
        assert_eq!(rec.sent().len(), 2);
        assert!(rec.sent()[1].body.contains(EntityId::from("Glycerin 22").as_str()));
    }

    #[test]
    fn history_records_every_saved_run() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let p = pipeline(&store, rec.clone()).with_history(true);
        let score = |n: i64| {
            let mut snap = Snapshot::new();
            let mut r = EntityRecord::new();
            r.insert("performance".into(), FieldValue::Integer(n));
            snap.insert("https://www.shoes.example/en_us#mobile_slow", r);
            snap
        };

        let first = p.run_target(&name(), "Speed", &AlertMode::AnyChange, &StaticCollector::new(score(71))).unwrap();
        assert!(first.recorded);
        p.run_target(&name(), "Speed", &AlertMode::AnyChange, &StaticCollector::new(score(64))).unwrap();
        p.run_target(&name(), "Speed", &AlertMode::AnyChange, &FailingCollector { reason: "quota".into() })
            .unwrap_err();

        let history = store.history(&name()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].run_id, first.run_id);
        assert_eq!(history[0].snapshot, score(71));
        assert_eq!(history[1].snapshot, score(64));
    }

    #[test]
    fn history_is_off_by_default() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let report = pipeline(&store, rec)
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1"])))
            .unwrap();
        assert!(!report.recorded);
        assert!(store.history(&name()).unwrap().is_empty());
    }

    #[test]
    fn held_lock_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let p = pipeline(&store, rec.clone()).with_lock_dir(dir.path().to_path_buf());

        let held = TargetLock::acquire(dir.path(), &name()).unwrap();
        let err = p
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1"])))
            .unwrap_err();
        assert!(matches!(err, RunError::Locked(_)));
        assert_eq!(store.save_count(), 0);

        drop(held);
        assert!(p
            .run_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1"])))
            .is_ok());
    }

    #[test]
    fn check_never_sends_or_saves() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let rec = Arc::new(RecordingNotifier::new());
        let check = pipeline(&store, rec.clone())
            .check_target(&name(), "Camry", &AlertMode::Added, &StaticCollector::new(ids(&["url1"])))
            .unwrap();
        assert!(check.plan.dispatch_required());
        assert!(!check.report.saved);
        assert!(rec.sent().is_empty());
        assert_eq!(store.save_count(), 0);
    }
}
