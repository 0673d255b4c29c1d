use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use snapwatch_core::{now_unix, RunId, Snapshot, StoreCorruptError, TargetName};
use snapwatch_store::{codec, HistoryEntry, SnapshotStore};

/// Snapshots as rows of one SQLite table, keyed by target. Each save is one
/// upsert; run history goes to an append-only `history` table.
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path).with_context(|| format!("open sqlite db {}", db_path.display()))?;
        conn.execute_batch(include_str!("../migrations/0001_init.sql"))?;
        conn.execute_batch(include_str!("../migrations/0002_history.sql"))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }

    /// Unix seconds of the last save for `target`.
    pub fn saved_at(&self, target: &TargetName) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let at = conn
            .query_row("SELECT saved_at FROM snapshots WHERE target = ?1", [target.as_str()], |r| r.get(0))
            .optional()?;
        Ok(at)
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn read(&self, target: &TargetName) -> Result<Option<Snapshot>, StoreCorruptError> {
        let corrupt = |reason: String| StoreCorruptError { target: target.0.clone(), reason };

        let conn = self.conn().map_err(|e| corrupt(e.to_string()))?;
        let body: Option<String> = conn
            .query_row("SELECT body_json FROM snapshots WHERE target = ?1", [target.as_str()], |r| r.get(0))
            .optional()
            .map_err(|e| corrupt(e.to_string()))?;

        match body {
            None => Ok(None),
            Some(body) => codec::decode(body.as_bytes()).map(Some).map_err(|e| corrupt(e.to_string())),
        }
    }

    fn save(&self, target: &TargetName, snapshot: &Snapshot) -> Result<()> {
        let body = String::from_utf8(codec::encode(snapshot)?)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO snapshots(target, body_json, fingerprint, entity_count, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(target) DO UPDATE SET
               body_json = excluded.body_json,
               fingerprint = excluded.fingerprint,
               entity_count = excluded.entity_count,
               saved_at = excluded.saved_at",
            params![
                target.as_str(),
                body,
                snapshot.fingerprint(),
                snapshot.len() as i64,
                now_unix()
            ],
        )
        .with_context(|| format!("save snapshot {}", target))?;
        tracing::debug!(target_name = %target, entities = snapshot.len(), "snapshot saved");
        Ok(())
    }

    fn remove(&self, target: &TargetName) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM snapshots WHERE target = ?1", [target.as_str()])?;
        Ok(n > 0)
    }

    fn targets(&self) -> Result<Vec<TargetName>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT target FROM snapshots ORDER BY target")?;
        let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
        let mut names = vec![];
        for row in rows {
            names.push(TargetName::from_str(row?));
        }
        Ok(names)
    }

    fn append_history(&self, target: &TargetName, entry: &HistoryEntry) -> Result<()> {
        let body = String::from_utf8(codec::encode(&entry.snapshot)?)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO history(target, run_id, recorded_at, fingerprint, body_json) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![target.as_str(), entry.run_id.as_str(), entry.recorded_at, entry.fingerprint, body],
        )
        .with_context(|| format!("append history {}", target))?;
        Ok(())
    }

    fn history(&self, target: &TargetName) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, recorded_at, fingerprint, body_json FROM history WHERE target = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map([target.as_str()], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, String>(2)?, r.get::<_, String>(3)?))
        })?;
        let mut entries = vec![];
        for row in rows {
            let (run_id, recorded_at, fingerprint, body) = row?;
            match codec::decode(body.as_bytes()) {
                Ok(snapshot) => entries.push(HistoryEntry {
                    run_id: RunId::from_str(run_id),
                    recorded_at,
                    fingerprint,
                    snapshot,
                }),
                Err(e) => {
                    tracing::warn!(target_name = %target, run_id = %run_id, error = %e, "skipping unreadable history row")
                }
            }
        }
        Ok(entries)
    }
}
