use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use snapwatch_core::{Snapshot, StoreCorruptError, TargetName};
use tempfile::NamedTempFile;

use crate::codec;
use crate::history::{self, HistoryEntry};
use crate::traits::SnapshotStore;

/// One JSON document per target under `root`; run history as JSON lines
/// under `root/history`.
#[derive(Clone, Debug)]
pub struct FsSnapshotStore {
    pub root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, target: &TargetName) -> Result<PathBuf> {
        if !target.is_valid() {
            bail!("invalid target name {:?}", target.as_str());
        }
        Ok(self.root.join(format!("{}.json", target.as_str())))
    }

    pub fn history_path(&self, target: &TargetName) -> Result<PathBuf> {
        if !target.is_valid() {
            bail!("invalid target name {:?}", target.as_str());
        }
        Ok(self.root.join("history").join(format!("{}.jsonl", target.as_str())))
    }
}

fn write_atomic(dir: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    // temp file in the same directory so the rename never crosses filesystems
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest)
        .map_err(|e| e.error)
        .with_context(|| format!("replace {}", dest.display()))?;
    Ok(())
}

impl SnapshotStore for FsSnapshotStore {
    fn read(&self, target: &TargetName) -> Result<Option<Snapshot>, StoreCorruptError> {
        let corrupt = |reason: String| StoreCorruptError { target: target.0.clone(), reason };

        let path = self.path_for(target).map_err(|e| corrupt(e.to_string()))?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path).map_err(|e| corrupt(format!("read {}: {}", path.display(), e)))?;
        codec::decode(&bytes)
            .map(Some)
            .map_err(|e| corrupt(format!("parse {}: {}", path.display(), e)))
    }

    fn save(&self, target: &TargetName, snapshot: &Snapshot) -> Result<()> {
        let path = self.path_for(target)?;
        std::fs::create_dir_all(&self.root).with_context(|| format!("create store dir {}", self.root.display()))?;
        let bytes = codec::encode(snapshot)?;
        write_atomic(&self.root, &path, &bytes)?;
        tracing::debug!(target_name = %target, path = %path.display(), entities = snapshot.len(), "snapshot saved");
        Ok(())
    }

    fn remove(&self, target: &TargetName) -> Result<bool> {
        let path = self.path_for(target)?;
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        Ok(true)
    }

    fn targets(&self) -> Result<Vec<TargetName>> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let mut names = vec![];
        for entry in std::fs::read_dir(&self.root).with_context(|| format!("list {}", self.root.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(TargetName::from_str(stem));
            }
        }
        names.sort();
        Ok(names)
    }

    fn append_history(&self, target: &TargetName, entry: &HistoryEntry) -> Result<()> {
        let path = self.history_path(target)?;
        let dir = self.root.join("history");
        std::fs::create_dir_all(&dir).with_context(|| format!("create history dir {}", dir.display()))?;
        let line = history::encode_line(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append {}", path.display()))?;
        file.sync_all()?;
        Ok(())
    }

    fn history(&self, target: &TargetName) -> Result<Vec<HistoryEntry>> {
        let path = self.history_path(target)?;
        if !path.exists() {
            return Ok(vec![]);
        }
        let text = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(history::decode_lines(&text))
    }
}
