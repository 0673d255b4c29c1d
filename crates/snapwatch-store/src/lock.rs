use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use snapwatch_core::TargetName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("target {0} is already running in another process")]
    Held(String),
    #[error("lock file {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Exclusive advisory lock on `<dir>/<target>.lock`, held until drop.
///
/// Two overlapping runs for the same target would both load the same
/// baseline and the later save would win; the second run fails fast instead.
#[derive(Debug)]
pub struct TargetLock {
    file: File,
    path: PathBuf,
}

impl TargetLock {
    pub fn acquire(dir: &Path, target: &TargetName) -> Result<Self, LockError> {
        let io = |path: &Path, source| LockError::Io { path: path.to_path_buf(), source };

        fs::create_dir_all(dir).map_err(|e| io(dir, e))?;
        let path = dir.join(format!("{}.lock", target.as_str()));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| io(&path, e))?;

        file.try_lock_exclusive().map_err(|_| LockError::Held(target.0.clone()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
