use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use snapwatch_collect::HttpFetcher;
use snapwatch_core::{Snapshot, TargetName};
use snapwatch_notify::{EnvSmtpNotifier, LogNotifier, Notifier};
use snapwatch_store::{FsSnapshotStore, HistoryEntry, SnapshotStore};
use snapwatch_store_sqlite::SqliteSnapshotStore;

use crate::pipeline::{Check, Pipeline, RunReport};
use crate::{Config, StoreBackend, TargetConfig};

/// One stored baseline, as listed by `status`.
#[derive(Clone, Debug)]
pub struct StoredTarget {
    pub name: TargetName,
    pub entities: usize,
    pub fingerprint: String,
    pub configured: bool,
}

pub struct Runner {
    pub cfg: Config,
    pub store: Arc<dyn SnapshotStore>,
    pub fetcher: HttpFetcher,
    notifier: Option<Arc<dyn Notifier>>,
    lock_dir: Option<PathBuf>,
}

impl Runner {
    pub fn open(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            bail!("no config at {} (run `snapwatch init` to create one)", config_path.display());
        }
        let cfg = Config::load_from(config_path)?;

        let store: Arc<dyn SnapshotStore> = match cfg.store.backend {
            StoreBackend::Fs => Arc::new(FsSnapshotStore::new(cfg.store_dir())),
            StoreBackend::Sqlite => {
                std::fs::create_dir_all(cfg.store_dir())
                    .with_context(|| format!("create {}", cfg.store_dir().display()))?;
                Arc::new(SqliteSnapshotStore::open(&cfg.db_path())?)
            }
        };
        let lock_dir = cfg.lock_dir();
        let mut runner = Self::with_store(cfg, store)?;
        runner.lock_dir = Some(lock_dir);
        Ok(runner)
    }

    /// Runner over an explicit store; no lock directory, SMTP credentials read on first send.
    pub fn with_store(cfg: Config, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        let fetcher = HttpFetcher::new(Duration::from_secs(cfg.http.timeout_secs), &cfg.http.user_agent)?;
        Ok(Self { cfg, store, fetcher, notifier: None, lock_dir: None })
    }

    /// Replace the SMTP notifier (dry runs, tests).
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn init(config_path: &Path) -> Result<bool> {
        if config_path.exists() {
            return Ok(false);
        }
        Config::default_example().save_to(config_path)?;
        Ok(true)
    }

    fn notifier(&self) -> Arc<dyn Notifier> {
        match &self.notifier {
            Some(n) => n.clone(),
            None => Arc::new(EnvSmtpNotifier::new(self.cfg.email.clone())),
        }
    }

    fn pipeline(&self, notifier: Arc<dyn Notifier>) -> Pipeline {
        let p = Pipeline::new(self.store.clone(), notifier);
        match &self.lock_dir {
            Some(dir) => p.with_lock_dir(dir.clone()),
            None => p,
        }
    }

    pub fn target(&self, name: &str) -> Result<&TargetConfig> {
        self.cfg
            .target(name)
            .ok_or_else(|| anyhow!("no target named {:?} in config", name))
    }

    pub fn run(&self, name: &str) -> Result<RunReport> {
        let target = self.target(name)?;
        let collector = target
            .collector
            .build(&self.fetcher)
            .with_context(|| format!("build collector for {}", name))?;
        let report = self
            .pipeline(self.notifier())
            .with_history(target.history)
            .run_target(&target.name, target.label(), &target.mode, collector.as_ref())
            .with_context(|| format!("run {}", name))?;
        Ok(report)
    }

    /// Runs every target even if some fail; errors if any did.
    pub fn run_all(&self) -> Result<Vec<RunReport>> {
        let mut reports = Vec::new();
        let mut failed = Vec::new();
        for target in &self.cfg.targets {
            match self.run(target.name.as_str()) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(target_name = %target.name, error = %format!("{:#}", e), "target failed");
                    failed.push(target.name.to_string());
                }
            }
        }
        if !failed.is_empty() {
            bail!("{} of {} targets failed: {}", failed.len(), self.cfg.targets.len(), failed.join(", "));
        }
        Ok(reports)
    }

    pub fn check(&self, name: &str) -> Result<Check> {
        let target = self.target(name)?;
        let collector = target
            .collector
            .build(&self.fetcher)
            .with_context(|| format!("build collector for {}", name))?;
        let notifier = self
            .notifier
            .clone()
            .unwrap_or_else(|| Arc::new(LogNotifier) as Arc<dyn Notifier>);
        let check = self
            .pipeline(notifier)
            .check_target(&target.name, target.label(), &target.mode, collector.as_ref())
            .with_context(|| format!("check {}", name))?;
        Ok(check)
    }

    pub fn show(&self, name: &str) -> Result<Option<Snapshot>> {
        let target = TargetName::from(name);
        self.store.read(&target).map_err(|e| anyhow!(e))
    }

    /// Recorded runs for `name`, oldest first.
    pub fn history(&self, name: &str) -> Result<Vec<HistoryEntry>> {
        self.store.history(&TargetName::from(name))
    }

    pub fn status(&self) -> Result<Vec<StoredTarget>> {
        let mut out = Vec::new();
        for name in self.store.targets()? {
            let snap = self.store.load(&name);
            out.push(StoredTarget {
                configured: self.cfg.target(name.as_str()).is_some(),
                entities: snap.len(),
                fingerprint: snap.fingerprint(),
                name,
            });
        }
        Ok(out)
    }

    pub fn reset(&self, name: &str) -> Result<bool> {
        self.store.remove(&TargetName::from(name))
    }
}
