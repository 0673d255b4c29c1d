use snapwatch_core::{CollectionError, Snapshot};

pub trait Collector {
    /// Short human description for logs ("listing https://...").
    fn describe(&self) -> String;

    /// Produce the current snapshot, or fail. Never returns a partial
    /// snapshot as if it were complete.
    fn collect(&self) -> Result<Snapshot, CollectionError>;
}

/// Fixed snapshot; handy for dry runs and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticCollector {
    pub snapshot: Snapshot,
}

impl StaticCollector {
    pub fn new(snapshot: Snapshot) -> Self {
        Self { snapshot }
    }
}

impl Collector for StaticCollector {
    fn describe(&self) -> String {
        format!("static ({} entities)", self.snapshot.len())
    }

    fn collect(&self) -> Result<Snapshot, CollectionError> {
        Ok(self.snapshot.clone())
    }
}

/// Always fails with `Unreachable`.
#[derive(Clone, Debug)]
pub struct FailingCollector {
    pub reason: String,
}

impl Collector for FailingCollector {
    fn describe(&self) -> String {
        "failing".to_string()
    }

    fn collect(&self) -> Result<Snapshot, CollectionError> {
        Err(CollectionError::unreachable("failing collector", &self.reason))
    }
}
