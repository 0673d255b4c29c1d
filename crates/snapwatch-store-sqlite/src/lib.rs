mod storage;

pub use storage::SqliteSnapshotStore;
