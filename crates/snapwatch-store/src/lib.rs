pub mod codec;
pub mod fs;
pub mod history;
pub mod lock;
pub mod memory;
pub mod traits;

pub use fs::FsSnapshotStore;
pub use history::HistoryEntry;
pub use lock::{LockError, TargetLock};
pub use memory::InMemorySnapshotStore;
pub use traits::SnapshotStore;
