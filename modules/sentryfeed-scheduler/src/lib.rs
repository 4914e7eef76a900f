pub mod beat;
pub mod runtime;
pub mod source_manager;
pub mod worker_pool;

pub use beat::{run_beat, MaintenanceCadence};
pub use runtime::Runtime;
pub use source_manager::{SourceManager, SyncDiff};
pub use worker_pool::{Queue, WorkerPool, DEFAULT_POOL_SIZE};
