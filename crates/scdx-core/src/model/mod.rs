//! Domain model for snapshot tracking.

pub mod config;
pub mod row;
pub mod value;
pub mod version;

pub use config::{DuplicateKeyPolicy, SnapshotConfig, TrackedColumns};
pub use row::{KeyValue, SourceRow};
pub use value::Value;
pub use version::{CloseReason, CurrentSnapshotIndex, SnapshotRow};
