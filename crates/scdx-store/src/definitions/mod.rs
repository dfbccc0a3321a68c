//! Declarative snapshot definitions (`snapshots.yml`).
//!
//! A definitions file names each snapshot target, where its source lives and
//! how it is tracked. Relative source paths resolve against the directory of
//! the definitions file.

mod format_v1;
mod parser;

pub use format_v1::{DefinitionsFile, SnapshotDefinition, SourceSpec, SqliteSourceSpec, Strategy};
pub use parser::{load_definitions, parse_definitions_str, Definitions};
