//! Source extract providers backed by files and SQLite tables.

mod json_file;
mod sqlite_source;

pub use json_file::JsonFileExtract;
pub use sqlite_source::SqliteSourceExtract;
