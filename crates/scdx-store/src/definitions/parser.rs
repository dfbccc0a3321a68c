//! Definitions parser with validation
//!
//! Parses YAML and validates schema version, name uniqueness, source
//! selection and each target's tracking configuration.

#![allow(clippy::result_large_err)]

use crate::definitions::format_v1::{DefinitionsFile, SnapshotDefinition};
use crate::errors::{definition_error, Result};
use scdx_core::errors::{ExError, ExErrorKind};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Validated definitions, with source paths resolved
#[derive(Debug, Clone)]
pub struct Definitions {
    snapshots: Vec<SnapshotDefinition>,
}

impl Definitions {
    pub fn snapshots(&self) -> &[SnapshotDefinition] {
        &self.snapshots
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snapshots.iter().map(|s| s.name.as_str())
    }

    /// Look up one target by name
    ///
    /// ## Errors
    ///
    /// `ExErrorKind::NotFound` when no target has that name.
    pub fn get(&self, name: &str) -> Result<&SnapshotDefinition> {
        self.snapshots
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                ExError::new(ExErrorKind::NotFound)
                    .with_op("definitions_lookup")
                    .with_snapshot(name)
                    .with_message("no snapshot with this name is defined")
            })
    }
}

/// Load and validate a definitions file
pub fn load_definitions(path: &Path) -> Result<Definitions> {
    let content = fs::read_to_string(path).map_err(|e| {
        ExError::new(ExErrorKind::Io)
            .with_op("definitions_load")
            .with_message(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_definitions_str(&content, base_dir)
}

/// Parse definitions from a string; relative paths resolve against `base_dir`
pub fn parse_definitions_str(content: &str, base_dir: &Path) -> Result<Definitions> {
    let file: DefinitionsFile = serde_yaml::from_str(content)
        .map_err(|e| definition_error(&format!("YAML parse error: {}", e)))?;

    validate(&file)?;

    let snapshots = file
        .snapshots
        .into_iter()
        .map(|mut s| {
            if let Some(sqlite) = s.source.sqlite.as_mut() {
                sqlite.path = resolve(base_dir, &sqlite.path);
            }
            if let Some(json) = s.source.json.as_mut() {
                *json = resolve(base_dir, json);
            }
            s
        })
        .collect();

    Ok(Definitions { snapshots })
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn validate(file: &DefinitionsFile) -> Result<()> {
    if file.schema_version != 1 {
        return Err(definition_error(&format!(
            "Unsupported schema_version: {}. Expected 1",
            file.schema_version
        )));
    }

    let mut names = HashSet::new();
    for snapshot in &file.snapshots {
        if snapshot.name.trim().is_empty() {
            return Err(definition_error("snapshot name must not be empty"));
        }
        if !names.insert(snapshot.name.as_str()) {
            return Err(definition_error(&format!(
                "Duplicate snapshot name {}",
                snapshot.name
            )));
        }

        let sources = usize::from(snapshot.source.sqlite.is_some())
            + usize::from(snapshot.source.json.is_some());
        if sources != 1 {
            return Err(definition_error(&format!(
                "snapshot {} must name exactly one source (sqlite or json)",
                snapshot.name
            )));
        }

        snapshot.config().validate().map_err(|e| {
            ExError::from(e)
                .with_op("definitions_parse")
                .with_snapshot(snapshot.name.clone())
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdx_core::TrackedColumns;

    const VALID: &str = r#"
schema_version: 1
snapshots:
  - name: customers_snapshot
    source:
      sqlite: { path: bronze.db, table: customers }
    unique_key: [id]
    strategy: check
    check_cols: all
    invalidate_hard_deletes: true
  - name: orders_snapshot
    source:
      json: /data/orders.json
    unique_key: [order_id]
    check_cols: [status, amount]
    duplicate_key_policy: keep_last
"#;

    #[test]
    fn test_parse_valid_definitions() {
        let defs = parse_definitions_str(VALID, Path::new("/srv/lake")).unwrap();
        let names: Vec<&str> = defs.names().collect();
        assert_eq!(names, vec!["customers_snapshot", "orders_snapshot"]);

        let customers = defs.get("customers_snapshot").unwrap();
        assert_eq!(
            customers.source.sqlite.as_ref().unwrap().path,
            PathBuf::from("/srv/lake/bronze.db")
        );
        assert!(customers.config().invalidate_hard_deletes);
        assert!(customers.config().reinsert_invalidated);

        let orders = defs.get("orders_snapshot").unwrap();
        assert_eq!(orders.source.json.as_deref(), Some(Path::new("/data/orders.json")));
        assert_eq!(
            orders.check_cols,
            TrackedColumns::Columns(vec!["status".into(), "amount".into()])
        );
    }

    #[test]
    fn test_reject_invalid_schema_version() {
        let yaml = "schema_version: 2\nsnapshots: []\n";
        let err = parse_definitions_str(yaml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("schema_version"));
    }

    #[test]
    fn test_reject_timestamp_strategy() {
        let yaml = r#"
schema_version: 1
snapshots:
  - name: s
    source: { json: a.json }
    unique_key: [id]
    strategy: timestamp
"#;
        assert!(parse_definitions_str(yaml, Path::new(".")).is_err());
    }

    #[test]
    fn test_reject_duplicate_names() {
        let yaml = r#"
schema_version: 1
snapshots:
  - { name: s, source: { json: a.json }, unique_key: [id] }
  - { name: s, source: { json: b.json }, unique_key: [id] }
"#;
        let err = parse_definitions_str(yaml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("Duplicate snapshot name"));
    }

    #[test]
    fn test_reject_two_sources() {
        let yaml = r#"
schema_version: 1
snapshots:
  - name: s
    source: { json: a.json, sqlite: { path: a.db, table: t } }
    unique_key: [id]
"#;
        assert!(parse_definitions_str(yaml, Path::new(".")).is_err());
    }

    #[test]
    fn test_reject_key_column_in_check_cols() {
        let yaml = r#"
schema_version: 1
snapshots:
  - name: s
    source: { json: a.json }
    unique_key: [id]
    check_cols: [id, city]
"#;
        let err = parse_definitions_str(yaml, Path::new(".")).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
        assert_eq!(err.snapshot(), Some("s"));
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let defs = parse_definitions_str(VALID, Path::new(".")).unwrap();
        assert_eq!(defs.get("missing").unwrap_err().kind(), ExErrorKind::NotFound);
    }
}
