// Integration tests for snapshot definition files

#![allow(clippy::unwrap_used, clippy::expect_used)]

use scdx_core::SourceExtractProvider;
use scdx_store::load_definitions;

#[test]
fn test_load_resolves_relative_paths_and_builds_provider() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("customers.json"), r#"[{"id": 1}]"#).unwrap();
    let defs_path = dir.path().join("snapshots.yml");
    std::fs::write(
        &defs_path,
        r#"
schema_version: 1
snapshots:
  - name: customers_snapshot
    source:
      json: customers.json
    unique_key: [id]
"#,
    )
    .unwrap();

    let defs = load_definitions(&defs_path).unwrap();
    let def = defs.get("customers_snapshot").unwrap();
    let provider = def.provider().unwrap();
    assert_eq!(provider.extract().unwrap().len(), 1);
}

#[test]
fn test_missing_definitions_file() {
    let err = load_definitions(std::path::Path::new("/nonexistent/snapshots.yml")).unwrap_err();
    assert_eq!(err.kind(), scdx_core::ExErrorKind::Io);
}
