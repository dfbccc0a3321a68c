#![allow(clippy::unwrap_used, clippy::expect_used)]

use scdx_core::errors::{ErrorClass, ExError, ExErrorKind, ScdError};
use scdx_core_types::RunId;

#[test]
fn test_every_kind_has_a_stable_code() {
    let kinds = [
        ExErrorKind::InvalidConfig,
        ExErrorKind::MissingColumn,
        ExErrorKind::NullKey,
        ExErrorKind::DuplicateKey,
        ExErrorKind::InvalidInput,
        ExErrorKind::NotFound,
        ExErrorKind::Connectivity,
        ExErrorKind::Io,
        ExErrorKind::Integrity,
        ExErrorKind::Concurrency,
        ExErrorKind::Persistence,
        ExErrorKind::Serialization,
        ExErrorKind::Internal,
    ];
    for kind in kinds {
        assert!(kind.code().starts_with("ERR_"), "{:?}", kind);
    }
}

#[test]
fn test_classes_follow_operator_taxonomy() {
    assert_eq!(ExErrorKind::NullKey.class(), ErrorClass::Configuration);
    assert_eq!(ExErrorKind::Connectivity.class(), ErrorClass::Connectivity);
    assert_eq!(ExErrorKind::Concurrency.class(), ErrorClass::Integrity);
    assert_eq!(ExErrorKind::Internal.class(), ErrorClass::Internal);
}

#[test]
fn test_run_sequence_mismatch_is_concurrency() {
    let ex: ExError = ScdError::RunSequenceMismatch {
        snapshot: "customers_snapshot".into(),
        expected: 3,
        actual: 4,
    }
    .into();
    assert_eq!(ex.kind(), ExErrorKind::Concurrency);
    assert_eq!(ex.snapshot(), Some("customers_snapshot"));
}

#[test]
fn test_display_includes_context() {
    let run_id = RunId::new();
    let err = ExError::new(ExErrorKind::Integrity)
        .with_op("commit")
        .with_snapshot("customers_snapshot")
        .with_key("[1]")
        .with_run_id(run_id.clone())
        .with_message("close_versions affected 0 rows, expected 1");

    let rendered = err.to_string();
    assert!(rendered.starts_with("[ERR_INTEGRITY] in operation 'commit'"));
    assert!(rendered.contains("(snapshot: customers_snapshot)"));
    assert!(rendered.contains("(key: [1])"));
    assert_eq!(err.run_id(), Some(&run_id));
}

#[test]
fn test_source_chain() {
    let inner = ExError::new(ExErrorKind::Connectivity).with_message("database is locked");
    let outer = ExError::new(ExErrorKind::Persistence)
        .with_op("commit")
        .with_source(inner);
    assert_eq!(
        outer.source_error().map(ExError::kind),
        Some(ExErrorKind::Connectivity)
    );
    assert!(std::error::Error::source(&outer).is_some());
}
