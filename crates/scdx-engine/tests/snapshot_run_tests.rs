//! End-to-end snapshot runs against SQLite source and target databases

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{day, Lake, TARGET};
use scdx_core::{CloseReason, KeyValue, SnapshotTableStore, Value};
use scdx_engine::commands::engine_command::{
    apply_engine_command, EngineCommand, EngineCommandResult,
};

#[test]
fn test_first_run_then_update() {
    let mut lake = Lake::new();
    let def = lake.definition("");

    // T0: customer 1 lives in Seattle
    lake.set_source(&[(Some(1), "A", "Seattle")]);
    let first = lake.run(&def, day(1));
    assert_eq!(first.counts.inserted, 1);
    assert_eq!(first.receipt.as_ref().unwrap().run_seq, 1);

    // T1: moved to Portland
    lake.set_source(&[(Some(1), "A", "Portland")]);
    let second = lake.run(&def, day(2));
    assert_eq!(second.counts.updated, 1);

    let key = KeyValue::parse("1").unwrap();
    let history = lake.store.history(TARGET, Some(&key)).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].data.get("city"), Some(&Value::from("Seattle")));
    assert_eq!(history[0].valid_to, Some(day(2)));
    assert_eq!(history[1].data.get("city"), Some(&Value::from("Portland")));
    assert_eq!(history[1].valid_from, day(2));
    assert!(history[1].is_current());
}

#[test]
fn test_unchanged_rerun_writes_nothing() {
    let mut lake = Lake::new();
    let def = lake.definition("");
    lake.set_source(&[(Some(1), "A", "Seattle"), (Some(2), "B", "Boston")]);
    lake.run(&def, day(1));

    let rerun = lake.run(&def, day(2));

    assert_eq!(rerun.counts.unchanged, 2);
    assert_eq!(rerun.planned_writes, 0);
    assert!(!rerun.committed());
    assert_eq!(lake.store.history(TARGET, None).unwrap().len(), 2);
    assert_eq!(lake.store.list_runs(TARGET).unwrap().len(), 1);
}

#[test]
fn test_hard_delete_invalidation() {
    let mut lake = Lake::new();
    let def = lake.definition("    invalidate_hard_deletes: true");
    lake.set_source(&[(Some(1), "A", "Seattle"), (Some(2), "B", "Boston")]);
    lake.run(&def, day(1));

    lake.set_source(&[(Some(1), "A", "Seattle")]);
    let outcome = lake.run(&def, day(2));
    assert_eq!(outcome.counts.invalidated, 1);

    let key = KeyValue::parse("2").unwrap();
    assert!(lake.store.current_version(TARGET, &key).unwrap().is_none());
    let history = lake.store.history(TARGET, Some(&key)).unwrap();
    assert_eq!(history[0].valid_to, Some(day(2)));
    assert_eq!(history[0].close_reason, Some(CloseReason::Invalidated));
}

#[test]
fn test_soft_mode_keeps_missing_key_current() {
    let mut lake = Lake::new();
    let def = lake.definition("");
    lake.set_source(&[(Some(1), "A", "Seattle"), (Some(2), "B", "Boston")]);
    lake.run(&def, day(1));
    lake.set_source(&[(Some(1), "A", "Seattle")]);
    lake.run(&def, day(2));

    let key = KeyValue::parse("2").unwrap();
    assert!(lake.store.current_version(TARGET, &key).unwrap().is_some());
}

#[test]
fn test_dry_run_writes_nothing() {
    let mut lake = Lake::new();
    let def = lake.definition("");
    lake.set_source(&[(Some(1), "A", "Seattle")]);

    let outcome = lake.try_run(&def, day(1), true).unwrap();
    assert_eq!(outcome.counts.inserted, 1);
    assert_eq!(outcome.planned_writes, 1);
    assert!(!outcome.committed());
    assert!(lake.store.history(TARGET, None).unwrap().is_empty());
}

#[test]
fn test_read_commands() {
    let mut lake = Lake::new();
    let def = lake.definition("");
    lake.set_source(&[(Some(1), "A", "Seattle"), (Some(2), "B", "Boston")]);
    lake.run(&def, day(1));
    lake.set_source(&[(Some(1), "A", "Portland"), (Some(2), "B", "Boston")]);
    lake.run(&def, day(3));

    let current = apply_engine_command(
        EngineCommand::SnapshotCurrent {
            name: TARGET.to_string(),
        },
        &mut lake.store,
    )
    .unwrap();
    match current {
        EngineCommandResult::Rows(rows) => {
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].data.get("city"), Some(&Value::from("Portland")));
        }
        other => panic!("unexpected {:?}", other),
    }

    let then = apply_engine_command(
        EngineCommand::SnapshotAsOf {
            name: TARGET.to_string(),
            at: day(2),
        },
        &mut lake.store,
    )
    .unwrap();
    match then {
        EngineCommandResult::Rows(rows) => {
            assert_eq!(rows[0].data.get("city"), Some(&Value::from("Seattle")));
        }
        other => panic!("unexpected {:?}", other),
    }

    let verify = apply_engine_command(
        EngineCommand::SnapshotVerify {
            name: TARGET.to_string(),
        },
        &mut lake.store,
    )
    .unwrap();
    match verify {
        EngineCommandResult::Verify(report) => {
            assert!(report.is_clean());
            assert_eq!(report.versions_checked, 3);
        }
        other => panic!("unexpected {:?}", other),
    }

    let runs = apply_engine_command(
        EngineCommand::SnapshotList {
            name: TARGET.to_string(),
        },
        &mut lake.store,
    )
    .unwrap();
    match runs {
        EngineCommandResult::Runs(runs) => {
            assert_eq!(runs.iter().map(|r| r.run_seq).collect::<Vec<_>>(), vec![1, 2]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_run_timestamp_truncated_to_millis() {
    let mut lake = Lake::new();
    let def = lake.definition("");
    lake.set_source(&[(Some(1), "A", "Seattle")]);
    let at = day(1) + chrono::Duration::microseconds(1_500);
    let outcome = lake.run(&def, at);
    assert_eq!(outcome.run_at, day(1) + chrono::Duration::milliseconds(1));

    let key = KeyValue::parse("1").unwrap();
    let stored = lake.store.current_version(TARGET, &key).unwrap().unwrap();
    assert_eq!(stored.valid_from, outcome.run_at);
}
