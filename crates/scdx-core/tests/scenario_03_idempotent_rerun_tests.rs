//! Scenario 3: rerunning against an unchanged source writes nothing.
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{customer, day, key_config, run_once, TARGET};
use scdx_core::{MemoryTableStore, SnapshotTableStore};

#[test]
fn test_scenario_03_unchanged_rerun_has_zero_writes() {
    let mut store = MemoryTableStore::new();
    let extract = vec![customer(1, "A", "Seattle"), customer(2, "B", "Boston")];
    run_once(&mut store, &key_config(), &extract, day(1));
    let before = store.history(TARGET, None).unwrap();

    let (result, receipt) = run_once(&mut store, &key_config(), &extract, day(2));

    assert_eq!(result.plan.write_count(), 0);
    assert_eq!(result.counts.unchanged, 2);
    assert!(receipt.is_none());
    assert_eq!(store.history(TARGET, None).unwrap(), before);
}

#[test]
fn test_scenario_03_column_order_does_not_matter() {
    let mut store = MemoryTableStore::new();
    run_once(&mut store, &key_config(), &[customer(1, "A", "Seattle")], day(1));

    let reordered = scdx_core::SourceRow::new()
        .with("city", "Seattle")
        .with("name", "A")
        .with("id", 1);
    let (result, _) = run_once(&mut store, &key_config(), &[reordered], day(2));
    assert_eq!(result.counts.unchanged, 1);
}
