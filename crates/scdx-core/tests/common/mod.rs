use chrono::{DateTime, TimeZone, Utc};
use scdx_core::{
    ApplyBatch, CommitReceipt, MemoryTableStore, ReconcileResult, Reconciler, RunStamp,
    SnapshotConfig, SnapshotTableStore, SourceRow,
};
use scdx_core_types::RunId;

pub const TARGET: &str = "customers_snapshot";

/// Midnight UTC on the given day of January 2024
#[allow(dead_code)]
pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, n, 0, 0, 0).unwrap()
}

#[allow(dead_code)]
pub fn customer(id: i64, name: &str, city: &str) -> SourceRow {
    SourceRow::new()
        .with("id", id)
        .with("name", name)
        .with("city", city)
}

#[allow(dead_code)]
pub fn key_config() -> SnapshotConfig {
    SnapshotConfig::new(vec!["id".to_string()])
}

/// Reconcile an extract against the store and commit the plan, the way the
/// engine does. Empty plans are not committed.
#[allow(dead_code)]
pub fn run_once(
    store: &mut MemoryTableStore,
    config: &SnapshotConfig,
    extract: &[SourceRow],
    at: DateTime<Utc>,
) -> (ReconcileResult, Option<CommitReceipt>) {
    let reconciler = Reconciler::new(config.clone()).unwrap();
    let index = store.current_versions(TARGET).unwrap();
    let expected_run_seq = store.last_run(TARGET).unwrap().map_or(0, |r| r.run_seq);
    let stamp = RunStamp::new(RunId::new(), at);
    let result = reconciler.reconcile(extract, &index, &stamp).unwrap();
    if result.plan.is_empty() {
        return (result, None);
    }
    let receipt = store
        .commit(&ApplyBatch {
            snapshot: TARGET.to_string(),
            run_id: stamp.run_id.clone(),
            run_at: at,
            expected_run_seq,
            plan: result.plan.clone(),
            counts: result.counts,
        })
        .unwrap();
    (result, Some(receipt))
}
