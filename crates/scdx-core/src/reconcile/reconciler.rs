//! Row classification and plan construction.
//!
//! ## Classification
//!
//! For each keyed extract row:
//!
//! - no current version → insert (`valid_from = run_at`, open `valid_to`)
//! - current version with a different fingerprint → update (close the old
//!   version at `run_at`, append a new one from `run_at`)
//! - same fingerprint → unchanged, nothing written
//!
//! Current keys absent from the extract are invalidated at `run_at` when hard
//! deletes are tracked and left alone otherwise.
//!
//! ## Row errors
//!
//! A row whose key or fingerprint cannot be computed, a duplicate key, or a
//! key whose current version does not predate the run becomes a [`RowError`].
//! Its key still counts as present in the source, so a bad row never causes an
//! invalidation. In strict mode the first row error fails the whole run.

#![allow(clippy::result_large_err)]

use crate::errors::{ExError, ExResult, ScdError};
use crate::hasher::{compute_version_id, fingerprint_extract};
use crate::model::{
    CurrentSnapshotIndex, DuplicateKeyPolicy, KeyValue, SnapshotConfig, SnapshotRow, SourceRow,
};
use crate::reconcile::plan::{ApplyPlan, RunCounts, VersionClose};
use chrono::{DateTime, Utc};
use scdx_core_types::{RunId, Sensitive};
use std::collections::{HashMap, HashSet};

/// Identity and timestamp of the run being reconciled
#[derive(Debug, Clone)]
pub struct RunStamp {
    pub run_id: RunId,
    pub run_at: DateTime<Utc>,
}

impl RunStamp {
    pub fn new(run_id: RunId, run_at: DateTime<Utc>) -> Self {
        Self { run_id, run_at }
    }
}

/// One entry of the per-row error report
#[derive(Debug, Clone)]
pub struct RowError {
    /// Position in the extract; `None` for errors about stored versions
    pub ordinal: Option<usize>,
    pub key: Option<KeyValue>,
    pub error: ExError,
    pub row: Option<Sensitive<SourceRow>>,
}

/// Plan, counts and error report of one reconciliation
#[derive(Debug, Clone, Default)]
pub struct ReconcileResult {
    pub plan: ApplyPlan,
    pub counts: RunCounts,
    pub row_errors: Vec<RowError>,
}

impl ReconcileResult {
    pub fn has_row_errors(&self) -> bool {
        !self.row_errors.is_empty()
    }
}

/// Reconciles extracts for one snapshot configuration
#[derive(Debug, Clone)]
pub struct Reconciler {
    config: SnapshotConfig,
}

impl Reconciler {
    /// Create a reconciler, rejecting unusable configurations up front.
    ///
    /// ## Errors
    ///
    /// `ExErrorKind::InvalidConfig` when the configuration fails validation.
    pub fn new(config: SnapshotConfig) -> ExResult<Self> {
        config
            .validate()
            .map_err(|e| ExError::from(e).with_op("reconcile"))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Derive the writes that bring the snapshot in line with `extract`.
    ///
    /// ## Errors
    ///
    /// Only in strict mode: the row error with the lowest extract ordinal,
    /// with nothing planned.
    pub fn reconcile(
        &self,
        extract: &[SourceRow],
        index: &CurrentSnapshotIndex,
        stamp: &RunStamp,
    ) -> ExResult<ReconcileResult> {
        let cfg = &self.config;
        let mut result = ReconcileResult::default();
        let fingerprints = fingerprint_extract(extract, &cfg.tracked_columns, &cfg.unique_key);

        // Keys seen in the extract, whether or not their row was usable
        let mut seen: HashSet<KeyValue> = HashSet::new();
        let winners = self.select_rows(extract, &mut seen, &mut result.row_errors);

        for (ordinal, key) in winners {
            let row = &extract[ordinal];
            let fingerprint = match &fingerprints[ordinal] {
                Ok(fp) => fp.clone(),
                Err(e) => {
                    result.row_errors.push(row_error(Some(ordinal), Some(key), e.clone(), row));
                    continue;
                }
            };

            match index.get(&key) {
                Some(current) if current.fingerprint == fingerprint => {
                    result.counts.unchanged += 1;
                }
                Some(current) => {
                    if let Err(e) = check_closable(current, stamp.run_at) {
                        result.row_errors.push(row_error(Some(ordinal), Some(key), e, row));
                        continue;
                    }
                    result.plan.closes.push(VersionClose {
                        key: key.clone(),
                        version_id: current.version_id.clone(),
                    });
                    result
                        .plan
                        .appends
                        .push(new_version(key, fingerprint, row, stamp));
                    result.counts.updated += 1;
                }
                None if index.is_retired(&key) && !cfg.reinsert_invalidated => {
                    result.counts.skipped_invalidated += 1;
                }
                None => {
                    result
                        .plan
                        .appends
                        .push(new_version(key, fingerprint, row, stamp));
                    result.counts.inserted += 1;
                }
            }
        }

        if cfg.invalidate_hard_deletes {
            let mut missing: Vec<&SnapshotRow> =
                index.rows().filter(|r| !seen.contains(&r.key)).collect();
            missing.sort_by(|a, b| a.key.cmp(&b.key));
            for current in missing {
                if let Err(e) = check_closable(current, stamp.run_at) {
                    result.row_errors.push(RowError {
                        ordinal: None,
                        key: Some(current.key.clone()),
                        error: ExError::from(e).with_key(current.key.to_string()),
                        row: None,
                    });
                    continue;
                }
                result.plan.invalidations.push(VersionClose {
                    key: current.key.clone(),
                    version_id: current.version_id.clone(),
                });
                result.counts.invalidated += 1;
            }
        }

        // Extract order; errors about keys absent from the extract go last
        result
            .row_errors
            .sort_by_key(|e| (e.ordinal.is_none(), e.ordinal));
        result.counts.row_errors = result.row_errors.len() as u64;

        tracing::debug!(
            rows = extract.len(),
            inserted = result.counts.inserted,
            updated = result.counts.updated,
            invalidated = result.counts.invalidated,
            unchanged = result.counts.unchanged,
            row_errors = result.counts.row_errors,
            "Reconciled extract"
        );

        if cfg.strict_mode {
            if let Some(first) = result.row_errors.first() {
                return Err(first.error.clone().with_op("reconcile"));
            }
        }
        Ok(result)
    }

    /// Resolve keys and duplicates, returning one (ordinal, key) per usable key
    /// in extract order.
    fn select_rows(
        &self,
        extract: &[SourceRow],
        seen: &mut HashSet<KeyValue>,
        row_errors: &mut Vec<RowError>,
    ) -> Vec<(usize, KeyValue)> {
        let mut order: Vec<KeyValue> = Vec::new();
        let mut occurrences: HashMap<KeyValue, Vec<usize>> = HashMap::new();

        for (ordinal, row) in extract.iter().enumerate() {
            match KeyValue::from_row(row, &self.config.unique_key) {
                Ok(key) => {
                    if seen.insert(key.clone()) {
                        order.push(key.clone());
                    }
                    occurrences.entry(key).or_default().push(ordinal);
                }
                Err(e) => row_errors.push(row_error(Some(ordinal), None, e, row)),
            }
        }

        let mut winners = Vec::with_capacity(order.len());
        for key in order {
            let ordinals = occurrences.remove(&key).unwrap_or_default();
            let chosen = match (ordinals.as_slice(), self.config.duplicate_key_policy) {
                ([only], _) => Some(*only),
                ([first, rest @ ..], DuplicateKeyPolicy::Reject) => {
                    for &ordinal in rest {
                        row_errors.push(row_error(
                            Some(ordinal),
                            Some(key.clone()),
                            ScdError::DuplicateKey {
                                key: key.to_string(),
                                first_ordinal: *first,
                            },
                            &extract[ordinal],
                        ));
                    }
                    None
                }
                ([first, ..], DuplicateKeyPolicy::KeepFirst) => Some(*first),
                ([.., last], DuplicateKeyPolicy::KeepLast) => Some(*last),
                ([], _) => None,
            };
            if let Some(ordinal) = chosen {
                winners.push((ordinal, key));
            }
        }
        winners.sort_by_key(|(ordinal, _)| *ordinal);
        winners
    }
}

/// A current version may only be closed strictly after it became valid
fn check_closable(current: &SnapshotRow, run_at: DateTime<Utc>) -> Result<(), ScdError> {
    if current.valid_from < run_at {
        return Ok(());
    }
    Err(ScdError::NonMonotonicRun {
        key: current.key.to_string(),
        version_id: current.version_id.clone(),
        valid_from: current.valid_from.to_rfc3339(),
        run_at: run_at.to_rfc3339(),
    })
}

fn new_version(key: KeyValue, fingerprint: String, row: &SourceRow, stamp: &RunStamp) -> SnapshotRow {
    SnapshotRow {
        version_id: compute_version_id(&key, &fingerprint, stamp.run_at),
        key,
        fingerprint,
        data: row.clone(),
        valid_from: stamp.run_at,
        valid_to: None,
        close_reason: None,
        run_id: stamp.run_id.clone(),
    }
}

fn row_error(ordinal: Option<usize>, key: Option<KeyValue>, err: ScdError, row: &SourceRow) -> RowError {
    let mut error = ExError::from(err);
    if let Some(k) = &key {
        error = error.with_key(k.to_string());
    }
    RowError {
        ordinal,
        key,
        error,
        row: Some(Sensitive::new(row.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExErrorKind;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn stamp(day: u32) -> RunStamp {
        RunStamp::new(RunId::new(), ts(day))
    }

    fn customer(id: i64, city: &str) -> SourceRow {
        SourceRow::new().with("id", id).with("city", city)
    }

    fn config() -> SnapshotConfig {
        SnapshotConfig::new(vec!["id".into()])
    }

    /// Apply a plan to an index the way a store would, for multi-run tests
    fn advance(index: &CurrentSnapshotIndex, result: &ReconcileResult) -> CurrentSnapshotIndex {
        let closed: HashSet<&KeyValue> = result
            .plan
            .closes
            .iter()
            .chain(result.plan.invalidations.iter())
            .map(|c| &c.key)
            .collect();
        let retired: Vec<KeyValue> = result.plan.invalidations.iter().map(|c| c.key.clone()).collect();
        let rows = index
            .rows()
            .filter(|r| !closed.contains(&r.key))
            .cloned()
            .chain(result.plan.appends.iter().cloned());
        CurrentSnapshotIndex::from_parts(rows, retired)
    }

    #[test]
    fn test_first_run_inserts_everything() {
        let r = Reconciler::new(config()).unwrap();
        let result = r
            .reconcile(
                &[customer(1, "Seattle"), customer(2, "Boston")],
                &CurrentSnapshotIndex::new(),
                &stamp(1),
            )
            .unwrap();
        assert_eq!(result.counts.inserted, 2);
        assert_eq!(result.plan.appends.len(), 2);
        assert!(result.plan.appends.iter().all(|v| v.valid_from == ts(1) && v.is_current()));
    }

    #[test]
    fn test_changed_row_is_superseded() {
        let r = Reconciler::new(config()).unwrap();
        let first = r
            .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);

        let second = r.reconcile(&[customer(1, "Portland")], &index, &stamp(2)).unwrap();
        assert_eq!(second.counts.updated, 1);
        assert_eq!(second.plan.closes.len(), 1);
        assert_eq!(second.plan.closes[0].version_id, first.plan.appends[0].version_id);
        assert_eq!(second.plan.appends[0].valid_from, ts(2));
    }

    #[test]
    fn test_unchanged_rerun_plans_nothing() {
        let r = Reconciler::new(config()).unwrap();
        let first = r
            .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);
        let second = r.reconcile(&[customer(1, "Seattle")], &index, &stamp(2)).unwrap();
        assert!(second.plan.is_empty());
        assert_eq!(second.counts.unchanged, 1);
    }

    #[test]
    fn test_missing_key_untouched_without_hard_deletes() {
        let r = Reconciler::new(config()).unwrap();
        let first = r
            .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);
        let second = r.reconcile(&[], &index, &stamp(2)).unwrap();
        assert!(second.plan.is_empty());
    }

    #[test]
    fn test_missing_key_invalidated_with_hard_deletes() {
        let r = Reconciler::new(config().with_invalidate_hard_deletes(true)).unwrap();
        let first = r
            .reconcile(
                &[customer(1, "Seattle"), customer(2, "Boston")],
                &CurrentSnapshotIndex::new(),
                &stamp(1),
            )
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);
        let second = r.reconcile(&[customer(1, "Seattle")], &index, &stamp(2)).unwrap();
        assert_eq!(second.counts.invalidated, 1);
        assert_eq!(second.plan.invalidations[0].key.as_str(), "[2]");
    }

    #[test]
    fn test_null_key_is_row_error_lenient() {
        let r = Reconciler::new(config()).unwrap();
        let bad = SourceRow::new().with("id", crate::model::Value::Null).with("city", "X");
        let result = r
            .reconcile(&[bad, customer(2, "Boston")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        assert_eq!(result.counts.inserted, 1);
        assert_eq!(result.row_errors.len(), 1);
        assert_eq!(result.row_errors[0].ordinal, Some(0));
        assert_eq!(result.row_errors[0].error.kind(), ExErrorKind::NullKey);
    }

    #[test]
    fn test_strict_mode_aborts_on_first_row_error() {
        let r = Reconciler::new(config().with_strict_mode(true)).unwrap();
        let bad = SourceRow::new().with("city", "X");
        let err = r
            .reconcile(&[customer(1, "Seattle"), bad], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::MissingColumn);
        assert_eq!(err.op(), Some("reconcile"));
    }

    #[test]
    fn test_strict_mode_reports_lowest_ordinal() {
        let r = Reconciler::new(config().with_strict_mode(true)).unwrap();
        // Ordinal 0 fails while fingerprinting, ordinal 1 while keying
        let unstorable = customer(1, "Seattle").with("balance", f64::NAN);
        let keyless = SourceRow::new().with("city", "X");
        let err = r
            .reconcile(&[unstorable, keyless], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
        assert_eq!(err.column(), Some("balance"));
    }

    #[test]
    fn test_row_errors_follow_extract_order() {
        let r = Reconciler::new(config()).unwrap();
        let rows = vec![
            customer(1, "Seattle").with("balance", f64::INFINITY),
            SourceRow::new().with("city", "X"),
            customer(3, "Boston"),
        ];
        let result = r.reconcile(&rows, &CurrentSnapshotIndex::new(), &stamp(1)).unwrap();
        let ordinals: Vec<Option<usize>> = result.row_errors.iter().map(|e| e.ordinal).collect();
        assert_eq!(ordinals, vec![Some(0), Some(1)]);
        assert_eq!(result.counts.inserted, 1);
        assert_eq!(result.counts.row_errors, 2);
    }

    #[test]
    fn test_duplicate_reject_excludes_key() {
        let r = Reconciler::new(config()).unwrap();
        let result = r
            .reconcile(
                &[customer(1, "Seattle"), customer(1, "Portland"), customer(2, "Boston")],
                &CurrentSnapshotIndex::new(),
                &stamp(1),
            )
            .unwrap();
        assert_eq!(result.counts.inserted, 1);
        assert_eq!(result.row_errors.len(), 1);
        assert_eq!(result.row_errors[0].ordinal, Some(1));
        assert_eq!(result.row_errors[0].error.kind(), ExErrorKind::DuplicateKey);
    }

    #[test]
    fn test_duplicate_keep_last() {
        let r = Reconciler::new(config().with_duplicate_key_policy(DuplicateKeyPolicy::KeepLast))
            .unwrap();
        let result = r
            .reconcile(
                &[customer(1, "Seattle"), customer(1, "Portland")],
                &CurrentSnapshotIndex::new(),
                &stamp(1),
            )
            .unwrap();
        assert!(result.row_errors.is_empty());
        assert_eq!(
            result.plan.appends[0].data.get("city"),
            Some(&crate::model::Value::from("Portland"))
        );
    }

    #[test]
    fn test_duplicate_keep_first() {
        let r = Reconciler::new(config().with_duplicate_key_policy(DuplicateKeyPolicy::KeepFirst))
            .unwrap();
        let result = r
            .reconcile(
                &[customer(1, "Seattle"), customer(1, "Portland")],
                &CurrentSnapshotIndex::new(),
                &stamp(1),
            )
            .unwrap();
        assert_eq!(
            result.plan.appends[0].data.get("city"),
            Some(&crate::model::Value::from("Seattle"))
        );
    }

    #[test]
    fn test_update_at_same_instant_is_row_error() {
        let r = Reconciler::new(config()).unwrap();
        let first = r
            .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);
        let second = r.reconcile(&[customer(1, "Portland")], &index, &stamp(1)).unwrap();
        assert!(second.plan.is_empty());
        assert_eq!(second.row_errors[0].error.kind(), ExErrorKind::Integrity);
    }

    #[test]
    fn test_errored_key_is_never_invalidated() {
        let cfg = config()
            .with_invalidate_hard_deletes(true)
            .with_tracked_columns(vec!["city".into()]);
        let r = Reconciler::new(cfg).unwrap();
        let first = r
            .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
            .unwrap();
        let index = advance(&CurrentSnapshotIndex::new(), &first);
        let no_city = SourceRow::new().with("id", 1);
        let second = r.reconcile(&[no_city], &index, &stamp(2)).unwrap();
        assert_eq!(second.counts.invalidated, 0);
        assert_eq!(second.row_errors.len(), 1);
    }

    #[test]
    fn test_reinsert_after_invalidation_controlled_by_config() {
        for (reinsert, expected_inserts) in [(true, 1), (false, 0)] {
            let cfg = config()
                .with_invalidate_hard_deletes(true)
                .with_reinsert_invalidated(reinsert);
            let r = Reconciler::new(cfg).unwrap();
            let first = r
                .reconcile(&[customer(1, "Seattle")], &CurrentSnapshotIndex::new(), &stamp(1))
                .unwrap();
            let index = advance(&CurrentSnapshotIndex::new(), &first);
            let second = r.reconcile(&[], &index, &stamp(2)).unwrap();
            let index = advance(&index, &second);
            let third = r.reconcile(&[customer(1, "Seattle")], &index, &stamp(3)).unwrap();
            assert_eq!(third.counts.inserted, expected_inserts);
            assert_eq!(third.counts.skipped_invalidated, 1 - expected_inserts);
        }
    }

    #[test]
    fn test_invalid_config_rejected_before_rows() {
        let err = Reconciler::new(SnapshotConfig::new(vec![])).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidConfig);
    }

    #[test]
    fn test_row_error_payload_is_redacted() {
        let r = Reconciler::new(config()).unwrap();
        let bad = SourceRow::new().with("city", "secret@example.com");
        let result = r.reconcile(&[bad], &CurrentSnapshotIndex::new(), &stamp(1)).unwrap();
        let rendered = format!("{:?}", result.row_errors[0]);
        assert!(!rendered.contains("secret@example.com"));
    }
}
