//! History invariant checks over the stored versions of a target.
//!
//! Per key, ordered by `valid_from`:
//! - every interval is non-empty (`valid_to > valid_from`)
//! - intervals do not overlap
//! - a superseded version ends exactly where the next one starts
//! - only an invalidated version may be followed by a gap
//! - at most one version is current, and it is the last one

use crate::model::{CloseReason, KeyValue, SnapshotRow};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    EmptyInterval,
    Overlap,
    Gap,
    MultipleCurrent,
    /// A superseded version with no successor
    DanglingSupersede,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryViolation {
    pub key: KeyValue,
    pub kind: ViolationKind,
    pub version_id: String,
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryReport {
    pub keys_checked: usize,
    pub versions_checked: usize,
    pub current_versions: usize,
    pub violations: Vec<HistoryViolation>,
}

impl HistoryReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check every key's version chain. Input order does not matter.
pub fn verify_history(rows: &[SnapshotRow]) -> HistoryReport {
    let mut by_key: BTreeMap<&KeyValue, Vec<&SnapshotRow>> = BTreeMap::new();
    for row in rows {
        by_key.entry(&row.key).or_default().push(row);
    }

    let mut report = HistoryReport {
        keys_checked: by_key.len(),
        versions_checked: rows.len(),
        ..Default::default()
    };

    for (key, mut versions) in by_key {
        versions.sort_by(|a, b| a.valid_from.cmp(&b.valid_from));
        let mut violation = |kind: ViolationKind, row: &SnapshotRow, detail: String| {
            report.violations.push(HistoryViolation {
                key: key.clone(),
                kind,
                version_id: row.version_id.clone(),
                detail,
            });
        };

        let current = versions.iter().filter(|v| v.is_current()).count();
        if current > 1 {
            if let Some(last) = versions.last() {
                violation(
                    ViolationKind::MultipleCurrent,
                    last,
                    format!("{} current versions", current),
                );
            }
        }

        for (i, version) in versions.iter().enumerate() {
            if let Some(to) = version.valid_to {
                if to <= version.valid_from {
                    violation(
                        ViolationKind::EmptyInterval,
                        version,
                        format!("valid_to {} <= valid_from {}", to, version.valid_from),
                    );
                }
            }

            let next = match versions.get(i + 1) {
                Some(next) => next,
                None => {
                    if version.close_reason == Some(CloseReason::Superseded) {
                        violation(
                            ViolationKind::DanglingSupersede,
                            version,
                            "superseded but no later version exists".to_string(),
                        );
                    }
                    continue;
                }
            };

            match version.valid_to {
                None => violation(
                    ViolationKind::Overlap,
                    version,
                    format!("open version followed by version from {}", next.valid_from),
                ),
                Some(to) if to > next.valid_from => violation(
                    ViolationKind::Overlap,
                    version,
                    format!("valid_to {} overlaps next valid_from {}", to, next.valid_from),
                ),
                Some(to)
                    if to < next.valid_from
                        && version.close_reason != Some(CloseReason::Invalidated) =>
                {
                    violation(
                        ViolationKind::Gap,
                        version,
                        format!("gap between {} and {}", to, next.valid_from),
                    )
                }
                Some(_) => {}
            }
        }
        report.current_versions += current;
    }

    report
}
