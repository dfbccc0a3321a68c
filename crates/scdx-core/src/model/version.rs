//! Versioned snapshot rows and the current-version index.

use crate::model::row::{KeyValue, SourceRow};
use chrono::{DateTime, Utc};
use scdx_core_types::RunId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Why a version stopped being current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A newer version of the same key took over at `valid_to`
    Superseded,
    /// The key disappeared from the source and hard deletes are tracked
    Invalidated,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Superseded => "superseded",
            CloseReason::Invalidated => "invalidated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "superseded" => Some(CloseReason::Superseded),
            "invalidated" => Some(CloseReason::Invalidated),
            _ => None,
        }
    }
}

/// A versioned copy of a source row.
///
/// Everything except `valid_to` and `close_reason` is immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub key: KeyValue,
    pub version_id: String,
    /// Row Hasher output over the tracked columns
    pub fingerprint: String,
    pub data: SourceRow,
    pub valid_from: DateTime<Utc>,
    /// `None` while the version is current
    pub valid_to: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
    pub run_id: RunId,
}

impl SnapshotRow {
    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Whether this version was the live one at `ts`
    pub fn valid_at(&self, ts: DateTime<Utc>) -> bool {
        self.valid_from <= ts && self.valid_to.map_or(true, |to| to > ts)
    }

    /// JSON rendering for downstream consumers: payload columns plus system columns
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = match self.data.to_json() {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        object.insert("scd_key".into(), self.key.as_str().into());
        object.insert("scd_version_id".into(), self.version_id.clone().into());
        object.insert("scd_valid_from".into(), self.valid_from.to_rfc3339().into());
        object.insert(
            "scd_valid_to".into(),
            self.valid_to
                .map(|t| serde_json::Value::String(t.to_rfc3339()))
                .unwrap_or(serde_json::Value::Null),
        );
        object.insert("scd_is_current".into(), self.is_current().into());
        object.insert("scd_run_id".into(), self.run_id.as_str().into());
        serde_json::Value::Object(object)
    }
}

/// Current versions of one snapshot target, keyed by unique key.
///
/// `retired` holds keys that have history but no current version (closed by a
/// hard-delete invalidation). The reconciler needs it to decide whether such a
/// key may be re-inserted.
#[derive(Debug, Clone, Default)]
pub struct CurrentSnapshotIndex {
    current: HashMap<KeyValue, SnapshotRow>,
    retired: HashSet<KeyValue>,
}

impl CurrentSnapshotIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from current rows and retired keys.
    ///
    /// Non-current rows passed in are ignored.
    pub fn from_parts(
        rows: impl IntoIterator<Item = SnapshotRow>,
        retired: impl IntoIterator<Item = KeyValue>,
    ) -> Self {
        let current = rows
            .into_iter()
            .filter(SnapshotRow::is_current)
            .map(|row| (row.key.clone(), row))
            .collect();
        Self {
            current,
            retired: retired.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &KeyValue) -> Option<&SnapshotRow> {
        self.current.get(key)
    }

    pub fn is_retired(&self, key: &KeyValue) -> bool {
        self.retired.contains(key)
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &KeyValue> {
        self.current.keys()
    }

    pub fn rows(&self) -> impl Iterator<Item = &SnapshotRow> {
        self.current.values()
    }
}
