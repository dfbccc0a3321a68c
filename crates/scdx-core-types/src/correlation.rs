//! Correlation types for run tracking and tracing
//!
//! Every reconciliation run carries a `RunId`; it is written into each version
//! row the run creates and into the run ledger, so a version can always be
//! traced back to the run that produced it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_v7_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Wrap an id read back from a store or passed in by a caller
            pub fn from_string(s: String) -> Self {
                Self(s)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

uuid_v7_id!(
    /// Identifier of one reconciliation run. UUIDv7, so ids sort in creation order.
    RunId
);

uuid_v7_id!(
    /// Links a run to an outer orchestration (scheduler job, CLI invocation)
    TraceId
);

/// Context carried through a run for correlation
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: RunId,
    pub trace_id: Option<TraceId>,
}

impl RunContext {
    /// Create a new context with a fresh RunId
    pub fn new() -> Self {
        Self {
            run_id: RunId::new(),
            trace_id: None,
        }
    }

    /// Create a context with an existing RunId
    pub fn with_run_id(run_id: RunId) -> Self {
        Self {
            run_id,
            trace_id: None,
        }
    }

    /// Add a TraceId to the context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
