//! Canonical schema constants for structured logging and events
//!
//! These constants keep field names identical across the engine, the store and
//! the error facility.

// Canonical field keys for structured logging
pub const FIELD_COMPONENT: &str = "component";
pub const FIELD_OP: &str = "op";
pub const FIELD_EVENT: &str = "event";
pub const FIELD_DURATION_MS: &str = "duration_ms";
pub const FIELD_RUN_ID: &str = "run_id";
pub const FIELD_TRACE_ID: &str = "trace_id";

// Entity identifiers
pub const FIELD_SNAPSHOT: &str = "snapshot";
pub const FIELD_KEY: &str = "key";
pub const FIELD_VERSION_ID: &str = "version_id";

// Run counters
pub const FIELD_INSERTED: &str = "inserted";
pub const FIELD_UPDATED: &str = "updated";
pub const FIELD_INVALIDATED: &str = "invalidated";
pub const FIELD_UNCHANGED: &str = "unchanged";
pub const FIELD_ROW_ERRORS: &str = "row_errors";

// Error fields
pub const FIELD_ERR_KIND: &str = "err_kind";
pub const FIELD_ERR_CODE: &str = "err_code";

// Canonical event names
pub const EVENT_START: &str = "start";
pub const EVENT_END: &str = "end";
pub const EVENT_END_ERROR: &str = "end_error";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_accessibility() {
        assert!(!FIELD_COMPONENT.is_empty());
        assert!(!FIELD_OP.is_empty());
        assert!(!FIELD_SNAPSHOT.is_empty());
        assert!(!EVENT_START.is_empty());
        assert!(!EVENT_END.is_empty());
        assert!(!EVENT_END_ERROR.is_empty());
    }

    #[test]
    fn test_event_names_are_distinct() {
        assert_ne!(EVENT_START, EVENT_END);
        assert_ne!(EVENT_START, EVENT_END_ERROR);
        assert_ne!(EVENT_END, EVENT_END_ERROR);
    }

    #[test]
    fn test_counter_fields_are_distinct() {
        let fields = [
            FIELD_INSERTED,
            FIELD_UPDATED,
            FIELD_INVALIDATED,
            FIELD_UNCHANGED,
            FIELD_ROW_ERRORS,
        ];
        let unique: std::collections::HashSet<_> = fields.iter().collect();
        assert_eq!(unique.len(), fields.len());
    }
}
