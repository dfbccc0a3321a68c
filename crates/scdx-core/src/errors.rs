use scdx_core_types::{RunId, TraceId};
use thiserror::Error;

/// Result type alias using ScdError
pub type Result<T> = std::result::Result<T, ScdError>;

/// Result type alias using the structured ExError
pub type ExResult<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Coarse error classes surfaced to operators and schedulers.
///
/// Connectivity failures are retried by the caller. Integrity failures leave
/// the target untouched (the apply phase rolled back) and the next run is a
/// safe retry. Configuration failures need a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Connectivity,
    Integrity,
    Internal,
}

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// handling, tests and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Configuration
    InvalidConfig,
    MissingColumn,
    NullKey,
    DuplicateKey,
    InvalidInput,
    NotFound,

    // Connectivity
    Connectivity,
    Io,

    // Integrity
    /// Apply-phase invariant breach (duplicate current row, stale close, non-monotonic run)
    Integrity,
    /// Another run committed against the same target first
    Concurrency,
    Persistence,

    // Internal
    Serialization,
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::MissingColumn => "ERR_MISSING_COLUMN",
            ExErrorKind::NullKey => "ERR_NULL_KEY",
            ExErrorKind::DuplicateKey => "ERR_DUPLICATE_KEY",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::Connectivity => "ERR_CONNECTIVITY",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Integrity => "ERR_INTEGRITY",
            ExErrorKind::Concurrency => "ERR_CONCURRENCY",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }

    /// Map the kind onto its operator-facing class
    pub fn class(&self) -> ErrorClass {
        match self {
            ExErrorKind::InvalidConfig
            | ExErrorKind::MissingColumn
            | ExErrorKind::NullKey
            | ExErrorKind::DuplicateKey
            | ExErrorKind::InvalidInput
            | ExErrorKind::NotFound => ErrorClass::Configuration,
            ExErrorKind::Connectivity | ExErrorKind::Io => ErrorClass::Connectivity,
            ExErrorKind::Integrity | ExErrorKind::Concurrency | ExErrorKind::Persistence => {
                ErrorClass::Integrity
            }
            ExErrorKind::Serialization | ExErrorKind::Internal => ErrorClass::Internal,
        }
    }
}

/// Canonical structured error type
///
/// Carries classification fields for programmatic handling and context for
/// debugging. Row payloads never go in here; see `RowError`.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    snapshot: Option<String>,
    key: Option<String>,
    column: Option<String>,
    run_id: Option<RunId>,
    trace_id: Option<TraceId>,
    message: String,
    source: Option<Box<ExError>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            snapshot: None,
            key: None,
            column: None,
            run_id: None,
            trace_id: None,
            message: String::new(),
            source: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add snapshot target context
    pub fn with_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.snapshot = Some(snapshot.into());
        self
    }

    /// Add unique key context (canonical key form)
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add column context
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Add run ID context
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Add trace ID context
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    pub fn trace_id(&self) -> Option<&TraceId> {
        self.trace_id.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(snapshot) = &self.snapshot {
            write!(f, " (snapshot: {})", snapshot)?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {})", key)?;
        }
        if let Some(column) = &self.column {
            write!(f, " (column: {})", column)?;
        }
        if let Some(source) = &self.source {
            write!(f, " <- {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|s| s as &(dyn std::error::Error + 'static))
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy raised by the core kernel
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScdError {
    // ===== Configuration =====
    /// The snapshot configuration is unusable
    #[error("Invalid snapshot configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A configured column is absent from the row's schema
    #[error("Column not present in source row: {column}")]
    MissingColumn { column: String },

    /// A unique-key column holds NULL
    #[error("Unique key column {column} is null")]
    NullKey { column: String },

    /// Two rows in one extract share a unique key
    #[error("Duplicate unique key {key} in extract (first seen at row {first_ordinal})")]
    DuplicateKey { key: String, first_ordinal: usize },

    /// A value cannot be represented in the snapshot model
    #[error("Unsupported value in column {column}: {reason}")]
    UnsupportedValue { column: String, reason: String },

    // ===== Integrity =====
    /// Superseding a version whose valid_from is not strictly before the run
    #[error("Run at {run_at} cannot close version {version_id} of key {key} (valid_from {valid_from})")]
    NonMonotonicRun {
        key: String,
        version_id: String,
        valid_from: String,
        run_at: String,
    },

    /// A close targeted a version that is not the key's current version
    #[error("Version {version_id} of key {key} is not current")]
    VersionNotCurrent { key: String, version_id: String },

    /// An append would leave a key with two current versions
    #[error("Key {key} would have more than one current version")]
    DuplicateCurrent { key: String },

    /// The run ledger moved since the run read its state
    #[error("Run sequence mismatch for {snapshot}: expected {expected}, found {actual}")]
    RunSequenceMismatch {
        snapshot: String,
        expected: u64,
        actual: u64,
    },

    /// The run timestamp precedes the last committed run
    #[error("Run at {run_at} precedes last committed run at {last_run_at} for {snapshot}")]
    RunTimestampRegression {
        snapshot: String,
        run_at: String,
        last_run_at: String,
    },

    // ===== Internal =====
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<ScdError> for ExError {
    fn from(err: ScdError) -> Self {
        match err {
            ScdError::InvalidConfig { reason } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(reason)
            }

            ScdError::MissingColumn { column } => ExError::new(ExErrorKind::MissingColumn)
                .with_column(column)
                .with_message("Configured column not present in source row"),

            ScdError::NullKey { column } => ExError::new(ExErrorKind::NullKey)
                .with_column(column)
                .with_message("Unique key column is null"),

            ScdError::DuplicateKey { key, first_ordinal } => {
                ExError::new(ExErrorKind::DuplicateKey)
                    .with_key(key)
                    .with_message(format!(
                        "Unique key already seen at row {} of the extract",
                        first_ordinal
                    ))
            }

            ScdError::UnsupportedValue { column, reason } => {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_column(column)
                    .with_message(reason)
            }

            ScdError::NonMonotonicRun {
                key,
                version_id,
                valid_from,
                run_at,
            } => ExError::new(ExErrorKind::Integrity)
                .with_key(key)
                .with_message(format!(
                    "Run at {} is not after valid_from {} of version {}",
                    run_at, valid_from, version_id
                )),

            ScdError::VersionNotCurrent { key, version_id } => {
                ExError::new(ExErrorKind::Integrity)
                    .with_key(key)
                    .with_message(format!("Version {} is not current", version_id))
            }

            ScdError::DuplicateCurrent { key } => ExError::new(ExErrorKind::Integrity)
                .with_key(key)
                .with_message("Key would have more than one current version"),

            ScdError::RunSequenceMismatch {
                snapshot,
                expected,
                actual,
            } => ExError::new(ExErrorKind::Concurrency)
                .with_snapshot(snapshot)
                .with_message(format!(
                    "Expected last run sequence {} but found {}",
                    expected, actual
                )),

            ScdError::RunTimestampRegression {
                snapshot,
                run_at,
                last_run_at,
            } => ExError::new(ExErrorKind::Integrity)
                .with_snapshot(snapshot)
                .with_message(format!(
                    "Run at {} precedes last committed run at {}",
                    run_at, last_run_at
                )),

            ScdError::Serialization { message } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }
        }
    }
}

/// Conversion from serde_json::Error to ScdError
impl From<serde_json::Error> for ScdError {
    fn from(err: serde_json::Error) -> Self {
        ScdError::Serialization {
            message: err.to_string(),
        }
    }
}
