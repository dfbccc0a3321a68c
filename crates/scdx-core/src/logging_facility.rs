//! Structured logging for snapshot runs
//!
//! Each engine operation (`run_snapshot`, `verify_snapshot`) emits one `start`
//! event and one `end` or `end_error` event through the `log_op_*!` macros, so
//! a scheduler can follow a run by its `run_id`. Store primitives log at debug
//! level. Row payloads are never logged.
//!
//! ```rust
//! use scdx_core::logging_facility::{init, Profile};
//!
//! init(Profile::from_format("json"));
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
