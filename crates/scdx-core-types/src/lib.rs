//! Core types shared across SCDX facilities
//!
//! This crate provides foundational types used by both error handling
//! and logging facilities:
//!
//! - **Correlation types**: RunId, TraceId, RunContext
//! - **Sensitive data**: Sensitive<T> marker for automatic redaction of row payloads
//! - **Schema constants**: Canonical field keys and event names

pub mod correlation;
pub mod schema;
pub mod sensitive;

pub use correlation::{RunContext, RunId, TraceId};
pub use sensitive::Sensitive;
