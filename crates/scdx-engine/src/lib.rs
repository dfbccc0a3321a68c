//! SCDX Engine - Orchestration layer
//!
//! Coordinates source extracts, the Reconciler and a snapshot table store
//! into complete runs, and serves the read commands over stored history.

pub mod commands;
