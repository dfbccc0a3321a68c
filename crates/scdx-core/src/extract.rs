//! Source extract seam.
//!
//! The engine never talks to the operational source itself; it asks a
//! provider for the full current state of the source relation.

use crate::errors::ExResult;
use crate::model::SourceRow;

/// Supplies the full current state of a source relation.
pub trait SourceExtractProvider {
    /// Short description used in logs (table name, file path)
    fn describe(&self) -> String;

    /// Read every row of the source.
    ///
    /// ## Errors
    ///
    /// Connectivity or I/O failures reading the source, and rows that cannot be
    /// represented as `SourceRow`s.
    fn extract(&self) -> ExResult<Vec<SourceRow>>;
}

/// Extract backed by rows held in memory
#[derive(Debug, Clone, Default)]
pub struct VecExtract {
    rows: Vec<SourceRow>,
}

impl VecExtract {
    pub fn new(rows: Vec<SourceRow>) -> Self {
        Self { rows }
    }
}

impl SourceExtractProvider for VecExtract {
    fn describe(&self) -> String {
        format!("memory ({} rows)", self.rows.len())
    }

    fn extract(&self) -> ExResult<Vec<SourceRow>> {
        Ok(self.rows.clone())
    }
}

impl<P: SourceExtractProvider + ?Sized> SourceExtractProvider for &P {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn extract(&self) -> ExResult<Vec<SourceRow>> {
        (**self).extract()
    }
}
