//! Extract from a JSON file: either one array of objects or JSON Lines.

#![allow(clippy::result_large_err)]

use crate::errors::io_error;
use scdx_core::errors::{ExError, ExErrorKind, ExResult};
use scdx_core::{SourceExtractProvider, SourceRow};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct JsonFileExtract {
    path: PathBuf,
}

impl JsonFileExtract {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse file contents; exposed for providers that already hold the text
    pub fn parse(content: &str) -> ExResult<Vec<SourceRow>> {
        let trimmed = content.trim_start();
        let values: Vec<(usize, serde_json::Value)> = if trimmed.starts_with('[') {
            let array: Vec<serde_json::Value> =
                serde_json::from_str(trimmed).map_err(|e| invalid(0, &e.to_string()))?;
            array.into_iter().enumerate().collect()
        } else {
            let mut values = Vec::new();
            for (i, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let value = serde_json::from_str(line).map_err(|e| invalid(i + 1, &e.to_string()))?;
                values.push((i + 1, value));
            }
            values
        };

        values
            .into_iter()
            .map(|(position, value)| match value {
                serde_json::Value::Object(object) => SourceRow::from_json_object(&object)
                    .map_err(|e| ExError::from(e).with_op("json_extract")),
                _ => Err(invalid(position, "expected a JSON object")),
            })
            .collect()
    }
}

fn invalid(position: usize, reason: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_op("json_extract")
        .with_message(format!("record {}: {}", position, reason))
}

impl SourceExtractProvider for JsonFileExtract {
    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }

    fn extract(&self) -> ExResult<Vec<SourceRow>> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| io_error("json_extract", e))?;
        let rows = Self::parse(&content)?;
        tracing::debug!(source = %self.describe(), rows = rows.len(), "Extracted source");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdx_core::Value;

    #[test]
    fn test_parse_array() {
        let rows = JsonFileExtract::parse(r#"[{"id": 1, "city": "Seattle"}, {"id": 2, "city": null}]"#)
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("city"), Some(&Value::Null));
    }

    #[test]
    fn test_parse_json_lines() {
        let rows = JsonFileExtract::parse("{\"id\": 1}\n\n{\"id\": 2}\n").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_reject_non_object_record() {
        let err = JsonFileExtract::parse("[1, 2]").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }

    #[test]
    fn test_reject_nested_value() {
        let err = JsonFileExtract::parse(r#"[{"id": 1, "tags": ["a"]}]"#).unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::InvalidInput);
    }
}
