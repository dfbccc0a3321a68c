//! Sensitive data marker for automatic redaction
//!
//! Source rows routinely carry personal data. Row payloads that end up in
//! error reports are wrapped in `Sensitive<T>` so they never reach a log line.

use std::fmt;

/// Wrapper that redacts its content in Debug, Display and Serialize
///
/// # Example
///
/// ```
/// use scdx_core_types::Sensitive;
///
/// let email = Sensitive::new("jane@example.com");
/// println!("{:?}", email); // Prints: ***REDACTED***
/// assert_eq!(email.expose(), &"jane@example.com");
/// ```
pub struct Sensitive<T>(T);

impl<T> Sensitive<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the underlying value
    pub fn expose(&self) -> &T {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> T {
        self.0
    }
}

const REDACTED: &str = "***REDACTED***";

impl<T> fmt::Debug for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> fmt::Display for Sensitive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl<T> serde::Serialize for Sensitive<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<T: Clone> Clone for Sensitive<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: PartialEq> PartialEq for Sensitive<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
