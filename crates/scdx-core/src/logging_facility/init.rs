//! Logging initialization module
//!
//! Provides a single initialization point for the logging facility.

use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Human-readable output for development
    Development,
    /// JSON structured output for scheduled production runs
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

impl Profile {
    /// Parse a CLI log format name; unknown values fall back to `Development`.
    pub fn from_format(format: &str) -> Self {
        match format {
            "json" => Profile::Production,
            _ => Profile::Development,
        }
    }
}

static INIT_ONCE: Once = Once::new();

/// Initialize the logging facility
///
/// Call once at process start. Later calls are ignored.
///
/// - **Development**: human-readable logs, `scdx=debug` unless `RUST_LOG` is set
/// - **Production**: JSON logs, `scdx=info` unless `RUST_LOG` is set
/// - **Test**: bare registry; use `init_test_capture()` for assertions
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| match profile {
        Profile::Development => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("scdx=debug")),
                )
                .init();
        }
        Profile::Production => {
            tracing_subscriber::fmt()
                .json()
                .with_writer(std::io::stderr)
                .with_env_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("scdx=info")),
                )
                .init();
        }
        Profile::Test => {
            tracing_subscriber::registry().init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_format() {
        assert_eq!(Profile::from_format("json"), Profile::Production);
        assert_eq!(Profile::from_format("pretty"), Profile::Development);
        assert_eq!(Profile::from_format("anything"), Profile::Development);
    }

    #[test]
    fn test_profile_equality() {
        assert_eq!(Profile::Development, Profile::Development);
        assert_ne!(Profile::Development, Profile::Production);
    }
}
