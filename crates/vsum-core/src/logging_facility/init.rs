//! Subscriber installation per logging profile

use serde::{Deserialize, Serialize};
use std::sync::Once;
use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

/// Logging profile configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Human-readable output for development
    #[default]
    Development,
    /// JSON structured output for production
    Production,
    /// Test capture mode for deterministic testing
    Test,
}

static INIT_ONCE: Once = Once::new();

const CRATES: [&str; 3] = ["vsum_core", "vsum_store", "vsum_engine"];

/// Directive list for the profile's default level; `RUST_LOG` overrides it
fn default_filter(profile: Profile) -> EnvFilter {
    let level = match profile {
        Profile::Development => "debug",
        Profile::Production | Profile::Test => "info",
    };
    let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives.join(",")))
}

/// Install the global subscriber for `profile`
///
/// Only the first call has an effect. If another subscriber is already
/// installed (for example the test capture layer) it is left in place.
///
/// - **Development**: human-readable, `debug` for the vsum crates
/// - **Production**: JSON, `info`
/// - **Test**: bare registry; assertions use `init_test_capture()` instead
///
/// # Example
///
/// ```
/// use vsum_core::logging_facility::{init, Profile};
///
/// init(Profile::Development);
/// ```
pub fn init(profile: Profile) {
    INIT_ONCE.call_once(|| {
        let installed = match profile {
            Profile::Development => tracing_subscriber::fmt()
                .with_env_filter(default_filter(profile))
                .finish()
                .try_init(),
            Profile::Production => tracing_subscriber::fmt()
                .json()
                .with_env_filter(default_filter(profile))
                .finish()
                .try_init(),
            Profile::Test => tracing_subscriber::registry().try_init(),
        };
        if installed.is_err() {
            tracing::debug!(?profile, "subscriber already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_idempotent() {
        init(Profile::Test);
        init(Profile::Production);
    }

    #[test]
    fn test_default_filter_covers_every_crate() {
        let filter = default_filter(Profile::Development).to_string();
        if std::env::var("RUST_LOG").is_err() {
            for krate in CRATES {
                assert!(filter.contains(&format!("{krate}=debug")), "{filter}");
            }
        }
    }

    #[test]
    fn test_profile_deserializes_from_config_names() {
        let profile: Profile = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(profile, Profile::Production);
        assert_eq!(Profile::default(), Profile::Development);
    }
}
