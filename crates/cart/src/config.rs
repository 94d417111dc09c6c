//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required when signed in
//! - `CART_API_BASE_URL` - Base URL of the remote cart API (e.g., `https://api.example.com/`).
//!   Without it the cart is local-only and remote calls fail with
//!   [`RemoteError::NotConfigured`](crate::remote::RemoteError::NotConfigured).
//!
//! ## Optional
//! - `CART_REQUEST_TIMEOUT_SECS` - Timeout for every remote call (default: 10)
//! - `CART_TOTAL_TOLERANCE` - Allowed absolute difference between local and
//!   remote totals at checkout (default: 1)
//! - `CART_STORAGE_DIR` - Directory for the durable local cart (default: .cartwheel)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_STORAGE_DIR: &str = ".cartwheel";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Base URL of the remote cart API. Endpoint paths are joined onto it.
    ///
    /// `None` for a local-only cart.
    pub api_base_url: Option<Url>,
    /// Timeout applied to every remote call.
    pub request_timeout: Duration,
    /// Absolute tolerance when comparing local and remote totals.
    pub total_tolerance: Decimal,
    /// Directory backing the file local store.
    pub storage_dir: PathBuf,
}

impl CartConfig {
    /// Create a configuration with defaults for everything but the API URL.
    #[must_use]
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url: Some(with_trailing_slash(api_base_url)),
            ..Self::local_only()
        }
    }

    /// Create a configuration without a remote cart API.
    #[must_use]
    pub fn local_only() -> Self {
        Self {
            api_base_url: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            total_tolerance: Decimal::ONE,
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_optional_env("CART_API_BASE_URL")
            .map(|raw| parse_base_url(&raw))
            .transpose()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CART_API_BASE_URL".to_string(), e.to_string())
            })?;
        let timeout_secs = parse_env_or_default::<u64>(
            "CART_REQUEST_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let total_tolerance = parse_env_or_default::<Decimal>("CART_TOTAL_TOLERANCE", "1")?;
        if total_tolerance.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "CART_TOTAL_TOLERANCE".to_string(),
                "must not be negative".to_string(),
            ));
        }
        let storage_dir =
            PathBuf::from(get_env_or_default("CART_STORAGE_DIR", DEFAULT_STORAGE_DIR));

        Ok(Self {
            api_base_url,
            request_timeout: Duration::from_secs(timeout_secs),
            total_tolerance,
            storage_dir,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// `Url::join` replaces the last path segment unless the base ends in `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn parse_base_url(raw: &str) -> Result<Url, url::ParseError> {
    Url::parse(raw.trim()).map(with_trailing_slash)
}

/// Get an optional environment variable.
pub(crate) fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
