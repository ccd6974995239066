//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `BASKET_API_URL` - Base URL of the storefront API (http or https)
//!
//! ## Optional
//! - `BASKET_SURFACE` - `storefront`, `admin`, or `inventory` (default: storefront)
//! - `BASKET_STATE_FILE` - JSON file for persisted credentials and caches
//!   (default: in-memory only)
//! - `BASKET_CSRF_COOKIE` - Cookie holding the anti-forgery token (default: csrftoken)
//! - `BASKET_CSRF_HEADER` - Header the token is sent in (default: X-CSRFToken)
//! - `BASKET_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `BASKET_DEBOUNCE_MS` - Quiet period before a burst of quantity edits is sent (default: 400)
//! - `BASKET_REPLICATION_MAX_ATTEMPTS` - Attempts per wishlist replication job (default: 3)
//! - `BASKET_REPLICATION_BACKOFF_MS` - Base retry delay for replication (default: 250)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Fraction of error events sent to Sentry (default: 1.0)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use basket_core::Surface;
use reqwest::header::HeaderName;
use thiserror::Error;
use url::Url;

use crate::wishlist::ReplicationPolicy;

const DEFAULT_CSRF_COOKIE: &str = "csrftoken";
const DEFAULT_CSRF_HEADER: &str = "X-CSRFToken";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Basket client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every resource path is resolved against
    pub api_url: Url,
    /// Which client surface this process acts as
    pub surface: Surface,
    /// Where persisted state lives (`None` keeps everything in memory)
    pub state_file: Option<PathBuf>,
    /// Anti-forgery token settings
    pub csrf: CsrfConfig,
    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
    /// Quiet period for debounced quantity edits
    pub debounce: Duration,
    /// Retry policy for wishlist replication
    pub replication: ReplicationPolicy,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error event sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
}

/// Where the anti-forgery token is read from and how it is sent.
#[derive(Debug, Clone)]
pub struct CsrfConfig {
    /// Cookie holding the token
    pub cookie_name: String,
    /// Header the token is sent in on state-mutating requests
    pub header_name: HeaderName,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            header_name: HeaderName::from_static("x-csrftoken"),
        }
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything except the API URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL is not an absolute
    /// http(s) URL.
    pub fn new(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_api_url("BASKET_API_URL", api_url)?,
            surface: Surface::default(),
            state_file: None,
            csrf: CsrfConfig::default(),
            request_timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(400),
            replication: ReplicationPolicy::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let api_url = parse_api_url("BASKET_API_URL", &env.required("BASKET_API_URL")?)?;
        let surface = env.parsed_or("BASKET_SURFACE", Surface::Storefront)?;
        let state_file = env.optional("BASKET_STATE_FILE").map(PathBuf::from);

        let header_raw = env.or_default("BASKET_CSRF_HEADER", DEFAULT_CSRF_HEADER);
        let csrf = CsrfConfig {
            cookie_name: env.or_default("BASKET_CSRF_COOKIE", DEFAULT_CSRF_COOKIE),
            header_name: HeaderName::from_str(&header_raw).map_err(|e| {
                ConfigError::InvalidEnvVar("BASKET_CSRF_HEADER".to_string(), e.to_string())
            })?,
        };

        let request_timeout =
            Duration::from_secs(env.parsed_or("BASKET_REQUEST_TIMEOUT_SECS", 30_u64)?);
        let debounce = Duration::from_millis(env.parsed_or("BASKET_DEBOUNCE_MS", 400_u64)?);

        let max_attempts: u32 = env.parsed_or("BASKET_REPLICATION_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "BASKET_REPLICATION_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let replication = ReplicationPolicy {
            max_attempts,
            base_delay: Duration::from_millis(env.parsed_or("BASKET_REPLICATION_BACKOFF_MS", 250_u64)?),
        };

        Ok(Self {
            api_url,
            surface,
            state_file,
            csrf,
            request_timeout,
            debounce,
            replication,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parsed_or("SENTRY_SAMPLE_RATE", 1.0_f32)?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable lookup with the usual required/optional/default accessors.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Parse a variable, falling back to `default` when unset.
    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key).map_or(Ok(default), |raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
        })
    }
}

/// Parse the API base URL. The path always ends in `/` so resource segments
/// are appended rather than replacing the last one.
fn parse_api_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
