//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `RYANGEL_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER` - unless `SKIP_SMS_SENDING=true`
//!
//! ## Optional
//! - `RYANGEL_HOST` - Bind address (default: 127.0.0.1)
//! - `RYANGEL_PORT` - Listen port (default: 8080)
//! - `TOKEN_TTL_MINUTES` - Bearer token lifetime (default: 1440)
//! - `SHIPPING_FEE` - Base shipping fee before promotions (default: 5.00)
//! - `FRONTEND_URL` - Where the OAuth callback sends shoppers (default: <http://localhost:3000>)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated origins (default: `FRONTEND_URL`)
//! - `SKIP_SMS_SENDING` - Log OTP messages instead of sending them
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URL` - Google sign-in
//! - `PICKUP_STORES_URL` - Pickup store feed (default: eBuy open API)
//! - `PICKUP_STORES_REFRESH_SECS` - Refresh interval, 0 disables (default: 86400)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_PICKUP_STORES_URL: &str = "https://prod-openapi.ebuy.mo/v2/sites";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    pub host: IpAddr,
    pub port: u16,
    /// Shopper-facing site, target of the OAuth callback redirect
    pub frontend_url: String,
    pub cors_allowed_origins: Vec<String>,
    /// Lifetime of an issued bearer token
    pub token_ttl: chrono::Duration,
    /// Shipping fee before promotions
    pub shipping_fee: Decimal,
    pub sms: SmsConfig,
    /// Google sign-in; `None` disables the OAuth routes
    pub google: Option<GoogleOAuthConfig>,
    pub pickup_stores: PickupStoreConfig,
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
    pub sentry_sample_rate: f32,
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON log lines instead of human-readable text
    pub log_json: bool,
}

/// How OTP messages leave the system.
#[derive(Debug, Clone)]
pub enum SmsConfig {
    /// Log the message body instead of sending it (`SKIP_SMS_SENDING=true`).
    LogOnly,
    Twilio(TwilioConfig),
}

/// Twilio REST credentials.
///
/// Implements `Debug` manually to redact the auth token.
#[derive(Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    pub from_number: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .finish()
    }
}

/// Google OAuth client credentials.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: String,
}

impl std::fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// Pickup store feed settings.
#[derive(Debug, Clone)]
pub struct PickupStoreConfig {
    pub source_url: String,
    /// `None` disables the background refresher.
    pub refresh_interval: Option<Duration>,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("RYANGEL_DATABASE_URL")?;
        let host = parse_env("RYANGEL_HOST", "127.0.0.1")?;
        let port = parse_env("RYANGEL_PORT", "8080")?;

        let ttl_minutes: i64 = parse_env("TOKEN_TTL_MINUTES", "1440")?;
        if ttl_minutes <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "TOKEN_TTL_MINUTES".to_string(),
                "must be positive".to_string(),
            ));
        }

        let shipping_fee: Decimal = parse_env("SHIPPING_FEE", "5.00")?;
        if shipping_fee.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "SHIPPING_FEE".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let frontend_url = get_env_or_default("FRONTEND_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS").map_or_else(
            || vec![frontend_url.clone()],
            |origins| split_origins(&origins),
        );

        Ok(Self {
            database_url,
            host,
            port,
            frontend_url,
            cors_allowed_origins,
            token_ttl: chrono::Duration::minutes(ttl_minutes),
            shipping_fee,
            sms: SmsConfig::from_env()?,
            google: GoogleOAuthConfig::from_env()?,
            pickup_stores: PickupStoreConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
            log_json: get_env_or_default("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl SmsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        if parse_bool(&get_env_or_default("SKIP_SMS_SENDING", "false")) {
            return Ok(Self::LogOnly);
        }
        Ok(Self::Twilio(TwilioConfig {
            account_sid: get_required_env("TWILIO_ACCOUNT_SID")?,
            auth_token: get_validated_secret("TWILIO_AUTH_TOKEN")?,
            from_number: get_required_env("TWILIO_PHONE_NUMBER")?,
        }))
    }
}

impl GoogleOAuthConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(client_id) = get_optional_env("GOOGLE_CLIENT_ID") else {
            return Ok(None);
        };
        Ok(Some(Self {
            client_id,
            client_secret: get_validated_secret("GOOGLE_CLIENT_SECRET")?,
            redirect_url: get_required_env("GOOGLE_REDIRECT_URL")?,
        }))
    }
}

impl PickupStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let secs: u64 = parse_env("PICKUP_STORES_REFRESH_SECS", "86400")?;
        Ok(Self {
            source_url: get_env_or_default("PICKUP_STORES_URL", DEFAULT_PICKUP_STORES_URL),
            refresh_interval: (secs > 0).then(|| Duration::from_secs(secs)),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn split_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|o| o.trim().trim_end_matches('/'))
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the credential issued by the provider."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
