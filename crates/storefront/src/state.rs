//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ApiConfig;
use crate::services::oauth::{self, IdentityProvider, OAuthError};
use crate::services::sms::{self, SmsError, SmsSender};

/// Error building the outbound collaborators.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("SMS sender: {0}")]
    Sms(#[from] SmsError),
    #[error("identity provider: {0}")]
    IdentityProvider(#[from] OAuthError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: PgPool,
    sms: Arc<dyn SmsSender>,
    identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Create application state with the collaborators named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if an outbound HTTP client cannot be built.
    pub fn new(config: ApiConfig, pool: PgPool) -> Result<Self, StateError> {
        let sms = sms::from_config(&config.sms)?;
        let identity = oauth::from_config(config.google.as_ref())?;
        Ok(Self::with_collaborators(config, pool, sms, identity))
    }

    /// Create application state with explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        config: ApiConfig,
        pool: PgPool,
        sms: Arc<dyn SmsSender>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                sms,
                identity,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn sms(&self) -> &dyn SmsSender {
        self.inner.sms.as_ref()
    }

    /// The configured third-party sign-in provider, if any.
    #[must_use]
    pub fn identity_provider(&self) -> Option<&dyn IdentityProvider> {
        self.inner.identity.as_deref()
    }
}
