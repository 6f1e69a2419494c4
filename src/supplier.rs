//! Token supplier: the check-then-acquire-then-store protocol
//!
//! [`TokenSupplier::get_token`] derives a cache key from the principal, the
//! authority and the target host, then, while holding the store's acquisition lock,
//! either returns the stored token (when it is still valid) or asks the bound
//! [`TokenCredential`] for a new one and stores it.
//!
//! The lock is coarse: at most one acquisition is in flight per
//! [`SharedTokenStore`], whatever the key. Concurrent callers asking for the same
//! token therefore trigger a single authentication and all receive its result.
//!
//! # Example
//!
//! ```no_run
//! use azure_token_auth::{ApplicationTokenCredential, Environment, TokenSupplier};
//! use secrecy::ExposeSecret;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credential =
//!     ApplicationTokenCredential::with_secret("c1", "t1", "s1", Environment::azure())?;
//! let supplier = TokenSupplier::builder().credential(credential).build()?;
//!
//! let token = supplier.get_token("management.azure.com").await?;
//! println!("{} chars", token.expose_secret().len());
//! # Ok(())
//! # }
//! ```

use crate::{
    cache::{CachedToken, SharedTokenStore, TokenStats},
    credentials::{authority, TokenCredential},
    errors::{Error, Result},
    telemetry::{self, Metrics, TelemetryConfig},
};
use secrecy::SecretString;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{debug, trace, warn};

/// Cache key for a principal, authority and target resource
///
/// Authority and resource are compared case-insensitively; the principal is kept
/// verbatim.
pub fn cache_key(principal: &str, authority: &str, resource: &str) -> String {
    format!(
        "{}@{}#{}",
        principal,
        authority.to_lowercase(),
        resource.to_lowercase()
    )
}

/// Coordinates token lookups, acquisitions and storage for one credential
#[derive(Clone)]
pub struct TokenSupplier {
    credential: Arc<dyn TokenCredential>,
    store: SharedTokenStore,
    stats: TokenStats,
    metrics: Arc<Metrics>,
}

impl fmt::Debug for TokenSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSupplier")
            .field("credential", &self.credential)
            .field("store", &self.store)
            .finish()
    }
}

impl TokenSupplier {
    /// Start building a supplier
    pub fn builder() -> TokenSupplierBuilder {
        TokenSupplierBuilder::default()
    }

    /// Credential tokens are obtained for
    pub fn credential(&self) -> &dyn TokenCredential {
        self.credential.as_ref()
    }

    /// Store tokens are cached in
    pub fn store(&self) -> &SharedTokenStore {
        &self.store
    }

    /// Lookup and acquisition statistics
    pub fn stats(&self) -> &TokenStats {
        &self.stats
    }

    /// Cache key used for tokens targeting `target_host`
    pub fn cache_key(&self, target_host: &str) -> Result<String> {
        let authority = authority(self.credential.environment(), self.credential.domain())?;
        Ok(cache_key(self.credential.principal(), &authority, target_host))
    }

    /// Access token for `target_host`
    ///
    /// Served from the store while the stored token is unexpired; otherwise a new
    /// token is acquired and replaces the entry.
    ///
    /// # Errors
    ///
    /// * `Error::Configuration` if the credential's environment has no authentication endpoint
    /// * `Error::Authentication` if the identity provider rejects the credential or cannot be reached
    pub async fn get_token(&self, target_host: &str) -> Result<SecretString> {
        self.token(target_host)
            .await
            .map(|token| token.access_token)
    }

    /// Full token record for `target_host`, acquiring one if needed
    pub async fn token(&self, target_host: &str) -> Result<CachedToken> {
        let key = self.cache_key(target_host)?;

        let _guard = self.store.lock().await;
        let store = self.store.store();

        let previous = if store.contains(&key) {
            store.get(&key)
        } else {
            None
        };

        if let Some(cached) = &previous {
            if cached.is_valid_at(OffsetDateTime::now_utc()) {
                trace!(%key, "token cache hit");
                self.stats.record_hit();
                self.metrics.record_lookup(target_host, true);
                return Ok(cached.clone());
            }
            debug!(%key, expired_at = %cached.expires_on, "cached token expired");
            self.stats.record_expiration();
        }

        self.stats.record_miss();
        self.metrics.record_lookup(target_host, false);

        let started = Instant::now();
        let outcome = self
            .credential
            .authenticate(target_host, previous.as_ref())
            .await;
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok(token) => {
                debug!(%key, expires_on = %token.expires_on, "acquired token");
                self.stats.record_acquisition();
                self.metrics.record_acquisition(target_host, true, elapsed);
                store.set(&key, token.clone());
                Ok(token)
            }
            Err(e) => {
                warn!(%key, error = %e, "token acquisition failed");
                self.stats.record_failure();
                self.metrics.record_acquisition(target_host, false, elapsed);
                Err(e)
            }
        }
    }

    /// Drop the stored token for `target_host`, returning it
    pub async fn invalidate(&self, target_host: &str) -> Result<Option<CachedToken>> {
        let key = self.cache_key(target_host)?;
        let _guard = self.store.lock().await;
        Ok(self.store.store().delete(&key))
    }
}

/// Builder for [`TokenSupplier`]
#[derive(Default)]
pub struct TokenSupplierBuilder {
    credential: Option<Arc<dyn TokenCredential>>,
    store: Option<SharedTokenStore>,
    telemetry_config: TelemetryConfig,
}

impl fmt::Debug for TokenSupplierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSupplierBuilder")
            .field("credential", &self.credential)
            .field("store", &self.store)
            .finish()
    }
}

impl TokenSupplierBuilder {
    /// Set the credential tokens are obtained for
    pub fn credential(mut self, credential: impl TokenCredential + 'static) -> Self {
        self.credential = Some(Arc::new(credential));
        self
    }

    /// Set an already shared credential
    pub fn shared_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Cache tokens in `store` instead of a private in-memory store
    pub fn store(mut self, store: SharedTokenStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure telemetry/metrics
    #[cfg(feature = "metrics")]
    pub fn with_telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = config;
        self
    }

    /// Build the supplier
    pub fn build(self) -> Result<TokenSupplier> {
        let credential = self.credential.ok_or_else(|| {
            Error::Configuration(
                "A credential is required. Use .credential() to bind one".to_string(),
            )
        })?;

        if credential.environment().authentication_endpoint().is_none() {
            return Err(Error::Configuration(format!(
                "environment {} has no active directory endpoint",
                credential.environment().name()
            )));
        }

        Ok(TokenSupplier {
            credential,
            store: self.store.unwrap_or_default(),
            stats: TokenStats::new(),
            metrics: telemetry::metrics_for(&self.telemetry_config),
        })
    }
}
