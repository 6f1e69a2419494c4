//! Token storage
//!
//! A [`TokenStore`] is a plain concurrent key→token map. It never evicts and never
//! sweeps: staleness is decided by the reader comparing [`CachedToken::expires_on`]
//! with the current time. [`SharedTokenStore`] pairs a store with the acquisition lock
//! that [`TokenSupplier`](crate::TokenSupplier) holds around check-then-acquire-then-store.

use moka::sync::Cache;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};

/// A token issued by the identity provider
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// Bearer access token
    pub access_token: SecretString,
    /// Refresh token, for user credentials
    pub refresh_token: Option<SecretString>,
    /// Token type reported by the identity provider (usually `Bearer`)
    pub token_type: String,
    /// Absolute expiry
    pub expires_on: OffsetDateTime,
    /// Resource the token was issued for
    pub resource: String,
}

impl CachedToken {
    /// Create a bearer token without a refresh token
    pub fn new(
        access_token: impl Into<String>,
        expires_on: OffsetDateTime,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            refresh_token: None,
            token_type: "Bearer".to_string(),
            expires_on,
            resource: resource.into(),
        }
    }

    /// Attach a refresh token
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(SecretString::new(refresh_token.into()));
        self
    }

    /// Whether the token may still be presented at `now`
    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        now < self.expires_on
    }

    /// Check if the token has expired
    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Non-empty refresh token, if one was issued
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_ref()
            .map(|token| token.expose_secret().as_str())
            .filter(|token| !token.is_empty())
    }
}

/// Concurrency-safe key→token mapping
///
/// Individual operations need no external locking. Implementations must not evict
/// entries on their own.
pub trait TokenStore: Send + Sync + fmt::Debug {
    /// Token stored under `key`
    fn get(&self, key: &str) -> Option<CachedToken>;

    /// Store `token` under `key`, replacing any previous entry
    fn set(&self, key: &str, token: CachedToken);

    /// Remove and return the token stored under `key`
    fn delete(&self, key: &str) -> Option<CachedToken>;

    /// Whether an entry exists for `key`
    fn contains(&self, key: &str) -> bool;

    /// Remove every entry
    fn clear(&self);
}

/// Default in-memory store
#[derive(Clone)]
pub struct MemoryTokenStore {
    entries: Cache<String, CachedToken>,
}

impl MemoryTokenStore {
    /// Create an empty store
    pub fn new() -> Self {
        // No capacity and no TTL: entries live until overwritten or deleted.
        Self {
            entries: Cache::builder().build(),
        }
    }
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTokenStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<CachedToken> {
        self.entries.get(key)
    }

    fn set(&self, key: &str, token: CachedToken) {
        self.entries.insert(key.to_string(), token);
    }

    fn delete(&self, key: &str) -> Option<CachedToken> {
        self.entries.remove(key)
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn clear(&self) {
        self.entries.invalidate_all();
    }
}

/// A token store together with its acquisition lock
///
/// Clones share both the store and the lock, so every supplier built from the same
/// handle serializes its acquisitions against the others.
#[derive(Clone)]
pub struct SharedTokenStore {
    backing: Arc<dyn TokenStore>,
    gate: Arc<Mutex<()>>,
}

impl SharedTokenStore {
    /// Wrap a custom backing store
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            backing: Arc::new(store),
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Backing store
    pub fn store(&self) -> &dyn TokenStore {
        self.backing.as_ref()
    }

    /// Take the acquisition lock
    pub(crate) async fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Default for SharedTokenStore {
    fn default() -> Self {
        Self::new(MemoryTokenStore::new())
    }
}

impl fmt::Debug for SharedTokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedTokenStore")
            .field("backing", &self.backing)
            .finish()
    }
}

/// Token supplier statistics
#[derive(Debug, Clone)]
pub struct TokenStats {
    inner: Arc<TokenStatsInner>,
}

#[derive(Debug, Default)]
struct TokenStatsInner {
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    acquisitions: AtomicU64,
    failures: AtomicU64,
}

impl TokenStats {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(TokenStatsInner::default()),
        }
    }

    /// Requests served from the store
    pub fn hits(&self) -> u64 {
        self.inner.hits.load(Ordering::Relaxed)
    }

    /// Requests that found no usable entry
    pub fn misses(&self) -> u64 {
        self.inner.misses.load(Ordering::Relaxed)
    }

    /// Misses caused by an expired entry
    pub fn expirations(&self) -> u64 {
        self.inner.expirations.load(Ordering::Relaxed)
    }

    /// Successful token acquisitions from the identity provider
    pub fn acquisitions(&self) -> u64 {
        self.inner.acquisitions.load(Ordering::Relaxed)
    }

    /// Failed token acquisitions
    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Hit rate as a percentage (0.0-100.0)
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    /// Reset all statistics to zero
    pub fn reset(&self) {
        self.inner.hits.store(0, Ordering::Relaxed);
        self.inner.misses.store(0, Ordering::Relaxed);
        self.inner.expirations.store(0, Ordering::Relaxed);
        self.inner.acquisitions.store(0, Ordering::Relaxed);
        self.inner.failures.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        let _ = self.inner.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        let _ = self.inner.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        let _ = self.inner.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquisition(&self) {
        let _ = self.inner.acquisitions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        let _ = self.inner.failures.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn token(value: &str, ttl: Duration) -> CachedToken {
        CachedToken::new(value, OffsetDateTime::now_utc() + ttl, "management.azure.com")
    }

    #[test]
    fn test_cached_token_expiry() {
        assert!(!token("fresh", Duration::hours(1)).is_expired());
        assert!(token("stale", Duration::seconds(-1)).is_expired());

        let t = token("edge", Duration::ZERO);
        assert!(!t.is_valid_at(t.expires_on));
    }

    #[test]
    fn test_empty_refresh_token_is_absent() {
        let t = token("a", Duration::hours(1));
        assert_eq!(t.refresh_token(), None);
        assert_eq!(t.clone().with_refresh_token("").refresh_token(), None);
        assert_eq!(t.with_refresh_token("r1").refresh_token(), Some("r1"));
    }

    #[test]
    fn test_memory_store_operations() {
        let store = MemoryTokenStore::new();
        assert!(!store.contains("k"));
        assert!(store.get("k").is_none());

        store.set("k", token("A1", Duration::hours(1)));
        assert!(store.contains("k"));
        assert_eq!(store.get("k").unwrap().access_token.expose_secret(), "A1");

        store.set("k", token("A2", Duration::hours(1)));
        assert_eq!(store.get("k").unwrap().access_token.expose_secret(), "A2");

        let removed = store.delete("k").unwrap();
        assert_eq!(removed.access_token.expose_secret(), "A2");
        assert!(!store.contains("k"));
        assert!(store.delete("k").is_none());
    }

    #[test]
    fn test_shared_store_clones_share_entries() {
        let shared = SharedTokenStore::default();
        let other = shared.clone();
        shared.store().set("k", token("A1", Duration::hours(1)));
        assert!(other.store().contains("k"));

        other.store().clear();
        assert!(shared.store().get("k").is_none());
    }

    #[test]
    fn test_token_stats() {
        let stats = TokenStats::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_acquisition();

        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.acquisitions(), 1);
        assert_eq!(stats.hit_rate(), 66.66666666666666);

        stats.reset();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.acquisitions(), 0);
    }
}
