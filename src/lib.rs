//! Azure token authentication for Rust
//!
//! Obtains OAuth2 access tokens from Azure Active Directory on behalf of a service
//! principal or a user, caches them per principal, authority, and resource, and
//! attaches them as bearer credentials to outgoing management API requests.
//!
//! # Features
//!
//! - Service principal credentials with a client secret or a client certificate
//! - User credentials with refresh-token reuse and password fallback
//! - Concurrent callers share a single token acquisition per cache
//! - Pluggable [`TokenStore`] with an in-memory default
//! - `WWW-Authenticate` challenge recording with a single re-authenticated retry
//! - Authentication profiles in properties or JSON form
//! - Sovereign cloud [`Environment`]s
//! - Secure value handling with zeroization
//!
//! # Example
//!
//! ```no_run
//! use azure_token_auth::{ApplicationTokenCredential, ClientBuilder, Environment};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let environment = Environment::azure();
//!     let credential = ApplicationTokenCredential::with_secret(
//!         "client-id",
//!         "contoso.onmicrosoft.com",
//!         "client-secret",
//!         environment.clone(),
//!     )?;
//!
//!     let client = ClientBuilder::for_environment(&environment)?
//!         .token_credential(credential)?
//!         .build()?;
//!
//!     let subscriptions: serde_json::Value = client
//!         .get_json("/subscriptions?api-version=2020-01-01")
//!         .await?;
//!     println!("{}", subscriptions);
//!
//!     Ok(())
//! }
//! ```

#![deny(
    missing_docs,
    missing_debug_implementations,
    unsafe_code,
    unused_results
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod auth;
mod cache;
mod challenge;
mod client;
mod config;
mod credentials;
mod environment;
mod errors;
mod identity;
mod profile;
mod supplier;
/// Telemetry and observability support
#[cfg(feature = "metrics")]
pub mod telemetry;

#[cfg(not(feature = "metrics"))]
mod telemetry;
mod util;

pub use auth::{RequestAuthenticator, ServiceCredentials};
pub use cache::{CachedToken, MemoryTokenStore, SharedTokenStore, TokenStats, TokenStore};
pub use challenge::{parse_challenge, ChallengeCache, ChallengeParams};
pub use client::Client;
pub use config::{ClientBuilder, ClientConfig};
pub use credentials::{
    authority, ApplicationTokenCredential, ClientAuthentication, ClientCertificate,
    TokenCredential, UserTokenCredential,
};
pub use environment::{Endpoint, Environment};
pub use errors::{Error, ErrorKind, Result};
pub use profile::AuthProfile;
pub use supplier::{cache_key, TokenSupplier, TokenSupplierBuilder};

// Re-export commonly used types
pub use secrecy::SecretString;

/// Crate version, matches Cargo.toml version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
