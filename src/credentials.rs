//! Cloud identities and the strategies that turn them into tokens
//!
//! Two credential types cover the supported identity strategies:
//!
//! - [`ApplicationTokenCredential`]: a service principal authenticating with either a
//!   client secret or a client certificate. It always re-authenticates from its secret.
//! - [`UserTokenCredential`]: a user authenticating with a password. When a previous
//!   token carries a refresh token it tries a silent refresh first.
//!
//! Both implement [`TokenCredential`], the single capability the
//! [`TokenSupplier`](crate::TokenSupplier) depends on. Each `authenticate` call runs
//! its network request on a dedicated task that is torn down when the call ends.
//!
//! # Example
//!
//! ```no_run
//! use azure_token_auth::{ApplicationTokenCredential, Environment, TokenCredential};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credential = ApplicationTokenCredential::with_secret(
//!     "client-id",
//!     "tenant-id",
//!     "client-secret",
//!     Environment::azure(),
//! )?;
//! let token = credential.authenticate("management.azure.com", None).await?;
//! println!("expires on {}", token.expires_on);
//! # Ok(())
//! # }
//! ```

use crate::{
    cache::CachedToken,
    environment::Environment,
    errors::{Error, Result},
    identity::{token_endpoint, Grant, IdentityClient},
};
use async_trait::async_trait;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// Lifetime of a signed client assertion
const ASSERTION_LIFETIME_SECS: i64 = 600;

/// A cloud identity able to obtain tokens from its identity provider
#[async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    /// Principal identity: client id for service principals, username for users
    fn principal(&self) -> &str;

    /// Tenant the principal belongs to
    fn domain(&self) -> &str;

    /// Endpoints of the cloud the principal lives in
    fn environment(&self) -> &Environment;

    /// Obtain a token for `resource`
    ///
    /// `previous` is the token last stored for the same cache key, expired or not.
    async fn authenticate(
        &self,
        resource: &str,
        previous: Option<&CachedToken>,
    ) -> Result<CachedToken>;
}

/// Identity provider URL for a tenant: the authentication endpoint plus the domain
pub fn authority(environment: &Environment, domain: &str) -> Result<String> {
    let endpoint = environment.authentication_endpoint().ok_or_else(|| {
        Error::Configuration(format!(
            "environment {} has no active directory endpoint",
            environment.name()
        ))
    })?;
    Ok(format!("{}{}", endpoint, domain))
}

/// Client certificate used to sign assertions
#[derive(Clone)]
pub struct ClientCertificate {
    key: EncodingKey,
    thumbprint: String,
    password: Option<SecretString>,
}

impl ClientCertificate {
    /// Load a PEM bundle holding the certificate and its RSA private key
    ///
    /// Only unencrypted keys can be used; a bundle with an encrypted private key is
    /// rejected even when `password` is supplied.
    pub fn from_pem(pem_bytes: &[u8], password: Option<SecretString>) -> Result<Self> {
        let blocks = pem::parse_many(pem_bytes)
            .map_err(|e| Error::Configuration(format!("Failed to parse certificate PEM: {}", e)))?;

        let certificate = blocks
            .iter()
            .find(|block| block.tag() == "CERTIFICATE")
            .ok_or_else(|| Error::Configuration("No certificate found in PEM".to_string()))?;

        if blocks.iter().any(|block| block.tag() == "ENCRYPTED PRIVATE KEY") {
            return Err(Error::Configuration(
                "Encrypted private keys are not supported; provide the key unencrypted".to_string(),
            ));
        }

        let key_block = blocks
            .iter()
            .find(|block| matches!(block.tag(), "PRIVATE KEY" | "RSA PRIVATE KEY"))
            .ok_or_else(|| Error::Configuration("No private key found in PEM".to_string()))?;

        let key = EncodingKey::from_rsa_pem(pem::encode(key_block).as_bytes()).map_err(|e| {
            Error::Configuration(format!("Failed to parse certificate private key: {}", e))
        })?;

        let thumbprint = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(Sha256::digest(certificate.contents()));

        Ok(Self {
            key,
            thumbprint,
            password,
        })
    }

    /// SHA-256 thumbprint of the certificate, base64url encoded
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Passphrase the certificate was supplied with
    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// Sign a client assertion for `client_id` addressed to `audience`
    fn assertion(&self, client_id: &str, audience: &str) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t_s256 = Some(self.thumbprint.clone());

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            aud: audience.to_string(),
            exp: now + ASSERTION_LIFETIME_SECS,
            iat: now,
            iss: client_id.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            sub: client_id.to_string(),
        };

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| Error::authentication("Failed to sign client assertion", e))
    }
}

impl fmt::Debug for ClientCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificate")
            .field("thumbprint", &self.thumbprint)
            .field("key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims {
    aud: String,
    exp: i64,
    iat: i64,
    iss: String,
    jti: String,
    nbf: i64,
    sub: String,
}

/// How a service principal proves its identity
#[derive(Clone)]
pub enum ClientAuthentication {
    /// Shared client secret
    Secret(SecretString),
    /// Certificate-signed assertion
    Certificate(ClientCertificate),
}

impl fmt::Debug for ClientAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientAuthentication::Secret(_) => write!(f, "ClientAuthentication::Secret(****)"),
            ClientAuthentication::Certificate(cert) => f
                .debug_tuple("ClientAuthentication::Certificate")
                .field(cert)
                .finish(),
        }
    }
}

/// Service principal credential
#[derive(Clone)]
pub struct ApplicationTokenCredential {
    client_id: String,
    domain: String,
    auth: ClientAuthentication,
    environment: Arc<Environment>,
    default_subscription: Option<String>,
    identity: IdentityClient,
}

impl ApplicationTokenCredential {
    /// Service principal authenticating with a client secret
    pub fn with_secret(
        client_id: impl Into<String>,
        domain: impl Into<String>,
        secret: impl Into<String>,
        environment: Environment,
    ) -> Result<Self> {
        Self::new(
            client_id,
            domain,
            ClientAuthentication::Secret(SecretString::new(secret.into())),
            environment,
        )
    }

    /// Service principal authenticating with a PEM client certificate
    pub fn with_certificate(
        client_id: impl Into<String>,
        domain: impl Into<String>,
        certificate_pem: &[u8],
        password: Option<String>,
        environment: Environment,
    ) -> Result<Self> {
        let certificate =
            ClientCertificate::from_pem(certificate_pem, password.map(SecretString::new))?;
        Self::new(
            client_id,
            domain,
            ClientAuthentication::Certificate(certificate),
            environment,
        )
    }

    /// Service principal with an already prepared authentication method
    pub fn new(
        client_id: impl Into<String>,
        domain: impl Into<String>,
        auth: ClientAuthentication,
        environment: Environment,
    ) -> Result<Self> {
        Ok(Self {
            client_id: client_id.into(),
            domain: domain.into(),
            auth,
            environment: Arc::new(environment),
            default_subscription: None,
            identity: IdentityClient::new()?,
        })
    }

    /// Record the subscription used when none is given explicitly
    pub fn with_default_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.default_subscription = Some(subscription_id.into());
        self
    }

    /// Use `http` for token requests instead of the default client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.identity = IdentityClient::with_http(http);
        self
    }

    /// Application (client) id
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Default subscription hint
    pub fn default_subscription(&self) -> Option<&str> {
        self.default_subscription.as_deref()
    }

    /// Authentication method
    pub fn client_authentication(&self) -> &ClientAuthentication {
        &self.auth
    }
}

impl fmt::Debug for ApplicationTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationTokenCredential")
            .field("client_id", &self.client_id)
            .field("domain", &self.domain)
            .field("auth", &self.auth)
            .field("environment", &self.environment.name())
            .field("default_subscription", &self.default_subscription)
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ApplicationTokenCredential {
    fn principal(&self) -> &str {
        &self.client_id
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    async fn authenticate(
        &self,
        resource: &str,
        _previous: Option<&CachedToken>,
    ) -> Result<CachedToken> {
        let authority = authority(&self.environment, &self.domain)?;

        let grant = match &self.auth {
            ClientAuthentication::Secret(secret) => {
                if secret.expose_secret().is_empty() {
                    return Err(Error::rejected("client secret is empty"));
                }
                Grant::ClientSecret {
                    client_id: self.client_id.clone(),
                    secret: secret.clone(),
                }
            }
            ClientAuthentication::Certificate(certificate) => Grant::ClientAssertion {
                client_id: self.client_id.clone(),
                assertion: certificate.assertion(&self.client_id, &token_endpoint(&authority))?,
            },
        };

        self.identity
            .acquire(&authority, resource, grant)
            .await?
            .map_err(Error::from)
    }
}

/// User credential authenticating with a password
#[derive(Clone)]
pub struct UserTokenCredential {
    client_id: String,
    domain: String,
    username: String,
    password: SecretString,
    environment: Arc<Environment>,
    identity: IdentityClient,
}

impl UserTokenCredential {
    /// User `username` signing in through application `client_id`
    pub fn new(
        client_id: impl Into<String>,
        domain: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        environment: Environment,
    ) -> Result<Self> {
        Ok(Self {
            client_id: client_id.into(),
            domain: domain.into(),
            username: username.into(),
            password: SecretString::new(password.into()),
            environment: Arc::new(environment),
            identity: IdentityClient::new()?,
        })
    }

    /// Use `http` for token requests instead of the default client
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.identity = IdentityClient::with_http(http);
        self
    }

    /// Application (client) id used to sign in
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// User name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Exchange a refresh token; `None` means the identity provider refused it
    async fn refresh(
        &self,
        authority: &str,
        resource: &str,
        refresh_token: &str,
    ) -> Result<Option<CachedToken>> {
        let grant = Grant::RefreshToken {
            client_id: self.client_id.clone(),
            refresh_token: SecretString::new(refresh_token.to_string()),
        };

        match self.identity.acquire(authority, resource, grant).await? {
            Ok(token) => Ok(Some(token)),
            Err(failure) if failure.is_rejection() => {
                debug!(user = %self.username, %failure, "refresh token refused, signing in again");
                Ok(None)
            }
            Err(failure) => {
                warn!(user = %self.username, %failure, "refresh token request failed");
                Err(failure.into())
            }
        }
    }
}

impl fmt::Debug for UserTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserTokenCredential")
            .field("client_id", &self.client_id)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"****")
            .field("environment", &self.environment.name())
            .finish()
    }
}

#[async_trait]
impl TokenCredential for UserTokenCredential {
    fn principal(&self) -> &str {
        &self.username
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    fn environment(&self) -> &Environment {
        &self.environment
    }

    async fn authenticate(
        &self,
        resource: &str,
        previous: Option<&CachedToken>,
    ) -> Result<CachedToken> {
        let authority = authority(&self.environment, &self.domain)?;

        if let Some(refresh_token) = previous.and_then(CachedToken::refresh_token) {
            if let Some(token) = self.refresh(&authority, resource, refresh_token).await? {
                return Ok(token);
            }
        }

        if self.password.expose_secret().is_empty() {
            return Err(Error::rejected("password is empty"));
        }

        let grant = Grant::Password {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        };
        self.identity
            .acquire(&authority, resource, grant)
            .await?
            .map_err(Error::from)
    }
}
