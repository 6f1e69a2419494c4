//! Token endpoint protocol
//!
//! One form-encoded `POST {authority}/oauth2/token` per call. Responses follow the
//! v1 token endpoint shape, where `expires_in`/`expires_on` may arrive as JSON
//! numbers or numeric strings.

use crate::{
    cache::CachedToken,
    errors::{Error, Result},
    util::run_scoped,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, trace};

const USER_AGENT_PREFIX: &str = "azure-token-auth-rust";

/// Assumed lifetime when the identity provider reports no expiry
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Grant presented to the token endpoint
#[derive(Clone)]
pub(crate) enum Grant {
    ClientSecret {
        client_id: String,
        secret: SecretString,
    },
    ClientAssertion {
        client_id: String,
        assertion: String,
    },
    Password {
        client_id: String,
        username: String,
        password: SecretString,
    },
    RefreshToken {
        client_id: String,
        refresh_token: SecretString,
    },
}

impl Grant {
    fn name(&self) -> &'static str {
        match self {
            Grant::ClientSecret { .. } | Grant::ClientAssertion { .. } => "client_credentials",
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }

    fn form(&self, resource: &str) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("grant_type", self.name().to_string()),
            ("resource", resource.to_string()),
        ];
        match self {
            Grant::ClientSecret { client_id, secret } => {
                form.push(("client_id", client_id.clone()));
                form.push(("client_secret", secret.expose_secret().clone()));
            }
            Grant::ClientAssertion {
                client_id,
                assertion,
            } => {
                form.push(("client_id", client_id.clone()));
                form.push(("client_assertion_type", CLIENT_ASSERTION_TYPE.to_string()));
                form.push(("client_assertion", assertion.clone()));
            }
            Grant::Password {
                client_id,
                username,
                password,
            } => {
                form.push(("client_id", client_id.clone()));
                form.push(("username", username.clone()));
                form.push(("password", password.expose_secret().clone()));
            }
            Grant::RefreshToken {
                client_id,
                refresh_token,
            } => {
                form.push(("client_id", client_id.clone()));
                form.push(("refresh_token", refresh_token.expose_secret().clone()));
            }
        }
        form
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grant::{}(****)", self.name())
    }
}

/// Why a token request failed
#[derive(Debug)]
pub(crate) enum TokenFailure {
    /// The identity provider answered with an error
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },
    /// The request never produced a response
    Transport(reqwest::Error),
    /// The response could not be understood
    Malformed(String),
}

impl TokenFailure {
    pub(crate) fn is_rejection(&self) -> bool {
        matches!(self, TokenFailure::Rejected { .. })
    }
}

impl fmt::Display for TokenFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenFailure::Rejected {
                status,
                error,
                description: Some(description),
            } => write!(f, "identity provider returned {} {}: {}", status, error, description),
            TokenFailure::Rejected { status, error, .. } => {
                write!(f, "identity provider returned {} {}", status, error)
            }
            TokenFailure::Transport(e) => write!(f, "token request failed: {}", e),
            TokenFailure::Malformed(msg) => write!(f, "invalid token response: {}", msg),
        }
    }
}

impl From<TokenFailure> for Error {
    fn from(failure: TokenFailure) -> Self {
        let message = failure.to_string();
        match failure {
            TokenFailure::Transport(e) => Error::authentication(message, e),
            _ => Error::rejected(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    expires_in: Option<i64>,
    #[serde(default, deserialize_with = "number_or_string")]
    expires_on: Option<i64>,
    #[serde(default)]
    resource: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

impl TokenResponse {
    fn into_token(self, requested_resource: &str, now: OffsetDateTime) -> std::result::Result<CachedToken, TokenFailure> {
        if self.access_token.is_empty() {
            return Err(TokenFailure::Malformed("empty access_token".to_string()));
        }

        let expires_on = match (self.expires_on, self.expires_in) {
            (Some(on), _) => OffsetDateTime::from_unix_timestamp(on)
                .map_err(|e| TokenFailure::Malformed(format!("expires_on: {}", e)))?,
            (None, Some(secs)) => now
                .checked_add(time::Duration::seconds(secs))
                .ok_or_else(|| TokenFailure::Malformed(format!("expires_in out of range: {}", secs)))?,
            (None, None) => now + time::Duration::seconds(DEFAULT_EXPIRES_IN_SECS),
        };

        Ok(CachedToken {
            access_token: SecretString::new(self.access_token),
            refresh_token: self.refresh_token.map(SecretString::new),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_on,
            resource: self
                .resource
                .unwrap_or_else(|| requested_resource.to_string()),
        })
    }
}

/// HTTP client for the identity provider's token endpoint
#[derive(Clone)]
pub(crate) struct IdentityClient {
    http: reqwest::Client,
}

impl IdentityClient {
    pub(crate) fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("{}/{}", USER_AGENT_PREFIX, crate::VERSION))
            .timeout(Duration::from_millis(crate::DEFAULT_TIMEOUT_MS))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    pub(crate) fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Request a token on a dedicated task
    ///
    /// The task is aborted if the caller stops waiting for it.
    pub(crate) async fn acquire(
        &self,
        authority: &str,
        resource: &str,
        grant: Grant,
    ) -> Result<std::result::Result<CachedToken, TokenFailure>> {
        let this = self.clone();
        let authority = authority.to_string();
        let resource = resource.to_string();
        run_scoped(async move { this.request_token(&authority, &resource, &grant).await }).await
    }

    async fn request_token(
        &self,
        authority: &str,
        resource: &str,
        grant: &Grant,
    ) -> std::result::Result<CachedToken, TokenFailure> {
        let url = token_endpoint(authority);
        debug!(grant = grant.name(), %url, resource, "requesting token");

        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&grant.form(resource))
            .send()
            .await
            .map_err(TokenFailure::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(TokenFailure::Transport)?;
        trace!(status = status.as_u16(), bytes = body.len(), "token endpoint responded");

        if !status.is_success() {
            let parsed: TokenErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
            return Err(TokenFailure::Rejected {
                status: status.as_u16(),
                error: parsed
                    .error
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
                description: parsed.error_description,
            });
        }

        let parsed: TokenResponse = serde_json::from_slice(&body)
            .map_err(|e| TokenFailure::Malformed(e.to_string()))?;
        parsed.into_token(resource, OffsetDateTime::now_utc())
    }
}

impl fmt::Debug for IdentityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClient").finish()
    }
}

/// Token endpoint URL for an authority
pub(crate) fn token_endpoint(authority: &str) -> String {
    format!("{}/oauth2/token", authority.trim_end_matches('/'))
}
