//! Authenticated management API client
//!
//! [`Client`] is a thin wrapper over `reqwest` that runs every request through a
//! [`RequestAuthenticator`]. It owns the transport, the credentials, and the
//! [`ChallengeCache`] for the authorities it has been challenged by.
//!
//! # Architecture
//!
//! - **HTTP Layer**: `reqwest` with a fixed timeout and user agent
//! - **Authentication**: bearer header attached only when the request has none
//! - **Challenges**: a `401` carrying a `WWW-Authenticate: Bearer ...` challenge is
//!   recorded, the cached token for the host is dropped, and the request is re-sent
//!   once with a fresh token. Transient failures are not retried here.
//!
//! # Example
//!
//! ```no_run
//! use azure_token_auth::{ApplicationTokenCredential, ClientBuilder, Environment};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let environment = Environment::azure();
//! let credential =
//!     ApplicationTokenCredential::with_secret("c1", "t1", "s1", environment.clone())?;
//!
//! let client = ClientBuilder::for_environment(&environment)?
//!     .token_credential(credential)?
//!     .build()?;
//!
//! let response = client.get("/subscriptions?api-version=2020-01-01").await?;
//! println!("{}", response.status());
//! # Ok(())
//! # }
//! ```

use crate::{
    auth::{RequestAuthenticator, ServiceCredentials},
    cache::TokenStats,
    challenge::{parse_challenge, ChallengeCache},
    config::ClientConfig,
    errors::{Error, Result},
    telemetry::{self, Metrics},
    util::{generate_request_id, header_str},
};
use reqwest::{header::WWW_AUTHENTICATE, Client as HttpClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, trace, warn};

const USER_AGENT_PREFIX: &str = "azure-token-auth-rust";

const CLIENT_REQUEST_ID: &str = "x-ms-client-request-id";

/// Authenticated management API client
#[derive(Clone)]
pub struct Client {
    pub(crate) config: ClientConfig,
    http: HttpClient,
    authenticator: RequestAuthenticator,
    challenges: ChallengeCache,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.config.base_url)
            .field("timeout", &self.config.timeout)
            .field("credentials", &self.config.credentials)
            .finish()
    }
}

impl Client {
    /// Create a new client with the given configuration
    pub(crate) fn new(config: ClientConfig) -> Result<Self> {
        let user_agent = if let Some(suffix) = &config.user_agent_suffix {
            format!("{}/{} {}", USER_AGENT_PREFIX, crate::VERSION, suffix)
        } else {
            format!("{}/{}", USER_AGENT_PREFIX, crate::VERSION)
        };

        let mut http_builder = HttpClient::builder()
            .user_agent(user_agent)
            .timeout(config.timeout);

        if !config.allow_insecure_http {
            http_builder = http_builder.https_only(true);
        }

        let http = http_builder
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            authenticator: RequestAuthenticator::new(config.credentials.clone()),
            challenges: ChallengeCache::new(),
            metrics: telemetry::metrics_for(&config.telemetry_config),
            http,
            config,
        })
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Credentials applied to requests
    pub fn credentials(&self) -> &ServiceCredentials {
        &self.config.credentials
    }

    /// Challenges recorded from `401` responses
    pub fn challenge_cache(&self) -> &ChallengeCache {
        &self.challenges
    }

    /// Token statistics, when authenticating through a token supplier
    pub fn token_stats(&self) -> Option<&TokenStats> {
        self.config
            .credentials
            .token_supplier()
            .map(|supplier| supplier.stats())
    }

    /// Start a request for `path`, relative to the base URL unless absolute
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
        };

        self.http
            .request(method, url)
            .header(CLIENT_REQUEST_ID, generate_request_id())
    }

    /// `GET` `path` and return the successful response
    pub async fn get(&self, path: &str) -> Result<Response> {
        let request = self
            .request(Method::GET, path)
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build request: {}", e)))?;
        self.execute(request).await
    }

    /// `GET` `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(Error::from)
    }

    /// Authenticate and send `request`
    ///
    /// Non-success statuses are returned as `Error::Http`. Authentication failures
    /// surface before anything is sent.
    pub async fn execute(&self, request: reqwest::Request) -> Result<Response> {
        let caller_authenticated = request
            .headers()
            .get(self.config.credentials.header_name())
            .is_some_and(|value| !value.is_empty());
        let redrive = if caller_authenticated {
            None
        } else {
            request.try_clone()
        };
        let host = request.url().host_str().map(str::to_string);

        let authorized = self.authenticator.authorize_reqwest(request).await?;
        trace!(method = %authorized.method(), url = %authorized.url(), "sending request");
        let response = self.http.execute(authorized).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return self.check_status(response).await;
        }

        let (Some(retry), Some(host)) = (redrive, host) else {
            return self.check_status(response).await;
        };
        let Some(supplier) = self.config.credentials.token_supplier() else {
            return self.check_status(response).await;
        };

        self.record_challenge(&response, &host);
        let _ = supplier.invalidate(&host).await?;
        self.metrics.record_reauthentication(&host);
        debug!(%host, "401 received, re-sending with a fresh token");

        let authorized = self.authenticator.authorize_reqwest(retry).await?;
        let response = self.http.execute(authorized).await?;
        self.check_status(response).await
    }

    fn record_challenge(&self, response: &Response, host: &str) {
        let Some(header) = header_str(response.headers(), WWW_AUTHENTICATE.as_str()) else {
            return;
        };
        let Some((scheme, params)) = parse_challenge(&header) else {
            warn!(%host, "unparseable WWW-Authenticate header");
            return;
        };
        if !scheme.eq_ignore_ascii_case("bearer") {
            return;
        }

        let authority = params
            .get("authorization")
            .or_else(|| params.get("authorization_uri"))
            .cloned()
            .unwrap_or_else(|| host.to_string());
        debug!(%authority, "recording authentication challenge");
        self.challenges.put(&authority, Some(params));
    }

    async fn check_status(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let request_id = header_str(response.headers(), "x-ms-request-id")
            .or_else(|| header_str(response.headers(), "x-request-id"));
        let message = match response.text().await {
            Ok(body) if !body.is_empty() => body,
            _ => status.canonical_reason().unwrap_or("unknown").to_string(),
        };

        Err(Error::Http {
            status: status.as_u16(),
            message,
            request_id,
        })
    }
}
