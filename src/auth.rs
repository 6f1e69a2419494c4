//! Request authentication
//!
//! [`ServiceCredentials`] describes what a client authenticates with:
//!
//! 1. **Token** - a fixed token sent as `Authorization: <scheme> <token>`
//! 2. **Header** - a fixed value sent in an arbitrary header
//! 3. **Supplier** - tokens obtained and cached by a [`TokenSupplier`]
//!
//! [`RequestAuthenticator`] applies the credentials to outgoing requests. A request
//! that already carries a non-empty value for the credential's header is passed
//! through untouched, so caller-supplied authentication is never overwritten.
//!
//! # Examples
//!
//! ```
//! use azure_token_auth::{RequestAuthenticator, ServiceCredentials};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authenticator = RequestAuthenticator::new(ServiceCredentials::bearer("static-token"));
//!
//! let request = http::Request::get("https://management.azure.com/subscriptions").body(())?;
//! let request = authenticator.authorize(request).await?;
//! assert_eq!(request.headers()["authorization"], "Bearer static-token");
//! # Ok(())
//! # }
//! ```

use crate::{
    errors::{Error, Result},
    supplier::TokenSupplier,
};
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use tracing::trace;

/// Credentials a client authenticates its requests with
#[derive(Clone)]
pub enum ServiceCredentials {
    /// Fixed token sent as `Authorization: <scheme> <token>`
    Token {
        /// Authorization scheme, `Bearer` by default
        scheme: String,
        /// Token value
        token: SecretString,
    },
    /// Fixed value sent in a custom header
    Header {
        /// Header name
        name: HeaderName,
        /// Header value
        value: SecretString,
    },
    /// Tokens acquired and cached per target host
    Supplier(TokenSupplier),
}

impl ServiceCredentials {
    /// Fixed bearer token
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::token("Bearer", token)
    }

    /// Fixed token with a custom scheme
    pub fn token(scheme: impl Into<String>, token: impl Into<String>) -> Self {
        let scheme = scheme.into();
        ServiceCredentials::Token {
            scheme: if scheme.is_empty() {
                "Bearer".to_string()
            } else {
                scheme
            },
            token: SecretString::new(token.into()),
        }
    }

    /// Fixed value in a custom header
    pub fn header(name: &str, value: impl Into<String>) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Configuration(format!("Invalid header name {:?}: {}", name, e)))?;
        Ok(ServiceCredentials::Header {
            name,
            value: SecretString::new(value.into()),
        })
    }

    /// Tokens from a supplier
    pub fn supplier(supplier: TokenSupplier) -> Self {
        ServiceCredentials::Supplier(supplier)
    }

    /// Header these credentials are sent in
    pub fn header_name(&self) -> HeaderName {
        match self {
            ServiceCredentials::Header { name, .. } => name.clone(),
            _ => AUTHORIZATION,
        }
    }

    /// Header value for a request to `host`
    pub(crate) async fn header_value(&self, host: Option<&str>) -> Result<HeaderValue> {
        let raw = match self {
            ServiceCredentials::Token { scheme, token } => {
                format!("{} {}", scheme, token.expose_secret())
            }
            ServiceCredentials::Header { value, .. } => value.expose_secret().clone(),
            ServiceCredentials::Supplier(supplier) => {
                let host = host.ok_or_else(|| {
                    Error::Configuration("Request URL has no host to authenticate for".to_string())
                })?;
                let token = supplier.get_token(host).await?;
                format!("Bearer {}", token.expose_secret())
            }
        };

        let mut value = HeaderValue::from_str(&raw)
            .map_err(|_| Error::Configuration("Credential is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// The supplier behind these credentials, if any
    pub fn token_supplier(&self) -> Option<&TokenSupplier> {
        match self {
            ServiceCredentials::Supplier(supplier) => Some(supplier),
            _ => None,
        }
    }
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceCredentials::Token { scheme, .. } => {
                write!(f, "ServiceCredentials::Token({} ****)", scheme)
            }
            ServiceCredentials::Header { name, .. } => {
                write!(f, "ServiceCredentials::Header({}: ****)", name)
            }
            ServiceCredentials::Supplier(supplier) => f
                .debug_tuple("ServiceCredentials::Supplier")
                .field(supplier)
                .finish(),
        }
    }
}

/// Attaches credentials to outgoing requests
#[derive(Debug, Clone)]
pub struct RequestAuthenticator {
    credentials: ServiceCredentials,
}

impl RequestAuthenticator {
    /// Authenticator for `credentials`
    pub fn new(credentials: ServiceCredentials) -> Self {
        Self { credentials }
    }

    /// Credentials applied by this authenticator
    pub fn credentials(&self) -> &ServiceCredentials {
        &self.credentials
    }

    /// Header to add to a request with `headers` targeting `host`, if any
    async fn resolve(
        &self,
        host: Option<&str>,
        headers: &HeaderMap,
    ) -> Result<Option<(HeaderName, HeaderValue)>> {
        let name = self.credentials.header_name();
        if headers.get(&name).is_some_and(|value| !value.is_empty()) {
            trace!(header = %name, "request already authenticated");
            return Ok(None);
        }
        let value = self.credentials.header_value(host).await?;
        Ok(Some((name, value)))
    }

    /// Return `request` with credentials attached
    ///
    /// A request that already carries the credential header is returned unchanged.
    /// On error the request is dropped and never sent.
    pub async fn authorize<B>(&self, request: http::Request<B>) -> Result<http::Request<B>> {
        let (mut parts, body) = request.into_parts();
        if let Some((name, value)) = self.resolve(parts.uri.host(), &parts.headers).await? {
            let _ = parts.headers.insert(name, value);
        }
        Ok(http::Request::from_parts(parts, body))
    }

    /// [`authorize`](Self::authorize) for a `reqwest` request
    pub async fn authorize_reqwest(&self, mut request: reqwest::Request) -> Result<reqwest::Request> {
        let host = request.url().host_str().map(str::to_string);
        if let Some((name, value)) = self.resolve(host.as_deref(), request.headers()).await? {
            let _ = request.headers_mut().insert(name, value);
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(auth: Option<&str>) -> http::Request<()> {
        let mut builder = http::Request::get("https://management.azure.com/subscriptions");
        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        builder.body(()).unwrap()
    }

    #[tokio::test]
    async fn test_static_token_headers() {
        let bearer = RequestAuthenticator::new(ServiceCredentials::bearer("token123"));
        let req = bearer.authorize(request(None)).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer token123");

        let custom = RequestAuthenticator::new(ServiceCredentials::token("SharedKey", "abc"));
        let req = custom.authorize(request(None)).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "SharedKey abc");

        let empty_scheme = ServiceCredentials::token("", "abc");
        assert!(matches!(empty_scheme, ServiceCredentials::Token { ref scheme, .. } if scheme == "Bearer"));
    }

    #[tokio::test]
    async fn test_existing_authorization_is_kept() {
        let auth = RequestAuthenticator::new(ServiceCredentials::bearer("token123"));
        let req = auth.authorize(request(Some("X"))).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "X");
        assert_eq!(req.headers().get_all(AUTHORIZATION).iter().count(), 1);
    }

    #[tokio::test]
    async fn test_empty_authorization_is_replaced() {
        let auth = RequestAuthenticator::new(ServiceCredentials::bearer("token123"));
        let req = auth.authorize(request(Some(""))).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer token123");
    }

    #[tokio::test]
    async fn test_custom_header_credentials() {
        let creds = ServiceCredentials::header("x-api-key", "key456").unwrap();
        let auth = RequestAuthenticator::new(creds);

        let req = auth.authorize(request(Some("Bearer other"))).await.unwrap();
        assert_eq!(req.headers()["x-api-key"], "key456");
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer other");

        assert!(ServiceCredentials::header("bad header", "v").is_err());
    }

    #[tokio::test]
    async fn test_authorize_reqwest() {
        let auth = RequestAuthenticator::new(ServiceCredentials::bearer("token123"));
        let url = reqwest::Url::parse("https://management.azure.com/").unwrap();
        let req = reqwest::Request::new(reqwest::Method::GET, url);
        let req = auth.authorize_reqwest(req).await.unwrap();
        assert_eq!(req.headers()[AUTHORIZATION], "Bearer token123");
        assert!(req.headers()[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn test_credentials_debug() {
        let creds = ServiceCredentials::bearer("secret");
        assert_eq!(format!("{:?}", creds), "ServiceCredentials::Token(Bearer ****)");

        let creds = ServiceCredentials::header("x-api-key", "secret").unwrap();
        assert_eq!(format!("{:?}", creds), "ServiceCredentials::Header(x-api-key: ****)");
    }
}
