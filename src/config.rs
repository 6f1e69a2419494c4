use crate::{
    auth::ServiceCredentials,
    cache::SharedTokenStore,
    credentials::TokenCredential,
    environment::Environment,
    errors::Result,
    supplier::TokenSupplier,
    telemetry::TelemetryConfig,
    Error,
};
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL requests are resolved against
    pub base_url: String,
    /// Credentials applied to every request
    pub credentials: ServiceCredentials,
    /// Request timeout
    pub timeout: Duration,
    /// User agent suffix
    pub user_agent_suffix: Option<String>,
    /// Telemetry configuration
    pub telemetry_config: TelemetryConfig,
    /// Allow plain HTTP base URLs
    pub allow_insecure_http: bool,
}

/// Builder for creating a configured Client
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    credentials: Option<ServiceCredentials>,
    timeout_ms: u64,
    user_agent_suffix: Option<String>,
    telemetry_config: TelemetryConfig,
    allow_insecure_http: bool,
}

impl ClientBuilder {
    /// Create a new client builder with the given base URL
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the management API (e.g., `"https://management.azure.com"`)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            credentials: None,
            timeout_ms: crate::DEFAULT_TIMEOUT_MS,
            user_agent_suffix: None,
            telemetry_config: TelemetryConfig::default(),
            allow_insecure_http: false,
        }
    }

    /// Builder targeting the resource manager endpoint of `environment`
    pub fn for_environment(environment: &Environment) -> Result<Self> {
        let base_url = environment.resource_manager_endpoint().ok_or_else(|| {
            Error::Configuration(format!(
                "environment {} has no resource manager endpoint",
                environment.name()
            ))
        })?;
        Ok(Self::new(base_url))
    }

    /// Set the credentials applied to every request
    pub fn credentials(mut self, credentials: ServiceCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Authenticate with tokens for `credential`, cached in a private store
    pub fn token_credential(self, credential: impl TokenCredential + 'static) -> Result<Self> {
        self.token_credential_with_store(credential, SharedTokenStore::default())
    }

    /// Authenticate with tokens for `credential`, cached in `store`
    pub fn token_credential_with_store(
        self,
        credential: impl TokenCredential + 'static,
        store: SharedTokenStore,
    ) -> Result<Self> {
        let supplier = TokenSupplier::builder()
            .credential(credential)
            .store(store)
            .build()?;
        Ok(self.credentials(ServiceCredentials::supplier(supplier)))
    }

    /// Set the request timeout in milliseconds
    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Add a custom user agent suffix
    pub fn user_agent_extra(mut self, suffix: impl Into<String>) -> Self {
        self.user_agent_suffix = Some(suffix.into());
        self
    }

    /// Configure telemetry/metrics
    #[cfg(feature = "metrics")]
    pub fn with_telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry_config = config;
        self
    }

    /// Enable telemetry with default settings
    #[cfg(feature = "metrics")]
    pub fn enable_telemetry(mut self) -> Self {
        self.telemetry_config.enabled = true;
        self
    }

    /// Allow a plain HTTP base URL (local emulators and tests)
    pub fn allow_insecure_http(mut self) -> Self {
        self.allow_insecure_http = true;
        self
    }

    /// Build the client with the configured options
    pub fn build(self) -> Result<crate::Client> {
        let url = self.base_url.trim_end_matches('/');

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Configuration(
                "Base URL must start with http:// or https://".to_string(),
            ));
        }

        if url.starts_with("http://") && !self.allow_insecure_http {
            return Err(Error::Configuration(
                "HTTP URLs are not allowed by default. Use .allow_insecure_http() to enable (dangerous!)"
                    .to_string(),
            ));
        }

        let credentials = self.credentials.ok_or_else(|| {
            Error::Configuration(
                "Credentials are required. Use .credentials() or .token_credential()".to_string(),
            )
        })?;

        let config = ClientConfig {
            base_url: url.to_string(),
            credentials,
            timeout: Duration::from_millis(self.timeout_ms),
            user_agent_suffix: self.user_agent_suffix,
            telemetry_config: self.telemetry_config,
            allow_insecure_http: self.allow_insecure_http,
        };

        crate::client::Client::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ApplicationTokenCredential;

    #[test]
    fn test_builder_requires_credentials() {
        let result = ClientBuilder::new("https://management.azure.com").build();
        assert!(matches!(result.unwrap_err(), Error::Configuration(_)));
    }

    #[test]
    fn test_builder_validates_url() {
        let result = ClientBuilder::new("not-a-url")
            .credentials(ServiceCredentials::bearer("token"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_http_unless_allowed() {
        let result = ClientBuilder::new("http://localhost:8080")
            .credentials(ServiceCredentials::bearer("token"))
            .build();
        assert!(matches!(result.unwrap_err(), Error::Configuration(_)));

        let result = ClientBuilder::new("http://localhost:8080")
            .credentials(ServiceCredentials::bearer("token"))
            .allow_insecure_http()
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_for_environment_uses_resource_manager() {
        let credential =
            ApplicationTokenCredential::with_secret("c1", "t1", "s1", Environment::azure_china())
                .unwrap();
        let client = ClientBuilder::for_environment(&Environment::azure_china())
            .unwrap()
            .token_credential(credential)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "https://management.chinacloudapi.cn");
        assert!(client.token_stats().is_some());

        let bare = Environment::custom(Vec::new());
        assert!(ClientBuilder::for_environment(&bare).is_err());
    }
}
