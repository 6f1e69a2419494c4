//! Telemetry and observability utilities

use std::sync::Arc;

#[cfg(feature = "metrics")]
use opentelemetry::{
    metrics::{Counter, Histogram},
    KeyValue,
};

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether telemetry is enabled
    pub enabled: bool,
    /// Service name for metrics
    pub service_name: String,
    /// Service version for metrics
    pub service_version: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "azure-token-auth".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Token pipeline metrics collector
#[derive(Clone)]
pub struct Metrics {
    #[cfg(feature = "metrics")]
    pub(crate) token_requests: Counter<u64>,

    #[cfg(feature = "metrics")]
    pub(crate) acquisitions: Counter<u64>,

    #[cfg(feature = "metrics")]
    pub(crate) acquisition_failures: Counter<u64>,

    #[cfg(feature = "metrics")]
    pub(crate) acquisition_duration: Histogram<f64>,

    #[cfg(feature = "metrics")]
    pub(crate) reauthentications: Counter<u64>,
}

impl Metrics {
    /// Create new metrics instance
    #[cfg(feature = "metrics")]
    pub fn new(config: &TelemetryConfig) -> Self {
        use opentelemetry::global;

        let meter = global::meter(config.service_name.clone());

        let token_requests = meter
            .u64_counter("azure_token_auth.token_requests_total")
            .with_description("Token lookups, labelled by cache outcome")
            .init();

        let acquisitions = meter
            .u64_counter("azure_token_auth.acquisitions_total")
            .with_description("Tokens obtained from the identity provider")
            .init();

        let acquisition_failures = meter
            .u64_counter("azure_token_auth.acquisition_failures_total")
            .with_description("Failed token acquisitions")
            .init();

        let acquisition_duration = meter
            .f64_histogram("azure_token_auth.acquisition_duration_seconds")
            .with_description("Token acquisition duration in seconds")
            .init();

        let reauthentications = meter
            .u64_counter("azure_token_auth.reauthentications_total")
            .with_description("Requests re-driven after a 401 challenge")
            .init();

        Self {
            token_requests,
            acquisitions,
            acquisition_failures,
            acquisition_duration,
            reauthentications,
        }
    }

    /// Create a no-op metrics instance when feature is disabled
    #[cfg(not(feature = "metrics"))]
    pub fn new(_config: &TelemetryConfig) -> Self {
        Self {}
    }

    /// Record a token lookup
    #[cfg(feature = "metrics")]
    pub fn record_lookup(&self, resource: &str, hit: bool) {
        self.token_requests.add(
            1,
            &[
                KeyValue::new("resource", resource.to_string()),
                KeyValue::new("outcome", if hit { "hit" } else { "miss" }),
            ],
        );
    }

    /// Record a token lookup (no-op)
    #[cfg(not(feature = "metrics"))]
    pub fn record_lookup(&self, _resource: &str, _hit: bool) {}

    /// Record the outcome of a token acquisition
    #[cfg(feature = "metrics")]
    pub fn record_acquisition(&self, resource: &str, success: bool, duration_secs: f64) {
        let labels = &[KeyValue::new("resource", resource.to_string())];
        if success {
            self.acquisitions.add(1, labels);
        } else {
            self.acquisition_failures.add(1, labels);
        }
        self.acquisition_duration.record(duration_secs, labels);
    }

    /// Record the outcome of a token acquisition (no-op)
    #[cfg(not(feature = "metrics"))]
    pub fn record_acquisition(&self, _resource: &str, _success: bool, _duration_secs: f64) {}

    /// Record a request re-driven after a 401
    #[cfg(feature = "metrics")]
    pub fn record_reauthentication(&self, host: &str) {
        self.reauthentications
            .add(1, &[KeyValue::new("host", host.to_string())]);
    }

    /// Record a request re-driven after a 401 (no-op)
    #[cfg(not(feature = "metrics"))]
    pub fn record_reauthentication(&self, _host: &str) {}
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("enabled", &cfg!(feature = "metrics"))
            .finish()
    }
}

/// Global telemetry instance holder
static TELEMETRY: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Metrics for `config`: the shared global instance when enabled, a private one otherwise
pub(crate) fn metrics_for(config: &TelemetryConfig) -> Arc<Metrics> {
    if config.enabled {
        TELEMETRY
            .get_or_init(|| Arc::new(Metrics::new(config)))
            .clone()
    } else {
        Arc::new(Metrics::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.service_name, "azure-token-auth");
    }

    #[test]
    fn test_enabled_metrics_are_shared() {
        let config = TelemetryConfig {
            enabled: true,
            ..Default::default()
        };

        let first = metrics_for(&config);
        let second = metrics_for(&config);
        assert!(Arc::ptr_eq(&first, &second));

        let private = metrics_for(&TelemetryConfig::default());
        assert!(!Arc::ptr_eq(&first, &private));
        private.record_lookup("management.azure.com", true);
        private.record_acquisition("management.azure.com", false, 0.25);
    }
}
