//! Cloud environments and their service endpoints

use std::collections::BTreeMap;
use std::fmt;

/// Well-known endpoint identifiers, used as keys of [`Environment::endpoints`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Classic management endpoint
    Management,
    /// Resource manager base URL
    ResourceManager,
    /// Active Directory authentication endpoint
    ActiveDirectory,
    /// Graph API resource
    Graph,
    /// Key Vault DNS suffix
    KeyVault,
}

impl Endpoint {
    /// All well-known endpoints
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Management,
        Endpoint::ResourceManager,
        Endpoint::ActiveDirectory,
        Endpoint::Graph,
        Endpoint::KeyVault,
    ];

    /// Key used for this endpoint in endpoint maps and JSON profiles
    pub fn identifier(self) -> &'static str {
        match self {
            Endpoint::Management => "managementEndpointUrl",
            Endpoint::ResourceManager => "resourceManagerEndpointUrl",
            Endpoint::ActiveDirectory => "activeDirectoryEndpointUrl",
            Endpoint::Graph => "activeDirectoryGraphResourceId",
            Endpoint::KeyVault => "vaultDnsSuffix",
        }
    }
}

/// An immutable, named set of service endpoint URLs
///
/// Custom environments are built with [`Environment::custom`]; the four sovereign
/// clouds have constructors. [`Environment::default`] is the public cloud.
#[derive(Clone, PartialEq, Eq)]
pub struct Environment {
    name: String,
    endpoints: BTreeMap<String, String>,
}

impl Environment {
    fn known(
        name: &str,
        management: &str,
        resource_manager: &str,
        active_directory: &str,
        graph: &str,
        key_vault: &str,
    ) -> Self {
        let endpoints = [
            (Endpoint::Management, management),
            (Endpoint::ResourceManager, resource_manager),
            (Endpoint::ActiveDirectory, active_directory),
            (Endpoint::Graph, graph),
            (Endpoint::KeyVault, key_vault),
        ]
        .into_iter()
        .map(|(endpoint, url)| (endpoint.identifier().to_string(), url.to_string()))
        .collect();

        Self {
            name: name.to_string(),
            endpoints,
        }
    }

    /// Public Azure cloud
    pub fn azure() -> Self {
        Self::known(
            "AzureCloud",
            "https://management.core.windows.net/",
            "https://management.azure.com/",
            "https://login.microsoftonline.com/",
            "https://graph.windows.net/",
            ".vault.azure.net",
        )
    }

    /// Azure China cloud
    pub fn azure_china() -> Self {
        Self::known(
            "AzureChinaCloud",
            "https://management.core.chinacloudapi.cn/",
            "https://management.chinacloudapi.cn/",
            "https://login.chinacloudapi.cn/",
            "https://graph.chinacloudapi.cn/",
            ".vault.azure.cn",
        )
    }

    /// Azure US Government cloud
    pub fn azure_us_government() -> Self {
        Self::known(
            "AzureUSGovernment",
            "https://management.core.usgovcloudapi.net/",
            "https://management.usgovcloudapi.net/",
            "https://login.microsoftonline.us/",
            "https://graph.windows.net/",
            ".vault.usgovcloudapi.net",
        )
    }

    /// Azure Germany cloud
    pub fn azure_germany() -> Self {
        Self::known(
            "AzureGermanCloud",
            "https://management.core.cloudapi.de/",
            "https://management.microsoftazure.de/",
            "https://login.microsoftonline.de/",
            "https://graph.cloudapi.de/",
            ".vault.microsoftazure.de",
        )
    }

    /// Look up a sovereign cloud by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::azure(),
            Self::azure_china(),
            Self::azure_us_government(),
            Self::azure_germany(),
        ]
        .into_iter()
        .find(|env| env.name.eq_ignore_ascii_case(name))
    }

    /// Build a custom environment from an endpoint map
    ///
    /// Endpoints missing from `endpoints` are not filled in; use
    /// [`Environment::with_endpoints`] on a known cloud to merge over defaults.
    pub fn custom(endpoints: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            name: "Custom".to_string(),
            endpoints: endpoints.into_iter().collect(),
        }
    }

    /// Return a copy with `overrides` merged over this environment's endpoints
    pub fn with_endpoints(&self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut endpoints = self.endpoints.clone();
        endpoints.extend(overrides);
        Self {
            name: if endpoints == self.endpoints {
                self.name.clone()
            } else {
                "Custom".to_string()
            },
            endpoints,
        }
    }

    /// Environment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All endpoints keyed by identifier
    pub fn endpoints(&self) -> &BTreeMap<String, String> {
        &self.endpoints
    }

    /// Endpoint URL for a well-known identifier
    pub fn endpoint(&self, endpoint: Endpoint) -> Option<&str> {
        self.endpoints.get(endpoint.identifier()).map(String::as_str)
    }

    /// Active Directory endpoint, always ending with `/`
    pub fn authentication_endpoint(&self) -> Option<String> {
        self.endpoint(Endpoint::ActiveDirectory).map(|url| {
            if url.ends_with('/') {
                url.to_string()
            } else {
                format!("{}/", url)
            }
        })
    }

    /// Classic management endpoint
    pub fn management_endpoint(&self) -> Option<&str> {
        self.endpoint(Endpoint::Management)
    }

    /// Resource manager base URL
    pub fn resource_manager_endpoint(&self) -> Option<&str> {
        self.endpoint(Endpoint::ResourceManager)
    }

    /// Graph resource
    pub fn graph_endpoint(&self) -> Option<&str> {
        self.endpoint(Endpoint::Graph)
    }

    /// Key Vault DNS suffix
    pub fn key_vault_dns_suffix(&self) -> Option<&str> {
        self.endpoint(Endpoint::KeyVault)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::azure()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_public_cloud() {
        let env = Environment::default();
        assert_eq!(env.name(), "AzureCloud");
        assert_eq!(
            env.authentication_endpoint().as_deref(),
            Some("https://login.microsoftonline.com/")
        );
        assert_eq!(env.resource_manager_endpoint(), Some("https://management.azure.com/"));
        assert_eq!(env.key_vault_dns_suffix(), Some(".vault.azure.net"));
        assert_eq!(env.endpoints().len(), Endpoint::ALL.len());
    }

    #[test]
    fn test_from_name() {
        let china = Environment::from_name("azurechinacloud").unwrap();
        assert_eq!(china.graph_endpoint(), Some("https://graph.chinacloudapi.cn/"));
        assert!(Environment::from_name("MarsCloud").is_none());
    }

    #[test]
    fn test_authentication_endpoint_gains_trailing_slash() {
        let env = Environment::custom([(
            Endpoint::ActiveDirectory.identifier().to_string(),
            "http://127.0.0.1:8080".to_string(),
        )]);
        assert_eq!(
            env.authentication_endpoint().as_deref(),
            Some("http://127.0.0.1:8080/")
        );
        assert_eq!(env.management_endpoint(), None);
    }

    #[test]
    fn test_with_endpoints_merges_over_defaults() {
        let env = Environment::azure().with_endpoints([(
            Endpoint::Graph.identifier().to_string(),
            "https://graph.example.com/".to_string(),
        )]);
        assert_eq!(env.name(), "Custom");
        assert_eq!(env.graph_endpoint(), Some("https://graph.example.com/"));
        assert_eq!(env.management_endpoint(), Some("https://management.core.windows.net/"));

        let unchanged = Environment::azure().with_endpoints(Vec::new());
        assert_eq!(unchanged.name(), "AzureCloud");
    }
}
