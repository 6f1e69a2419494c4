//! Authentication profiles
//!
//! A profile is a small file describing a service principal: its client id, tenant,
//! secret or certificate, default subscription, and the cloud endpoints to use. Two
//! layouts are accepted, detected by the first non-blank character:
//!
//! - JSON (`{`), with camel-case keys and endpoint identifiers at the top level
//! - properties (anything else), with `key=value` lines
//!
//! ```text
//! subscription=00000000-0000-0000-0000-000000000000
//! tenant=contoso.onmicrosoft.com
//! client=11111111-1111-1111-1111-111111111111
//! key=client-secret
//! managementURI=https\://management.core.windows.net/
//! ```
//!
//! Endpoints missing from a profile fall back to the public cloud.

use crate::{
    credentials::{ApplicationTokenCredential, ClientAuthentication},
    environment::{Endpoint, Environment},
    errors::{Error, Result},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

/// Property keys and the endpoints they configure
const ENDPOINT_PROPERTIES: [(&str, Endpoint); 5] = [
    ("managementURI", Endpoint::Management),
    ("baseURL", Endpoint::ResourceManager),
    ("authURL", Endpoint::ActiveDirectory),
    ("graphURL", Endpoint::Graph),
    ("vaultSuffix", Endpoint::KeyVault),
];

/// JSON layout; any key not listed here is an endpoint
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_certificate_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subscription_id: Option<String>,
    #[serde(flatten)]
    endpoints: BTreeMap<String, String>,
}

/// Service principal profile loaded from, or written to, a file
#[derive(Clone)]
pub struct AuthProfile {
    client_id: Option<String>,
    tenant_id: Option<String>,
    client_secret: Option<SecretString>,
    certificate_path: Option<String>,
    certificate: Option<Zeroizing<Vec<u8>>>,
    certificate_password: Option<SecretString>,
    subscription_id: Option<String>,
    environment: Environment,
}

impl AuthProfile {
    fn empty() -> Self {
        Self {
            client_id: None,
            tenant_id: None,
            client_secret: None,
            certificate_path: None,
            certificate: None,
            certificate_password: None,
            subscription_id: None,
            environment: Environment::azure(),
        }
    }

    /// Read and parse the profile at `path`
    ///
    /// A relative certificate path is tried as given, then against the profile's
    /// directory.
    pub fn parse(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ProfileParse(format!("Failed to read profile {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "loading authentication profile");
        Self::parse_str(&content, path.parent())
    }

    /// Parse profile `content`, resolving certificate paths against `base_dir`
    pub fn parse_str(content: &str, base_dir: Option<&Path>) -> Result<Self> {
        let content = content.trim();
        let mut profile = if content.starts_with('{') {
            Self::from_json(content)?
        } else {
            Self::from_properties(content)
        };

        if let Some(certificate_path) = profile.certificate_path.clone() {
            let bytes = read_certificate(&certificate_path, base_dir)?;
            profile.certificate = Some(bytes);
        }

        Ok(profile)
    }

    fn from_json(content: &str) -> Result<Self> {
        let document: ProfileDocument = serde_json::from_str(content)
            .map_err(|e| Error::ProfileParse(format!("Invalid JSON profile: {}", e)))?;

        Ok(Self {
            client_id: document.client_id,
            tenant_id: document.tenant_id,
            client_secret: document.client_secret.map(SecretString::new),
            certificate_path: document.client_certificate,
            certificate: None,
            certificate_password: document.client_certificate_password.map(SecretString::new),
            subscription_id: document.subscription_id,
            environment: Environment::azure().with_endpoints(document.endpoints),
        })
    }

    fn from_properties(content: &str) -> Self {
        let mut properties = parse_properties(content);
        let mut take = |key: &str| properties.remove(key);

        let mut profile = Self::empty();
        profile.subscription_id = take("subscription");
        profile.tenant_id = take("tenant");
        profile.client_id = take("client");
        profile.client_secret = take("key").map(SecretString::new);
        profile.certificate_path = take("certificate");
        profile.certificate_password = take("certificatePassword").map(SecretString::new);

        let overrides: Vec<(String, String)> = ENDPOINT_PROPERTIES
            .iter()
            .filter_map(|(key, endpoint)| {
                take(*key).map(|url| (endpoint.identifier().to_string(), url))
            })
            .collect();
        profile.environment = Environment::azure().with_endpoints(overrides);
        profile
    }

    /// Profile describing an existing application credential
    ///
    /// A certificate credential carries no file path, so only its password is kept.
    pub fn from_credential(credential: &ApplicationTokenCredential) -> Self {
        use crate::credentials::TokenCredential;

        let mut profile = Self::empty();
        profile.client_id = Some(credential.client_id().to_string());
        profile.tenant_id = Some(credential.domain().to_string());
        profile.subscription_id = credential.default_subscription().map(str::to_string);
        profile.environment = credential.environment().clone();

        match credential.client_authentication() {
            ClientAuthentication::Secret(secret) => {
                profile.client_secret = Some(secret.clone());
            }
            ClientAuthentication::Certificate(certificate) => {
                profile.certificate_password = certificate.password().cloned();
            }
        }
        profile
    }

    /// Build the application credential this profile describes
    ///
    /// A client secret takes precedence over a certificate.
    pub fn into_credential(self) -> Result<ApplicationTokenCredential> {
        let client_id = self
            .client_id
            .ok_or_else(|| Error::Configuration("Profile has no client id".to_string()))?;
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| Error::Configuration("Profile has no tenant".to_string()))?;

        let credential = if let Some(secret) = self.client_secret {
            ApplicationTokenCredential::new(
                client_id,
                tenant_id,
                ClientAuthentication::Secret(secret),
                self.environment,
            )?
        } else if let Some(certificate) = &self.certificate {
            ApplicationTokenCredential::with_certificate(
                client_id,
                tenant_id,
                certificate,
                self.certificate_password
                    .map(|password| password.expose_secret().clone()),
                self.environment,
            )?
        } else {
            return Err(Error::Configuration(
                "Please specify either a client key or a client certificate".to_string(),
            ));
        };

        Ok(match self.subscription_id {
            Some(subscription) => credential.with_default_subscription(subscription),
            None => credential,
        })
    }

    /// Pretty-printed JSON profile with endpoints at the top level
    pub fn to_json(&self) -> Result<String> {
        let document = ProfileDocument {
            client_id: self.client_id.clone(),
            tenant_id: self.tenant_id.clone(),
            client_secret: self
                .client_secret
                .as_ref()
                .map(|secret| secret.expose_secret().clone()),
            client_certificate: self.certificate_path.clone(),
            client_certificate_password: self
                .certificate_password
                .as_ref()
                .map(|password| password.expose_secret().clone()),
            subscription_id: self.subscription_id.clone(),
            endpoints: self.environment.endpoints().clone(),
        };
        serde_json::to_string_pretty(&document).map_err(Error::from)
    }

    /// Application (client) id
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Tenant id or domain
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Default subscription
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    /// Client secret
    pub fn client_secret(&self) -> Option<&SecretString> {
        self.client_secret.as_ref()
    }

    /// Certificate bytes, once read from disk
    pub fn client_certificate(&self) -> Option<&[u8]> {
        self.certificate.as_ref().map(|bytes| bytes.as_slice())
    }

    /// Certificate path as written in the profile
    pub fn client_certificate_path(&self) -> Option<&str> {
        self.certificate_path.as_deref()
    }

    /// Environment assembled from the profile's endpoints
    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

impl fmt::Debug for AuthProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthProfile")
            .field("client_id", &self.client_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "****"))
            .field("certificate_path", &self.certificate_path)
            .field("subscription_id", &self.subscription_id)
            .field("environment", &self.environment.name())
            .finish()
    }
}

fn read_certificate(path: &str, base_dir: Option<&Path>) -> Result<Zeroizing<Vec<u8>>> {
    let given = PathBuf::from(path);
    let resolved = match base_dir {
        Some(dir) if !given.exists() => dir.join(&given),
        _ => given,
    };

    std::fs::read(&resolved).map(Zeroizing::new).map_err(|e| {
        Error::ProfileParse(format!(
            "Failed to read certificate {}: {}",
            resolved.display(),
            e
        ))
    })
}

/// Parse properties text into a key/value map; later keys win
fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    let mut lines = content.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }

        let mut logical = trimmed.to_string();
        while ends_with_continuation(&logical) {
            let _ = logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let (key, value) = split_entry(&logical);
        let _ = properties.insert(unescape(key), unescape(value));
    }

    properties
}

/// An odd run of trailing backslashes continues the line
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Split a logical line at the first unescaped `=`, `:`, or whitespace
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (index, c) in line.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '=' || c == ':' || c.is_whitespace() {
            key_end = index;
            break;
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start();
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start();
    }
    (key, rest)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => out.push_str(&hex),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TokenCredential;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_properties_syntax() {
        let props = parse_properties(
            "# comment\n\
             ! also a comment\n\
             a=1\n\
             b : 2\n\
             c 3\n\
             url=https\\://example.com/\n\
             long=one\\\n    two\n\
             tab=x\\ty\n\
             empty=\n",
        );
        assert_eq!(props["a"], "1");
        assert_eq!(props["b"], "2");
        assert_eq!(props["c"], "3");
        assert_eq!(props["url"], "https://example.com/");
        assert_eq!(props["long"], "onetwo");
        assert_eq!(props["tab"], "x\ty");
        assert_eq!(props["empty"], "");
        assert_eq!(props.len(), 7);
    }

    #[test]
    fn test_escaped_separator_in_key() {
        let props = parse_properties("a\\=b=c\nsnow\\u2603=yes");
        assert_eq!(props["a=b"], "c");
        assert_eq!(props["snow\u{2603}"], "yes");
    }

    #[test]
    fn test_properties_profile_defaults_to_public_cloud() {
        let profile = AuthProfile::parse_str(
            "subscription=sub1\ntenant=t1\nclient=c1\nkey=s1\nbaseURL=https\\://rm.example/\n",
            None,
        )
        .unwrap();

        assert_eq!(profile.client_id(), Some("c1"));
        assert_eq!(profile.tenant_id(), Some("t1"));
        assert_eq!(profile.subscription_id(), Some("sub1"));
        assert_eq!(profile.client_secret().unwrap().expose_secret(), "s1");

        let env = profile.environment();
        assert_eq!(env.resource_manager_endpoint(), Some("https://rm.example/"));
        assert_eq!(
            env.authentication_endpoint().as_deref(),
            Some("https://login.microsoftonline.com/")
        );
        assert_eq!(env.key_vault_dns_suffix(), Some(".vault.azure.net"));
    }

    #[test]
    fn test_json_profile() {
        let profile = AuthProfile::parse_str(
            r#"{
                "clientId": "c1",
                "tenantId": "t1",
                "clientSecret": "s1",
                "subscriptionId": "sub1",
                "activeDirectoryEndpointUrl": "https://login.chinacloudapi.cn/"
            }"#,
            None,
        )
        .unwrap();

        assert_eq!(profile.client_id(), Some("c1"));
        assert_eq!(
            profile.environment().endpoint(Endpoint::ActiveDirectory),
            Some("https://login.chinacloudapi.cn/")
        );
        assert_eq!(
            profile.environment().graph_endpoint(),
            Some("https://graph.windows.net/")
        );
        assert!(!profile.environment().endpoints().contains_key("clientId"));
    }

    #[test]
    fn test_invalid_json_is_profile_error() {
        let err = AuthProfile::parse_str("{ not json", None).unwrap_err();
        assert!(matches!(err, Error::ProfileParse(_)));
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = AuthProfile::parse_str("client=c1\ntenant=t1\ncertificate=missing.pem", None)
            .unwrap_err();
        assert!(matches!(err, Error::ProfileParse(_)));
    }

    #[test]
    fn test_certificate_resolved_against_profile_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("profile-dir-only-cert.pem"),
            b"not really a pem",
        )
        .unwrap();
        let path = dir.path().join("app.azureauth");
        std::fs::write(
            &path,
            "client=c1\ntenant=t1\ncertificate=profile-dir-only-cert.pem\n",
        )
        .unwrap();

        let profile = AuthProfile::parse(&path).unwrap();
        assert_eq!(profile.client_certificate(), Some(&b"not really a pem"[..]));
        assert_eq!(
            profile.client_certificate_path(),
            Some("profile-dir-only-cert.pem")
        );
        assert!(matches!(
            profile.into_credential().unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[test]
    fn test_into_credential_requires_secret_or_certificate() {
        let profile = AuthProfile::parse_str("client=c1\ntenant=t1", None).unwrap();
        assert!(matches!(
            profile.into_credential().unwrap_err(),
            Error::Configuration(_)
        ));

        let profile = AuthProfile::parse_str("tenant=t1\nkey=s1", None).unwrap();
        assert!(profile.into_credential().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let credential =
            ApplicationTokenCredential::with_secret("c1", "t1", "s1", Environment::azure_china())
                .unwrap()
                .with_default_subscription("sub1");
        let json = AuthProfile::from_credential(&credential).to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["clientId"], "c1");
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["subscriptionId"], "sub1");
        assert_eq!(
            value["resourceManagerEndpointUrl"],
            "https://management.chinacloudapi.cn/"
        );

        let reparsed = AuthProfile::parse_str(&json, None).unwrap();
        assert_eq!(reparsed.environment().endpoints(), credential.environment().endpoints());
        let rebuilt = reparsed.into_credential().unwrap();
        assert_eq!(rebuilt.client_id(), "c1");
        assert_eq!(rebuilt.default_subscription(), Some("sub1"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let profile = AuthProfile::parse_str("client=c1\nkey=hunter2", None).unwrap();
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("hunter2"));
    }
}
