//! Integration tests for authentication profiles

use azure_token_auth::{AuthProfile, ClientAuthentication, TokenCredential, TokenSupplier};
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;
use serde_json::json;
use std::io::Write;
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, MockServer, ResponseTemplate,
};

#[tokio::test]
async fn test_properties_profile_authenticates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/contoso.onmicrosoft.com/oauth2/token"))
        .and(body_string_contains("client_id=app-1"))
        .and(body_string_contains("client_secret=p%40ss%3Dword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": "from-profile",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# service principal").unwrap();
    writeln!(file, "subscription=sub-1").unwrap();
    writeln!(file, "tenant=contoso.onmicrosoft.com").unwrap();
    writeln!(file, "client=app-1").unwrap();
    writeln!(file, "key=p@ss\\=word").unwrap();
    writeln!(file, "authURL={}/", server.uri()).unwrap();

    let profile = AuthProfile::parse(file.path()).unwrap();
    assert_eq!(profile.client_secret().unwrap().expose_secret(), "p@ss=word");

    let credential = profile.into_credential().unwrap();
    assert_eq!(credential.default_subscription(), Some("sub-1"));
    assert!(matches!(
        credential.client_authentication(),
        ClientAuthentication::Secret(_)
    ));

    let supplier = TokenSupplier::builder()
        .credential(credential)
        .build()
        .unwrap();
    let token = supplier.get_token("management.azure.com").await.unwrap();
    assert_eq!(token.expose_secret(), "from-profile");
}

#[test]
fn test_json_profile_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("my.azureauth");
    std::fs::write(
        &path,
        json!({
            "clientId": "app-1",
            "tenantId": "contoso.onmicrosoft.com",
            "clientSecret": "s1",
            "subscriptionId": "sub-1",
            "managementEndpointUrl": "https://management.core.usgovcloudapi.net/",
            "resourceManagerEndpointUrl": "https://management.usgovcloudapi.net/"
        })
        .to_string(),
    )
    .unwrap();

    let profile = AuthProfile::parse(&path).unwrap();
    assert_eq!(profile.tenant_id(), Some("contoso.onmicrosoft.com"));
    assert_eq!(
        profile.environment().resource_manager_endpoint(),
        Some("https://management.usgovcloudapi.net/")
    );

    let credential = profile.into_credential().unwrap();
    assert_eq!(credential.domain(), "contoso.onmicrosoft.com");

    let written = AuthProfile::from_credential(&credential).to_json().unwrap();
    let reparsed = AuthProfile::parse_str(&written, None).unwrap();
    assert_eq!(reparsed.client_id(), Some("app-1"));
    assert_eq!(reparsed.subscription_id(), Some("sub-1"));
    assert_eq!(
        reparsed.environment().endpoints(),
        credential.environment().endpoints()
    );
}
