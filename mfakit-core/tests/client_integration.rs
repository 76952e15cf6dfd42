//! End-to-end exercise of the public client surface: registration against
//! a mock provider, code generation from the stored factor, and a refresh
//! pass, with log output routed through a real subscriber.

use std::sync::Arc;

use mfakit_core::{FactorStore, KeyProvider, MfaClient, MfaConfig, MfaError, TotpGenerator};
use zeroize::Zeroizing;

struct StaticKeyProvider;

impl KeyProvider for StaticKeyProvider {
    fn load_or_create_key(&self) -> Result<Zeroizing<[u8; 32]>, MfaError> {
        Ok(Zeroizing::new([9u8; 32]))
    }
}

fn client(server_url: &str) -> MfaClient {
    let config = MfaConfig {
        provider_api_override: Some(server_url.to_string()),
        tenant_api_override: Some(server_url.to_string()),
        ..MfaConfig::default()
    };
    MfaClient::with_key_provider(
        config,
        Arc::new(FactorStore::open_in_memory().unwrap()),
        Box::new(StaticKeyProvider),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn registers_generates_and_refreshes_through_the_client() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();

    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/internal/v2/otp/devices")
        .with_body(
            r#"{"credential_id":"cred-1","seed":"testSeed",
                "username":"alice","subdomain":"acme"}"#,
        )
        .create_async()
        .await;
    server
        .mock("GET", "/api/internal/v2/otp/settings/cred-1")
        .with_body(
            r#"{"success":true,"unpaired":false,"settings":{
                "disallowJailbrokenOrRooted":false,"forceLockProtection":true,
                "biometricVerification":false}}"#,
        )
        .create_async()
        .await;

    let client = client(&server.url());
    let id = client.register_factor("10-1234567").await.unwrap();

    let factor = client.get_factor_by_id(id).await.unwrap().unwrap();
    assert_eq!(factor.shard.as_deref(), Some("10"));
    assert_eq!(factor.seed, "testSeed");
    assert!(factor.force_lock);

    let generator = TotpGenerator::for_factor(&factor);
    assert_eq!(generator.generate_at(0), "298837");

    // The settings have not moved, so a refresh finds nothing to
    // reconcile and removes nothing.
    let outcome = client.refresh_factors().await.unwrap();
    assert_eq!(outcome.unpaired_count, 0);
    assert_eq!(outcome.updated_count, 0);
    assert_eq!(client.get_factors().await.unwrap().len(), 1);
}
