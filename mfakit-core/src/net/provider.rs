//! Provider (shard-routed) API policy.
//!
//! Maps a two-character shard code to a regional hostname, attaches the
//! product user-agent, and retries each call up to five times while the
//! response is non-success.

use super::wire::{RegistrationResponse, SettingsResponse};
use super::{Gateway, NetworkOutcome};
use crate::config::MfaConfig;

const DEVICES_ENDPOINT: &str = "/api/internal/v2/otp/devices";
const SETTINGS_ENDPOINT: &str = "/api/internal/v2/otp/settings";

/// Client for the shard-routed provider API.
#[derive(Clone)]
pub struct ProviderApi {
    gateway: Gateway,
    provider_domain: String,
    base_override: Option<String>,
}

impl ProviderApi {
    pub(crate) fn new(gateway: Gateway, config: &MfaConfig) -> Self {
        Self {
            gateway,
            provider_domain: config.provider_domain.clone(),
            base_override: config.provider_api_override.clone(),
        }
    }

    fn base_url(&self, shard: &str) -> String {
        self.base_override.clone().unwrap_or_else(|| {
            format!(
                "https://{}.{}",
                shard_host(shard),
                self.provider_domain
            )
        })
    }

    /// Registers a device for `secret` against the shard's regional host.
    pub async fn register_device(
        &self,
        secret: &str,
        issuer: &str,
        shard: &str,
    ) -> NetworkOutcome<RegistrationResponse> {
        let url = format!("{}{DEVICES_ENDPOINT}", self.base_url(shard));
        let request = self
            .gateway
            .client()
            .post(url)
            .form(&[("registration_id", secret), ("platform", issuer)]);
        self.gateway.execute_with_retry(request).await
    }

    /// Fetches remote device settings for a registered credential.
    pub async fn device_settings(
        &self,
        credential_id: &str,
        shard: &str,
    ) -> NetworkOutcome<SettingsResponse> {
        let url = format!(
            "{}{SETTINGS_ENDPOINT}/{credential_id}",
            self.base_url(shard)
        );
        let request = self.gateway.client().get(url);
        self.gateway.execute_with_retry(request).await
    }
}

/// Maps a shard code to its regional API host prefix.
fn shard_host(shard: &str) -> String {
    match shard {
        "" | "01" => "api".to_string(),
        "02" => "api-eu".to_string(),
        "03" => "api-de".to_string(),
        other => format!("sso{other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(server_url: &str) -> ProviderApi {
        let config = MfaConfig {
            provider_api_override: Some(server_url.to_string()),
            ..MfaConfig::default()
        };
        ProviderApi::new(Gateway::new(), &config)
    }

    #[test]
    fn shard_codes_map_to_regional_hosts() {
        assert_eq!(shard_host("01"), "api");
        assert_eq!(shard_host("02"), "api-eu");
        assert_eq!(shard_host("03"), "api-de");
        assert_eq!(shard_host("10"), "sso10");
        assert_eq!(shard_host(""), "api");
    }

    #[tokio::test]
    async fn registration_posts_form_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", DEVICES_ENDPOINT)
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("registration_id".into(), "10-1234567".into()),
                mockito::Matcher::UrlEncoded("platform".into(), "OneLogin".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"success":true,"credential_id":"cred-1","message":"ok",
                   "seed":"JBSWY3DP","username":"me","subdomain":"corp"}"#,
            )
            .create_async()
            .await;

        let outcome = api(&server.url())
            .register_device("10-1234567", "OneLogin", "10")
            .await;
        mock.assert_async().await;
        match outcome {
            NetworkOutcome::Success(response) => {
                assert_eq!(response.credential_id, "cred-1");
                assert_eq!(response.seed, "JBSWY3DP");
                assert_eq!(response.username.as_deref(), Some("me"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_success_is_retried_then_classified() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("{SETTINGS_ENDPOINT}/cred-9").as_str())
            .with_status(503)
            .with_body(r#"{"error":"try later"}"#)
            .expect(6) // initial attempt plus five retries
            .create_async()
            .await;

        let outcome = api(&server.url()).device_settings("cred-9", "01").await;
        mock.assert_async().await;
        match outcome {
            NetworkOutcome::Protocol { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message.as_deref(), Some("try later"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn successful_settings_check_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", format!("{SETTINGS_ENDPOINT}/cred-2").as_str())
            .with_status(200)
            .with_body(
                r#"{"success":true,"unpaired":false,"settings":{
                    "disallowJailbrokenOrRooted":true,"forceLockProtection":false,
                    "disableBackup":false,"biometricVerification":true}}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let outcome = api(&server.url()).device_settings("cred-2", "01").await;
        mock.assert_async().await;
        match outcome {
            NetworkOutcome::Success(response) => {
                assert!(response.settings.disallow_jailbroken_or_rooted);
                assert!(response.settings.biometric_verification);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_error_body_gets_generic_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", format!("{SETTINGS_ENDPOINT}/cred-3").as_str())
            .with_status(400)
            .with_body("not json")
            .expect_at_least(1)
            .create_async()
            .await;

        let outcome = api(&server.url()).device_settings("cred-3", "01").await;
        match outcome {
            NetworkOutcome::Protocol { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message.as_deref(), Some("unable to parse error response"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
