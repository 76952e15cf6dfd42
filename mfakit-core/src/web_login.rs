//! Web-login factor registration.
//!
//! Drives the tenant's access-service handshake end to end: verify the
//! subdomain, open a flow, upload username and password, acknowledge the
//! registration notice, exchange for an MFA-scoped token, pick the
//! provider's native push factor, and request its one-time registration
//! token. Each step's JWT authorizes only the next step, so the chain is
//! scoped to a single call and nothing is cached across calls.

use tracing::debug;

use crate::config::MfaConfig;
use crate::error::MfaError;
use crate::net::{Gateway, TenantApi};

/// Numeric factor type of the provider's native push factor.
const PROTECT_FACTOR_TYPE_ID: i64 = 8;
/// Display name the native factor must carry.
const PROTECT_FACTOR_NAME: &str = "OneLogin Protect";

/// Runs the tenant web-login handshake to obtain a registration token.
#[derive(Clone)]
pub(crate) struct WebLoginFlow {
    gateway: Gateway,
    config: MfaConfig,
}

impl WebLoginFlow {
    pub(crate) const fn new(gateway: Gateway, config: MfaConfig) -> Self {
        Self { gateway, config }
    }

    /// Executes the full handshake and returns the one-time registration
    /// token for the native factor.
    ///
    /// # Errors
    /// [`MfaError::InvalidInput`] for blank fields, an unregistered
    /// subdomain, a tenant without the native factor, or a blank token;
    /// protocol and transport errors from any step otherwise, each
    /// carrying its step description.
    pub(crate) async fn register(
        &self,
        subdomain: &str,
        username: &str,
        password: &str,
    ) -> Result<String, MfaError> {
        if subdomain.trim().is_empty() || username.trim().is_empty() || password.trim().is_empty()
        {
            return Err(MfaError::invalid_input("empty web login fields"));
        }

        let tenant = TenantApi::new(self.gateway.clone(), &self.config, subdomain);

        // An available subdomain means no such tenant exists.
        let availability = tenant
            .domain_available()
            .await
            .into_result("HTTP exception verifying subdomain")?;
        if availability
            .data
            .first()
            .is_none_or(|entry| entry.subdomain_available)
        {
            return Err(MfaError::invalid_input("invalid subdomain"));
        }

        let initial = tenant
            .initial_authorization()
            .await
            .into_result("HTTP exception retrieving initial authorization")?;

        let after_username = tenant
            .upload_username(&initial.context.jwt, username)
            .await
            .into_result("HTTP exception uploading username")?;

        let after_password = tenant
            .upload_password(&after_username.context.jwt, password)
            .await
            .into_result("HTTP exception uploading password")?;

        let notice = tenant
            .registration_notice(&after_password.context.jwt)
            .await
            .into_result("HTTP exception retrieving MFA registration notice")?;
        let mfa_flow_jwt = notice.mfa.map(|mfa| mfa.jwt).unwrap_or_default();

        let mfa = tenant
            .mfa_authorization(&mfa_flow_jwt)
            .await
            .into_result("HTTP exception retrieving MFA authorization")?;

        let factors = tenant
            .available_factors(&mfa.jwt)
            .await
            .into_result("HTTP exception retrieving available factors")?;
        debug!(count = factors.len(), "tenant offered factors");

        let factor_id = factors
            .iter()
            .find(|factor| {
                factor.type_id == PROTECT_FACTOR_TYPE_ID
                    && factor
                        .name
                        .to_lowercase()
                        .contains(&PROTECT_FACTOR_NAME.to_lowercase())
            })
            .map(|factor| factor.id)
            .ok_or_else(|| {
                MfaError::invalid_input("OneLogin Protect must be an available factor")
            })?;

        let token_response = tenant
            .factor_token(&mfa.jwt, factor_id)
            .await
            .into_result("HTTP exception retrieving factor token")?;

        match token_response.verification_token {
            Some(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(MfaError::invalid_input("empty factor token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};

    fn flow(server_url: &str) -> WebLoginFlow {
        let config = MfaConfig {
            tenant_api_override: Some(server_url.to_string()),
            ..MfaConfig::default()
        };
        WebLoginFlow::new(Gateway::new(), config)
    }

    async fn mount_happy_path(server: &mut ServerGuard) {
        server
            .mock("GET", "/api/v1/domain_available")
            .with_body(r#"{"data":[{"subdomain_available":false}]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/access/auth")
            .with_body(r#"{"context":{"jwt":"jwt-1"}}"#)
            .create_async()
            .await;
        server
            .mock("PUT", "/access/auth")
            .match_query(Matcher::UrlEncoded("state".into(), "username".into()))
            .match_header("authorization", "Bearer jwt-1")
            .with_body(r#"{"context":{"jwt":"jwt-2"}}"#)
            .create_async()
            .await;
        server
            .mock("PUT", "/access/auth")
            .match_query(Matcher::UrlEncoded("state".into(), "password".into()))
            .match_header("authorization", "Bearer jwt-2")
            .with_body(r#"{"context":{"jwt":"jwt-3"},"password_valid":true}"#)
            .create_async()
            .await;
        server
            .mock("PUT", "/access/auth")
            .match_query(Matcher::UrlEncoded(
                "state".into(),
                "mfa_registration_notice".into(),
            ))
            .match_header("authorization", "Bearer jwt-3")
            .with_body(r#"{"context":{"jwt":"jwt-4"},"mfa":{"jwt":"mfa-flow-jwt"}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/mfa/v1/auth")
            .match_header("authorization", "Bearer mfa-flow-jwt")
            .with_body(r#"{"jwt":"mfa-jwt"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/mfa/v1/factors")
            .match_header("authorization", "Bearer mfa-jwt")
            .with_body(
                r#"[{"id":7,"type_id":2,"name":"Security Questions"},
                    {"id":42,"type_id":8,"name":"ONELOGIN PROTECT"}]"#,
            )
            .create_async()
            .await;
        server
            .mock("POST", "/mfa/v1/registrations")
            .match_query(Matcher::UrlEncoded("factor_id".into(), "42".into()))
            .match_header("authorization", "Bearer mfa-jwt")
            .with_body(r#"{"id":"reg-1","verification_token":"21-abcdefg"}"#)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn happy_path_chains_jwts_and_returns_the_token() {
        let mut server = Server::new_async().await;
        mount_happy_path(&mut server).await;

        let token = flow(&server.url())
            .register("acme", "alice", "hunter2")
            .await
            .unwrap();
        assert_eq!(token, "21-abcdefg");
    }

    #[tokio::test]
    async fn blank_fields_fail_before_any_request() {
        let error = flow("http://unused.invalid")
            .register("acme", "  ", "hunter2")
            .await
            .unwrap_err();
        match error {
            MfaError::InvalidInput { reason } => assert_eq!(reason, "empty web login fields"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn available_subdomain_means_no_tenant() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/domain_available")
            .with_body(r#"{"data":[{"subdomain_available":true}]}"#)
            .create_async()
            .await;

        let error = flow(&server.url())
            .register("ghost", "alice", "hunter2")
            .await
            .unwrap_err();
        match error {
            MfaError::InvalidInput { reason } => assert_eq!(reason, "invalid subdomain"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_native_factor_is_rejected() {
        let mut server = Server::new_async().await;
        mount_happy_path(&mut server).await;
        // Shadow the factor list with one lacking the native factor; the
        // most recent matching mock wins.
        server
            .mock("GET", "/mfa/v1/factors")
            .with_body(r#"[{"id":7,"type_id":2,"name":"Security Questions"}]"#)
            .create_async()
            .await;

        let error = flow(&server.url())
            .register("acme", "alice", "hunter2")
            .await
            .unwrap_err();
        match error {
            MfaError::InvalidInput { reason } => {
                assert_eq!(reason, "OneLogin Protect must be an available factor");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn blank_verification_token_is_rejected() {
        let mut server = Server::new_async().await;
        mount_happy_path(&mut server).await;
        server
            .mock("POST", "/mfa/v1/registrations")
            .match_query(Matcher::UrlEncoded("factor_id".into(), "42".into()))
            .with_body(r#"{"id":"reg-1","verification_token":"  "}"#)
            .create_async()
            .await;

        let error = flow(&server.url())
            .register("acme", "alice", "hunter2")
            .await
            .unwrap_err();
        match error {
            MfaError::InvalidInput { reason } => assert_eq!(reason, "empty factor token"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn step_errors_carry_their_description() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/domain_available")
            .with_body(r#"{"data":[{"subdomain_available":false}]}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/access/auth")
            .with_status(403)
            .with_body(r#"{"error":"flow not allowed"}"#)
            .create_async()
            .await;

        let error = flow(&server.url())
            .register("acme", "alice", "hunter2")
            .await
            .unwrap_err();
        match error {
            MfaError::Protocol { step, status, message } => {
                assert_eq!(step, "HTTP exception retrieving initial authorization");
                assert_eq!(status, 403);
                assert_eq!(message.as_deref(), Some("flow not allowed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
