//! Tenant (subdomain-routed) API policy.
//!
//! Every call targets `https://{subdomain}.{provider_domain}`. The
//! access-service handshake is a server-driven state machine: each step
//! returns a context JWT that authorizes only the next step, so all
//! authenticated calls take the JWT explicitly. Tenant calls are not
//! retried; a failed step fails the whole flow.

use super::wire::{
    AccessServiceMfa, AccessServiceResponse, AvailableFactor, DomainAvailableResponse,
    FactorTokenResponse, InitialAuthorizationRequest, RegistrationNoticeRequest,
    RegistrationNoticeVariables, UploadPasswordRequest, UploadPasswordVariables,
    UploadUsernameRequest, UploadUsernameVariables,
};
use super::{Gateway, NetworkOutcome};
use crate::config::MfaConfig;

const DOMAIN_AVAILABLE_ENDPOINT: &str = "/api/v1/domain_available";
const ACCESS_AUTH_ENDPOINT: &str = "/access/auth";
const MFA_AUTH_ENDPOINT: &str = "/mfa/v1/auth";
const MFA_FACTORS_ENDPOINT: &str = "/mfa/v1/factors";
const MFA_REGISTRATIONS_ENDPOINT: &str = "/mfa/v1/registrations";

/// Client for one tenant's subdomain-routed API.
#[derive(Clone)]
pub struct TenantApi {
    gateway: Gateway,
    base_url: String,
}

impl TenantApi {
    pub(crate) fn new(gateway: Gateway, config: &MfaConfig, subdomain: &str) -> Self {
        let base_url = config.tenant_api_override.clone().unwrap_or_else(|| {
            format!("https://{subdomain}.{}", config.provider_domain)
        });
        Self { gateway, base_url }
    }

    /// Checks whether the tenant subdomain is registered. An available
    /// subdomain means no such tenant exists.
    pub async fn domain_available(&self) -> NetworkOutcome<DomainAvailableResponse> {
        let url = format!("{}{DOMAIN_AVAILABLE_ENDPOINT}", self.base_url);
        self.gateway.execute(self.gateway.client().get(url)).await
    }

    /// Opens an access-service flow and returns its first context JWT.
    pub async fn initial_authorization(&self) -> NetworkOutcome<AccessServiceResponse> {
        let url = format!("{}{ACCESS_AUTH_ENDPOINT}", self.base_url);
        let request = self
            .gateway
            .client()
            .post(url)
            .json(&InitialAuthorizationRequest {
                payload: String::new(),
            });
        self.gateway.execute(request).await
    }

    /// Advances the flow past the username step.
    pub async fn upload_username(
        &self,
        jwt: &str,
        login: &str,
    ) -> NetworkOutcome<AccessServiceResponse> {
        let url = format!("{}{ACCESS_AUTH_ENDPOINT}?state=username", self.base_url);
        let request = self
            .gateway
            .client()
            .put(url)
            .bearer_auth(jwt)
            .json(&UploadUsernameRequest {
                payload: UploadUsernameVariables {
                    login: login.to_string(),
                    remember_username: false,
                },
            });
        self.gateway.execute(request).await
    }

    /// Advances the flow past the password step.
    pub async fn upload_password(
        &self,
        jwt: &str,
        password: &str,
    ) -> NetworkOutcome<AccessServiceResponse> {
        let url = format!("{}{ACCESS_AUTH_ENDPOINT}?state=password", self.base_url);
        let request = self
            .gateway
            .client()
            .put(url)
            .bearer_auth(jwt)
            .json(&UploadPasswordRequest {
                payload: UploadPasswordVariables {
                    password: password.to_string(),
                    keep_me_signed_in: false,
                },
            });
        self.gateway.execute(request).await
    }

    /// Acknowledges the registration notice without skipping registration.
    pub async fn registration_notice(
        &self,
        jwt: &str,
    ) -> NetworkOutcome<AccessServiceResponse> {
        let url = format!(
            "{}{ACCESS_AUTH_ENDPOINT}?state=mfa_registration_notice",
            self.base_url
        );
        let request = self
            .gateway
            .client()
            .put(url)
            .bearer_auth(jwt)
            .json(&RegistrationNoticeRequest {
                payload: RegistrationNoticeVariables {
                    registration_skipped: false,
                },
            });
        self.gateway.execute(request).await
    }

    /// Exchanges the flow JWT for an MFA-scoped JWT.
    pub async fn mfa_authorization(&self, jwt: &str) -> NetworkOutcome<AccessServiceMfa> {
        let url = format!("{}{MFA_AUTH_ENDPOINT}", self.base_url);
        let request = self.gateway.client().get(url).bearer_auth(jwt);
        self.gateway.execute(request).await
    }

    /// Lists the factors the tenant offers for registration.
    pub async fn available_factors(
        &self,
        mfa_jwt: &str,
    ) -> NetworkOutcome<Vec<AvailableFactor>> {
        let url = format!("{}{MFA_FACTORS_ENDPOINT}", self.base_url);
        let request = self.gateway.client().get(url).bearer_auth(mfa_jwt);
        self.gateway.execute(request).await
    }

    /// Requests a one-time registration token for `factor_id`.
    pub async fn factor_token(
        &self,
        mfa_jwt: &str,
        factor_id: i64,
    ) -> NetworkOutcome<FactorTokenResponse> {
        let url = format!(
            "{}{MFA_REGISTRATIONS_ENDPOINT}?factor_id={factor_id}",
            self.base_url
        );
        let request = self.gateway.client().post(url).bearer_auth(mfa_jwt);
        self.gateway.execute(request).await
    }
}
