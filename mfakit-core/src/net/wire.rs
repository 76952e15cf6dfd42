//! Wire payloads for the provider and tenant APIs.

use serde::{Deserialize, Serialize};

// Provider API responses.

/// Response to a device registration call.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationResponse {
    /// Remote credential identifier for the new device.
    pub credential_id: String,
    /// TOTP seed issued for the device.
    pub seed: String,
    /// Username the device was registered for.
    #[serde(default)]
    pub username: Option<String>,
    /// Tenant subdomain the device belongs to.
    #[serde(default)]
    pub subdomain: Option<String>,
}

/// Response to a device settings check.
#[derive(Debug, Clone, Deserialize)]
pub struct SettingsResponse {
    /// Whether the settings lookup succeeded.
    pub success: bool,
    /// True when the server no longer recognizes the device pairing.
    #[serde(default)]
    pub unpaired: bool,
    /// Policy settings for the device.
    pub settings: DeviceSettings,
}

/// Remote policy settings for a registered device.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSettings {
    /// Whether rooted or jailbroken devices are rejected.
    #[serde(default)]
    pub disallow_jailbroken_or_rooted: bool,
    /// Whether a device lock screen is required.
    #[serde(default)]
    pub force_lock_protection: bool,
    /// Whether biometric verification is required.
    #[serde(default)]
    pub biometric_verification: bool,
}

impl SettingsResponse {
    /// The permissive response substituted when a settings check returns
    /// 404, meaning the device was unpaired server-side.
    #[must_use]
    pub fn unpaired_defaults() -> Self {
        Self {
            success: false,
            unpaired: false,
            settings: DeviceSettings::default(),
        }
    }
}

// Tenant API envelopes.

/// Envelope returned by each step of the access-service handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessServiceResponse {
    /// Context JWT authorizing the next step.
    pub context: AccessServiceContext,
    /// MFA block, present once the password step succeeded.
    #[serde(default)]
    pub mfa: Option<AccessServiceMfa>,
}

/// Context block carrying the JWT for the next step.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessServiceContext {
    /// Bearer token authorizing only the next step.
    pub jwt: String,
}

/// MFA block carrying the MFA-scoped JWT.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessServiceMfa {
    /// MFA-scoped bearer token.
    pub jwt: String,
}

/// Response to the tenant availability check.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainAvailableResponse {
    /// One entry per queried domain.
    pub data: Vec<DomainAvailability>,
}

/// Availability of a single tenant subdomain.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainAvailability {
    /// True when the subdomain is unclaimed. A registered tenant reports
    /// false here.
    pub subdomain_available: bool,
}

/// One factor the tenant offers for registration.
#[derive(Debug, Clone, Deserialize)]
pub struct AvailableFactor {
    /// Tenant-scoped factor id.
    pub id: i64,
    /// Numeric factor type.
    pub type_id: i64,
    /// Display name.
    pub name: String,
}

/// Response to a factor-token request.
#[derive(Debug, Clone, Deserialize)]
pub struct FactorTokenResponse {
    /// One-time registration token, used as a provider-native code.
    #[serde(default)]
    pub verification_token: Option<String>,
}

// Tenant API request payloads. Each step wraps its variables in a
// `payload` object.

#[derive(Debug, Serialize)]
pub(crate) struct InitialAuthorizationRequest {
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadUsernameRequest {
    pub payload: UploadUsernameVariables,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadUsernameVariables {
    pub login: String,
    pub remember_username: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadPasswordRequest {
    pub payload: UploadPasswordVariables,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadPasswordVariables {
    pub password: String,
    pub keep_me_signed_in: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegistrationNoticeRequest {
    pub payload: RegistrationNoticeVariables,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegistrationNoticeVariables {
    pub registration_skipped: bool,
}

/// Error body shape the APIs answer failures with.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: String,
}
