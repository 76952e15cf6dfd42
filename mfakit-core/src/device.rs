//! Device registration and posture checks.
//!
//! Thin orchestration over the provider API: converts gateway outcomes
//! into domain errors with step descriptions, and applies the one special
//! case the registrar owns — a 404 on a settings check means the device
//! was unpaired server-side and substitutes permissive defaults instead
//! of failing.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::MfaError;
use crate::net::wire::{RegistrationResponse, SettingsResponse};
use crate::net::{NetworkOutcome, ProviderApi};
use mfakit_store::Factor;

/// Filesystem locations where a `su` binary or superuser package lands on
/// rooted devices.
const SU_PATHS: &[&str] = &[
    "/system/app/Superuser.apk",
    "/sbin/su",
    "/system/bin/su",
    "/system/xbin/su",
    "/data/local/xbin/su",
    "/data/local/bin/su",
    "/system/sd/xbin/su",
    "/system/bin/failsafe/su",
    "/data/local/su",
    "/su/bin/su",
];

/// Registers devices against the provider API and checks their remote
/// settings.
#[derive(Clone)]
pub(crate) struct DeviceRegistrar {
    provider: ProviderApi,
}

impl DeviceRegistrar {
    pub(crate) const fn new(provider: ProviderApi) -> Self {
        Self { provider }
    }

    /// Registers a device for a provider-native code.
    ///
    /// # Errors
    /// Protocol and transport failures after the gateway's retries are
    /// exhausted.
    pub async fn register_device(
        &self,
        secret: &str,
        issuer: &str,
        shard: &str,
    ) -> Result<RegistrationResponse, MfaError> {
        self.provider
            .register_device(secret, issuer, shard)
            .await
            .into_result("HTTP exception occurred when registering factor")
    }

    /// Fetches the remote settings for a registered factor.
    ///
    /// A 404 from the settings endpoint means the server unpaired the
    /// device; that case resolves to permissive defaults rather than an
    /// error so callers can reconcile local state.
    ///
    /// # Errors
    /// [`MfaError::InvalidInput`] when the factor has no credential id or
    /// shard; protocol and transport failures otherwise.
    pub async fn check_device_settings(
        &self,
        factor: &Factor,
    ) -> Result<SettingsResponse, MfaError> {
        let credential_id = factor
            .credential_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MfaError::invalid_input("factor has no credential id"))?;
        let shard = factor
            .shard
            .as_deref()
            .filter(|shard| !shard.is_empty())
            .ok_or_else(|| MfaError::invalid_input("factor has no shard"))?;

        let outcome = self.provider.device_settings(credential_id, shard).await;
        if let NetworkOutcome::Protocol { status: 404, .. } = outcome {
            debug!(factor_id = factor.id, "settings check returned 404, device unpaired");
            return Ok(SettingsResponse::unpaired_defaults());
        }
        outcome.into_result("HTTP exception occurred when retrieving device settings")
    }
}

/// Best-effort check for a rooted host. Advisory only; any internal
/// failure reports not-rooted.
#[must_use]
pub fn is_device_rooted() -> bool {
    if SU_PATHS.iter().any(|path| Path::new(path).exists()) {
        return true;
    }

    // A `su` on the PATH counts even when none of the known locations hit.
    Command::new("which")
        .arg("su")
        .output()
        .map(|output| output.status.success() && !output.stdout.is_empty())
        .unwrap_or(false)
}

/// Best-effort check that the host session is protected by a lock or
/// password. Advisory only; reports not-secure when it cannot tell.
#[must_use]
pub fn is_device_secure() -> bool {
    // Headless and container hosts have no keyguard equivalent to query.
    // Treat an active login session under a non-root user as the closest
    // analogue and fail closed otherwise.
    std::env::var_os("USER").is_some_and(|user| user != "root")
}
