//! Factor lifecycle: registration, reads, updates, removal.
//!
//! The manager is the seam between the network layer and the store: it
//! classifies registration codes, drives the provider registration
//! handshake, and owns the encrypt-on-write / decrypt-on-read policy.
//! Seeds never reach the store in the clear when the vault is supported,
//! and a seed that fails to encrypt is an error before anything is
//! written.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::code;
use crate::device::DeviceRegistrar;
use crate::error::MfaError;
use crate::vault::SeedVault;
use crate::web_login::WebLoginFlow;
use mfakit_store::{Factor, FactorStore};

/// HMAC hash names accepted for third-party factors.
const SUPPORTED_ALGORITHMS: &[&str] = &["MD5", "SHA1", "SHA224", "SHA256", "SHA384", "SHA512"];

/// Registers, reads, and removes factors.
pub struct FactorManager {
    store: Arc<FactorStore>,
    vault: Arc<SeedVault>,
    registrar: DeviceRegistrar,
    web_login: WebLoginFlow,
}

impl FactorManager {
    pub(crate) fn new(
        store: Arc<FactorStore>,
        vault: Arc<SeedVault>,
        registrar: DeviceRegistrar,
        web_login: WebLoginFlow,
    ) -> Self {
        Self {
            store,
            vault,
            registrar,
            web_login,
        }
    }

    /// Registers a factor from a scanned or manually entered code and
    /// returns its row id.
    ///
    /// Provider-native codes go through the device registration
    /// handshake; anything else is stored as a third-party TOTP factor.
    ///
    /// # Errors
    /// [`MfaError::InvalidInput`] for a blank or malformed code or an
    /// unsupported algorithm; network errors from the handshake;
    /// [`MfaError::DataIntegrity`] when the seed cannot be encrypted.
    pub async fn register_factor(&self, registration_code: &str) -> Result<i64, MfaError> {
        if registration_code.trim().is_empty() {
            return Err(MfaError::invalid_input("invalid code format"));
        }
        if code::is_provider_code(registration_code) {
            self.register_provider_factor(registration_code).await
        } else {
            self.register_third_party_factor(registration_code)
        }
    }

    /// Registers a provider-native factor by logging into the tenant
    /// first.
    ///
    /// # Errors
    /// Everything [`register_factor`](Self::register_factor) returns,
    /// plus the web-login flow's own failures.
    pub async fn register_factor_by_web_login(
        &self,
        subdomain: &str,
        username: &str,
        password: &str,
    ) -> Result<i64, MfaError> {
        let registration_code = self.web_login.register(subdomain, username, password).await?;
        self.register_factor(&registration_code).await
    }

    async fn register_provider_factor(&self, registration_code: &str) -> Result<i64, MfaError> {
        let secret = code::provider_secret(registration_code).unwrap_or_default();
        let issuer = code::issuer_of(registration_code);
        // The shard prefix is two ASCII digits in well-formed codes;
        // `get` rejects short or non-ASCII secrets without panicking.
        let Some(shard) = secret.get(..2) else {
            return Err(MfaError::invalid_input("missing required fields"));
        };

        let registration = self
            .registrar
            .register_device(&secret, &issuer, shard)
            .await?;

        let mut factor = Factor {
            shard: Some(shard.to_string()),
            subdomain: registration.subdomain.clone(),
            display_name: registration.subdomain,
            issuer: Some(issuer),
            username: registration.username,
            credential_id: Some(registration.credential_id),
            seed: registration.seed,
            ..Factor::default()
        };

        // Registration does not carry the tenant's device policy; a
        // follow-up settings check does.
        let settings = self.registrar.check_device_settings(&factor).await?.settings;
        factor.allow_root = !settings.disallow_jailbroken_or_rooted;
        factor.force_lock = settings.force_lock_protection;
        factor.require_biometrics = settings.biometric_verification;

        let id = self.store.add_factor(&self.encrypt_factor(factor)?)?;
        debug!(id, "registered provider factor");
        Ok(id)
    }

    fn register_third_party_factor(&self, registration_code: &str) -> Result<i64, MfaError> {
        let parsed = code::parse_otpauth(registration_code)?;
        let mut factor = Factor::default();

        // Codes without a secret parameter are stored verbatim.
        let Some(secret) = parsed.secret.filter(|secret| !secret.is_empty()) else {
            factor.seed = registration_code.to_string();
            return Ok(self.store.add_factor(&self.encrypt_factor(factor)?)?);
        };

        let algorithm = parsed
            .algorithm
            .unwrap_or_else(|| "SHA1".to_string())
            .to_uppercase();
        if !SUPPORTED_ALGORITHMS.contains(&algorithm.as_str()) {
            return Err(MfaError::invalid_input("crypto algorithm not supported"));
        }

        factor.issuer = parsed.issuer.or(parsed.label_issuer);
        factor.username = parsed.username;
        factor.seed = secret;
        factor.crypto = format!("Hmac{algorithm}");
        if let Some(digits) = parsed.digits {
            factor.digits = digits;
        }
        if let Some(period) = parsed.period {
            factor.period = period;
        }

        let id = self.store.add_factor(&self.encrypt_factor(factor)?)?;
        debug!(id, "registered third-party factor");
        Ok(id)
    }

    /// All factors, decrypted, in display order. Rows whose seed fails
    /// decryption are dropped from the list.
    ///
    /// # Errors
    /// Store failures only.
    pub fn get_factors(&self) -> Result<Vec<Factor>, MfaError> {
        Ok(self.decrypt_factors(self.store.get_all_factors()?))
    }

    /// Factors for one issuer, case-insensitively, decrypted with
    /// corrupted rows dropped.
    ///
    /// # Errors
    /// Store failures only.
    pub fn get_factors_by_issuer(&self, issuer: &str) -> Result<Vec<Factor>, MfaError> {
        Ok(self.decrypt_factors(self.store.get_factors_by_issuer(issuer)?))
    }

    /// One factor by row id. A row whose seed fails decryption comes
    /// back as the corrupted marker, see [`Factor::is_corrupted`].
    ///
    /// # Errors
    /// Store failures only.
    pub fn get_factor_by_id(&self, id: i64) -> Result<Option<Factor>, MfaError> {
        Ok(self
            .store
            .get_factor_by_id(id)?
            .map(|factor| self.decrypt_factor(factor)))
    }

    /// One factor by remote credential id, with the same corrupted-row
    /// behavior as [`get_factor_by_id`](Self::get_factor_by_id).
    ///
    /// # Errors
    /// Store failures only.
    pub fn get_factor_by_credential_id(
        &self,
        credential_id: &str,
    ) -> Result<Option<Factor>, MfaError> {
        Ok(self
            .store
            .get_factor_by_credential_id(credential_id)?
            .map(|factor| self.decrypt_factor(factor)))
    }

    /// Persists changes to a factor, re-encrypting its seed.
    ///
    /// # Errors
    /// [`MfaError::DataIntegrity`] when the seed cannot be encrypted;
    /// store failures otherwise.
    pub fn update_factor(&self, factor: Factor) -> Result<usize, MfaError> {
        Ok(self.store.update_factor(&self.encrypt_factor(factor)?)?)
    }

    /// Removes one factor, returning the number of deleted rows.
    ///
    /// # Errors
    /// Store failures only.
    pub fn remove_factor(&self, factor: &Factor) -> Result<usize, MfaError> {
        Ok(self.store.delete_factor(factor)?)
    }

    /// Removes every factor, returning the number of deleted rows.
    ///
    /// # Errors
    /// Store failures only.
    pub fn remove_all_factors(&self) -> Result<usize, MfaError> {
        Ok(self.store.delete_all_factors()?)
    }

    /// Removes one factor by row id.
    ///
    /// # Errors
    /// Store failures only.
    pub fn remove_factor_by_id(&self, id: i64) -> Result<usize, MfaError> {
        Ok(self.store.delete_factor_by_id(id)?)
    }

    /// Removes one factor by remote credential id.
    ///
    /// # Errors
    /// Store failures only.
    pub fn remove_factor_by_credential_id(&self, credential_id: &str) -> Result<usize, MfaError> {
        Ok(self.store.delete_factor_by_credential_id(credential_id)?)
    }

    fn encrypt_factor(&self, mut factor: Factor) -> Result<Factor, MfaError> {
        if !self.vault.is_supported() {
            return Ok(factor);
        }
        factor.seed = self.vault.encrypt(&factor.seed).map_err(|e| {
            warn!(error = %e, "seed encryption failed, factor not persisted");
            MfaError::DataIntegrity {
                reason: format!("seed encryption failed: {e}"),
            }
        })?;
        Ok(factor)
    }

    fn decrypt_factor(&self, mut factor: Factor) -> Factor {
        if !self.vault.is_supported() {
            return factor;
        }
        match self.vault.decrypt(&factor.seed) {
            Ok(seed) => {
                factor.seed = seed;
                factor
            }
            Err(e) => {
                warn!(id = factor.id, error = %e, "corrupted factor detected during decryption");
                Factor::corrupted()
            }
        }
    }

    fn decrypt_factors(&self, factors: Vec<Factor>) -> Vec<Factor> {
        if !self.vault.is_supported() {
            return factors;
        }
        factors
            .into_iter()
            .map(|factor| self.decrypt_factor(factor))
            .filter(|factor| !factor.is_corrupted())
            .collect()
    }
}

#[cfg(test)]
impl FactorManager {
    /// Inserts a factor through the encrypt-on-write path without a
    /// registration handshake.
    pub(crate) fn insert_encrypted(&self, factor: Factor) -> Result<i64, MfaError> {
        Ok(self.store.add_factor(&self.encrypt_factor(factor)?)?)
    }
}
