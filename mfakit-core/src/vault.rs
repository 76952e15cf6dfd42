//! Seed vault: encryption-at-rest for factor seeds.
//!
//! The vault owns a single symmetric key obtained from a pluggable
//! [`KeyProvider`] (the OS keychain by default) and encrypts seeds with
//! AES-256-GCM, serializing `nonce || ciphertext` as base64. Support is
//! probed once: the result is memoized in-process and persisted in the
//! store's flag table so the key probe never runs twice, even across
//! restarts. A failed probe pins the vault unsupported until the flags are
//! cleared.

use std::sync::{Arc, Mutex, PoisonError};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::warn;
use zeroize::Zeroizing;

use mfakit_store::FactorStore;

use crate::error::MfaError;

const FLAG_SUPPORT_CHECKED: &str = "vault_support_checked";
const FLAG_SUPPORTED: &str = "vault_supported";

const NONCE_LEN: usize = 12;

/// Source of the vault's 32-byte key.
///
/// Pluggable so platforms can bind the key to their own secure storage
/// (OS keychain, TPM, a protected key file). Implementations must return
/// the same key for the lifetime of an installation.
pub trait KeyProvider: Send + Sync {
    /// Loads the key, creating and persisting it on first use.
    ///
    /// # Errors
    /// Any failure here marks the vault unsupported.
    fn load_or_create_key(&self) -> Result<Zeroizing<[u8; 32]>, MfaError>;
}

/// Key provider backed by the operating system keychain.
pub struct OsKeychainProvider {
    service: String,
    entry: String,
}

impl OsKeychainProvider {
    /// Creates a provider storing the key under `service`/`entry`.
    #[must_use]
    pub fn new(service: &str, entry: &str) -> Self {
        Self {
            service: service.to_string(),
            entry: entry.to_string(),
        }
    }
}

impl Default for OsKeychainProvider {
    fn default() -> Self {
        Self::new("mfakit", "seed-vault-key")
    }
}

impl KeyProvider for OsKeychainProvider {
    fn load_or_create_key(&self) -> Result<Zeroizing<[u8; 32]>, MfaError> {
        let entry = keyring::Entry::new(&self.service, &self.entry)
            .map_err(|e| MfaError::vault(format!("keychain entry unavailable: {e}")))?;

        match entry.get_password() {
            Ok(encoded) => {
                let decoded = BASE64.decode(encoded.as_bytes()).map_err(|e| {
                    MfaError::vault(format!("stored vault key is invalid: {e}"))
                })?;
                let key: [u8; 32] = decoded.try_into().map_err(|_| {
                    MfaError::vault("stored vault key has wrong length".to_string())
                })?;
                Ok(Zeroizing::new(key))
            }
            Err(keyring::Error::NoEntry) => {
                let key: [u8; 32] = Aes256Gcm::generate_key(&mut OsRng).into();
                // Base64 keeps the secret UTF-8 safe across keychain backends.
                entry.set_password(&BASE64.encode(key)).map_err(|e| {
                    MfaError::vault(format!("failed to store vault key: {e}"))
                })?;
                Ok(Zeroizing::new(key))
            }
            Err(e) => Err(MfaError::vault(format!("keychain unavailable: {e}"))),
        }
    }
}

#[derive(Default)]
struct VaultState {
    checked: bool,
    supported: bool,
    cipher: Option<Aes256Gcm>,
}

/// Hardware-agnostic seed encryption with cached support detection.
pub struct SeedVault {
    provider: Box<dyn KeyProvider>,
    store: Arc<FactorStore>,
    state: Mutex<VaultState>,
}

impl SeedVault {
    /// Creates a vault over the given key provider, persisting its support
    /// flags in `store`.
    #[must_use]
    pub fn new(provider: Box<dyn KeyProvider>, store: Arc<FactorStore>) -> Self {
        Self {
            provider,
            store,
            state: Mutex::new(VaultState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether seed encryption is available on this installation.
    ///
    /// The expensive key probe runs at most once per process and once ever
    /// across restarts; afterwards this returns the cached value.
    pub fn is_supported(&self) -> bool {
        let mut state = self.lock();
        if state.checked {
            return state.supported;
        }

        // Durable verdict from a previous run, if any.
        if let Ok(Some(true)) = self.store.flag_get(FLAG_SUPPORT_CHECKED) {
            let supported = matches!(self.store.flag_get(FLAG_SUPPORTED), Ok(Some(true)));
            state.checked = true;
            state.supported = supported;
            return supported;
        }

        let supported = match self.init_cipher(&mut state) {
            Ok(()) => true,
            Err(e) => {
                warn!("seed vault key probe failed, disabling encryption: {e}");
                false
            }
        };
        state.checked = true;
        state.supported = supported;
        if let Err(e) = self
            .store
            .flag_set(FLAG_SUPPORTED, supported)
            .and_then(|()| self.store.flag_set(FLAG_SUPPORT_CHECKED, true))
        {
            warn!("failed to persist vault support flags: {e}");
        }
        supported
    }

    fn init_cipher(&self, state: &mut VaultState) -> Result<(), MfaError> {
        if state.cipher.is_some() {
            return Ok(());
        }
        let key = self.provider.load_or_create_key()?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|_| MfaError::vault("vault key has wrong length".to_string()))?;
        state.cipher = Some(cipher);
        Ok(())
    }

    /// Encrypts a seed, returning base64(nonce || ciphertext).
    ///
    /// # Errors
    /// Fails when the key cannot be loaded or the cipher rejects the input;
    /// the factor manager translates this into a corrupted-factor outcome.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, MfaError> {
        let mut state = self.lock();
        self.init_cipher(&mut state)?;
        let cipher = state
            .cipher
            .as_ref()
            .ok_or_else(|| MfaError::vault("cipher not initialized".to_string()))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| MfaError::vault("seed encryption failed".to_string()))?;

        let mut packed = nonce.to_vec();
        packed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(packed))
    }

    /// Decrypts a base64(nonce || ciphertext) seed.
    ///
    /// # Errors
    /// Fails on malformed input or an authentication failure; the factor
    /// manager translates this into the corrupted-factor sentinel.
    pub fn decrypt(&self, encoded: &str) -> Result<String, MfaError> {
        let mut state = self.lock();
        self.init_cipher(&mut state)?;
        let cipher = state
            .cipher
            .as_ref()
            .ok_or_else(|| MfaError::vault("cipher not initialized".to_string()))?;

        let packed = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| MfaError::vault(format!("ciphertext is not base64: {e}")))?;
        if packed.len() <= NONCE_LEN {
            return Err(MfaError::vault("ciphertext too short".to_string()));
        }
        let (nonce, ciphertext) = packed.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| MfaError::vault("seed decryption failed".to_string()))?;
        String::from_utf8(plaintext)
            .map_err(|e| MfaError::vault(format!("decrypted seed is not UTF-8: {e}")))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{KeyProvider, MfaError};
    use zeroize::Zeroizing;

    /// In-memory provider for tests; `failing` simulates a probe failure.
    pub struct MemoryKeyProvider {
        pub failing: bool,
    }

    impl KeyProvider for MemoryKeyProvider {
        fn load_or_create_key(&self) -> Result<Zeroizing<[u8; 32]>, MfaError> {
            if self.failing {
                return Err(MfaError::vault("probe failure".to_string()));
            }
            Ok(Zeroizing::new([7u8; 32]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemoryKeyProvider;
    use super::*;

    fn vault(failing: bool) -> SeedVault {
        let store = Arc::new(FactorStore::open_in_memory().unwrap());
        SeedVault::new(Box::new(MemoryKeyProvider { failing }), store)
    }

    #[test]
    fn round_trips_a_seed() {
        let vault = vault(false);
        assert!(vault.is_supported());
        let ciphertext = vault.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(ciphertext, "JBSWY3DPEHPK3PXP");
        assert_eq!(vault.decrypt(&ciphertext).unwrap(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let vault = vault(false);
        let mut ciphertext = vault.encrypt("seed").unwrap();
        let replacement = if ciphertext.starts_with('A') { "B" } else { "A" };
        ciphertext.replace_range(0..1, replacement);
        assert!(vault.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn probe_failure_pins_unsupported() {
        let vault = vault(true);
        assert!(!vault.is_supported());
        // Second call returns the memoized verdict.
        assert!(!vault.is_supported());
    }

    #[test]
    fn support_verdict_survives_restart() {
        let store = Arc::new(FactorStore::open_in_memory().unwrap());
        {
            let vault = SeedVault::new(
                Box::new(MemoryKeyProvider { failing: true }),
                Arc::clone(&store),
            );
            assert!(!vault.is_supported());
        }
        // A fresh vault over the same store must trust the persisted flags
        // and skip the probe even though this provider would now succeed.
        let vault = SeedVault::new(Box::new(MemoryKeyProvider { failing: false }), store);
        assert!(!vault.is_supported());
    }
}
