//! The factor record: one registered MFA credential.

/// A registered MFA credential.
///
/// `seed` holds the TOTP secret, encrypted at rest when the seed vault is
/// active. Policy flags (`allow_root`, `force_lock`, `require_biometrics`,
/// `allow_backup`) come from remote device settings and default permissive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    /// Store-assigned row id, immutable once persisted.
    pub id: i64,
    /// Remote credential identifier. `None` for plain third-party factors.
    pub credential_id: Option<String>,
    /// Tenant subdomain the factor was registered against.
    pub subdomain: Option<String>,
    /// Two-character regional routing code.
    pub shard: Option<String>,
    /// Username reported by the provider at registration.
    pub username: Option<String>,
    /// TOTP secret. Non-empty for any usable persisted factor.
    pub seed: String,
    /// Issuer name ("OneLogin" for provider-native factors).
    pub issuer: Option<String>,
    /// Creation timestamp in epoch milliseconds.
    pub creation_date: i64,
    /// Whether rooted devices may use this factor.
    pub allow_root: bool,
    /// Whether the provider requires a device lock screen.
    pub force_lock: bool,
    /// Whether the provider requires biometric verification.
    pub require_biometrics: bool,
    /// Whether the seed may be included in device backups.
    pub allow_backup: bool,
    /// False once the server reports the device unpaired.
    pub paired: bool,
    /// Human-readable name shown by the display layer.
    pub display_name: Option<String>,
    /// Sort key for display ordering.
    pub order_preference: i64,
    /// HMAC algorithm name in `Hmac<ALG>` form.
    pub crypto: String,
    /// Code rollover period in seconds.
    pub period: u32,
    /// Number of digits in a generated code.
    pub digits: u32,
}

impl Default for Factor {
    fn default() -> Self {
        Self {
            id: 0,
            credential_id: None,
            subdomain: None,
            shard: None,
            username: None,
            seed: String::new(),
            issuer: None,
            creation_date: 0,
            allow_root: true,
            force_lock: false,
            require_biometrics: false,
            allow_backup: true,
            paired: true,
            display_name: None,
            order_preference: 0,
            crypto: "HmacSHA1".to_string(),
            period: 30,
            digits: 6,
        }
    }
}

impl Factor {
    /// The corrupted-factor sentinel: a default record with an empty seed.
    ///
    /// Produced when seed encryption or decryption fails. Never persisted;
    /// list reads drop it, single-record reads surface it so the caller can
    /// check [`is_corrupted`](Self::is_corrupted).
    #[must_use]
    pub fn corrupted() -> Self {
        Self::default()
    }

    /// Returns true for records whose seed is unusable.
    ///
    /// An empty seed can never generate a code, so emptiness doubles as the
    /// corruption marker. Prefer this over equality against a default
    /// record.
    #[must_use]
    pub fn is_corrupted(&self) -> bool {
        self.seed.is_empty()
    }
}
