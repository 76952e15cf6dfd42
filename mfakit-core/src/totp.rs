//! RFC 6238 time-based one-time password generation.
//!
//! Pure computation: the current time is always injected through a clock
//! function so display layers and tests control the timestamp. An empty
//! output string means "generation error" and must never be shown as a
//! code; a valid code is always exactly `digits` characters wide.

use std::time::{SystemTime, UNIX_EPOCH};

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};

use mfakit_store::Factor;

/// Injected time source, returning epoch milliseconds.
pub type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

fn system_clock() -> Clock {
    Box::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
    })
}

/// A TOTP generator bound to one factor's seed and parameters.
pub struct TotpGenerator {
    seed: String,
    period: u32,
    digits: u32,
    crypto: String,
    t0: i64,
    clock: Clock,
}

impl TotpGenerator {
    /// Creates a generator with the system clock.
    #[must_use]
    pub fn new(seed: &str, period: u32, digits: u32, crypto: &str) -> Self {
        Self::with_clock(seed, period, digits, crypto, system_clock())
    }

    /// Creates a generator with an explicit clock. Tests pin time with this.
    #[must_use]
    pub fn with_clock(
        seed: &str,
        period: u32,
        digits: u32,
        crypto: &str,
        clock: Clock,
    ) -> Self {
        Self {
            seed: seed.to_string(),
            period: period.max(1),
            digits,
            crypto: crypto.to_string(),
            t0: 0,
            clock,
        }
    }

    /// Creates a generator for a stored factor's parameters.
    #[must_use]
    pub fn for_factor(factor: &Factor) -> Self {
        Self::new(&factor.seed, factor.period, factor.digits, &factor.crypto)
    }

    /// Generates the code for the clock's current time.
    ///
    /// Returns the empty string when the seed does not decode as base-32;
    /// callers must treat that as a generation error, never as a code.
    #[must_use]
    pub fn generate(&self) -> String {
        self.generate_at((self.clock)())
    }

    /// Generates the code for an explicit timestamp (epoch millis).
    #[must_use]
    pub fn generate_at(&self, time_millis: i64) -> String {
        self.generate_inner(time_millis).unwrap_or_default()
    }

    fn generate_inner(&self, time_millis: i64) -> Option<String> {
        let key = decode_seed(&self.seed)?;
        let counter = (time_millis / 1000) / i64::from(self.period);
        let message = counter.to_be_bytes();
        let digest = hmac_digest(&self.crypto, &key, &message);

        // RFC 4226 dynamic truncation.
        let offset = usize::from(digest.last()? & 0x0f);
        let slice = digest.get(offset..offset + 4)?;
        let binary = (u32::from(slice[0] & 0x7f) << 24)
            | (u32::from(slice[1]) << 16)
            | (u32::from(slice[2]) << 8)
            | u32::from(slice[3]);

        let modulus = 10u32.checked_pow(self.digits)?;
        let code = binary % modulus;
        Some(format!("{code:0width$}", width = self.digits as usize))
    }

    /// Seconds until the current code rolls over.
    #[must_use]
    pub fn time_remaining(&self) -> i64 {
        let seconds = (self.clock)() / 1000;
        i64::from(self.period) - ((seconds - self.t0) % i64::from(self.period))
    }

    /// Milliseconds until the current code rolls over.
    #[must_use]
    pub fn time_remaining_millis(&self) -> i64 {
        let period_millis = i64::from(self.period) * 1000;
        period_millis - (((self.clock)() - self.t0) % period_millis)
    }
}

/// Decodes a base-32 seed, tolerating case and padding.
///
/// `None` when the seed is empty or not valid base-32; zero decoded bytes
/// are treated the same as a decode failure.
fn decode_seed(seed: &str) -> Option<Vec<u8>> {
    let normalized = seed.trim().trim_end_matches('=').to_ascii_uppercase();
    let bytes = BASE32_NOPAD.decode(normalized.as_bytes()).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(bytes)
}

/// Computes the HMAC digest for a case-insensitive algorithm name.
///
/// Already-qualified `Hmac<ALG>` names are accepted as-is; anything
/// unrecognized falls back to SHA1.
fn hmac_digest(algorithm: &str, key: &[u8], message: &[u8]) -> Vec<u8> {
    macro_rules! digest_with {
        ($hash:ty) => {{
            let mut mac = <Hmac<$hash>>::new_from_slice(key)
                .expect("hmac accepts any key length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }};
    }

    let name = algorithm.to_ascii_lowercase();
    let name = name.strip_prefix("hmac").unwrap_or(&name);
    match name {
        "md5" => digest_with!(Md5),
        "sha224" => digest_with!(Sha224),
        "sha256" => digest_with!(Sha256),
        "sha384" => digest_with!(Sha384),
        "sha512" => digest_with!(Sha512),
        _ => digest_with!(Sha1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned(seed: &str, period: u32, millis: i64) -> TotpGenerator {
        TotpGenerator::with_clock(seed, period, 6, "HmacSHA1", Box::new(move || millis))
    }

    #[test]
    fn generates_known_vector() {
        assert_eq!(pinned("testSeed", 30, 0).generate(), "298837");
    }

    #[test]
    fn empty_seed_yields_empty_code() {
        assert_eq!(pinned("", 30, 0).generate(), "");
    }

    #[test]
    fn undecodable_seed_yields_empty_code() {
        assert_eq!(pinned("!!!not-base32!!!", 30, 0).generate(), "");
    }

    #[test]
    fn code_is_zero_padded_to_digit_width() {
        let generator =
            TotpGenerator::with_clock("testSeed", 30, 8, "SHA1", Box::new(|| 0));
        assert_eq!(generator.generate().len(), 8);
    }

    #[test]
    fn unknown_algorithm_falls_back_to_sha1() {
        let sha1 = pinned("testSeed", 30, 0).generate();
        let fallback =
            TotpGenerator::with_clock("testSeed", 30, 6, "NotARealHash", Box::new(|| 0));
        assert_eq!(fallback.generate(), sha1);
    }

    #[test]
    fn algorithm_names_are_case_insensitive() {
        let lower =
            TotpGenerator::with_clock("testSeed", 30, 6, "sha256", Box::new(|| 0));
        let qualified =
            TotpGenerator::with_clock("testSeed", 30, 6, "HmacSHA256", Box::new(|| 0));
        assert_eq!(lower.generate(), qualified.generate());
    }

    #[test]
    fn timer_at_period_start() {
        assert_eq!(pinned("testSeed", 30, 1_350_000).time_remaining(), 30);
    }

    #[test]
    fn timer_mid_period() {
        assert_eq!(pinned("testSeed", 30, 1_365_000).time_remaining(), 15);
    }

    #[test]
    fn timer_with_non_default_period() {
        assert_eq!(pinned("testSeed", 43, 1_935_000).time_remaining(), 43);
    }

    #[test]
    fn timer_in_millis() {
        assert_eq!(
            pinned("testSeed", 30, 1_350_000).time_remaining_millis(),
            30_000
        );
    }
}
