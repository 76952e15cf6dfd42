//! Registration code classification and otpauth URI parsing.
//!
//! Provider-native codes come in three shapes (shard-prefixed token,
//! nine-digit numeric, long shard-prefixed alphanumeric) or as URIs whose
//! `issuer` query parameter names the provider. Anything else is treated
//! as a third-party otpauth code. Parsing is hand-rolled; codes are not
//! guaranteed to be well-formed URLs.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::MfaError;

const PROVIDER_ISSUER: &str = "OneLogin";
const PROVIDER_PUSH_HOST: &str = "protect.onelogin.com";

// Compiling patterns is slow enough to matter at startup, so they are
// built on first use.
static PROVIDER_CODE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"^\d{2}-\w{7,}$").expect("static pattern"),
        Regex::new(r"^\d{9}$").expect("static pattern"),
        Regex::new(r"^\d{2}\w{17,}$").expect("static pattern"),
    ]
});

/// Whether `code` registers a provider-native factor, by shape or by an
/// `issuer=OneLogin` query parameter.
pub(crate) fn is_provider_code(code: &str) -> bool {
    if matches_provider_pattern(code) {
        return true;
    }
    query_param(code, "issuer")
        .is_some_and(|issuer| issuer.eq_ignore_ascii_case(PROVIDER_ISSUER))
}

/// Extracts the registration secret from a provider-native code.
///
/// Bare pattern matches are their own secret. Push-style URIs on the
/// provider's host carry it in `code`; otpauth-style URIs carry it in
/// `secret` but only when the issuer is the provider.
pub(crate) fn provider_secret(code: &str) -> Option<String> {
    if matches_provider_pattern(code) {
        return Some(code.to_string());
    }

    if host(code).is_some_and(|host| host.eq_ignore_ascii_case(PROVIDER_PUSH_HOST)) {
        return query_param(code, "code");
    }

    let issuer = query_param(code, "issuer")?;
    if !issuer.eq_ignore_ascii_case(PROVIDER_ISSUER) {
        return None;
    }
    query_param(code, "secret")
}

/// The issuer a registration code names. Non-otpauth codes are always
/// provider-native; otpauth codes without an issuer parameter report "".
pub(crate) fn issuer_of(code: &str) -> String {
    if !code.starts_with("otpauth://totp") {
        return PROVIDER_ISSUER.to_string();
    }
    query_param(code, "issuer").unwrap_or_default()
}

/// Fields of a parsed third-party registration code.
#[derive(Debug, Default)]
pub(crate) struct OtpauthCode {
    pub secret: Option<String>,
    pub issuer: Option<String>,
    pub label_issuer: Option<String>,
    pub username: Option<String>,
    pub algorithm: Option<String>,
    pub digits: Option<u32>,
    pub period: Option<u32>,
}

/// Parses a third-party registration code.
///
/// Tolerates arbitrary non-URI input (all fields come back `None`); a
/// present but non-numeric `digits` or `period` is rejected.
///
/// # Errors
/// [`MfaError::InvalidInput`] for non-numeric `digits` or `period`.
pub(crate) fn parse_otpauth(code: &str) -> Result<OtpauthCode, MfaError> {
    let mut parsed = OtpauthCode {
        secret: query_param(code, "secret"),
        issuer: query_param(code, "issuer"),
        algorithm: query_param(code, "algorithm").filter(|a| !a.is_empty()),
        ..OtpauthCode::default()
    };

    if let Some(digits) = query_param(code, "digits").filter(|d| !d.is_empty()) {
        parsed.digits = Some(digits.parse().map_err(|_| {
            MfaError::invalid_input("digits parameter is not numeric")
        })?);
    }
    if let Some(period) = query_param(code, "period").filter(|p| !p.is_empty()) {
        parsed.period = Some(period.parse().map_err(|_| {
            MfaError::invalid_input("period parameter is not numeric")
        })?);
    }

    // The label is the last path segment, `issuer:username` or bare
    // `username`.
    if let Some(label) = last_path_segment(code) {
        match label.split_once(':') {
            Some((issuer, username)) => {
                if !issuer.is_empty() {
                    parsed.label_issuer = Some(issuer.to_string());
                }
                if !username.is_empty() {
                    parsed.username = Some(username.to_string());
                }
            }
            None => {
                if !label.is_empty() {
                    parsed.username = Some(label);
                }
            }
        }
    }

    Ok(parsed)
}

fn matches_provider_pattern(code: &str) -> bool {
    PROVIDER_CODE_PATTERNS
        .iter()
        .any(|pattern| pattern.is_match(code))
}

/// The authority portion of a URI-shaped code, ports stripped.
fn host(code: &str) -> Option<&str> {
    let rest = code.split_once("://")?.1;
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(rest);
    Some(authority.rsplit_once(':').map_or(authority, |(host, _)| host))
}

/// Looks up a query parameter by exact key, percent-decoding the value.
fn query_param(code: &str, key: &str) -> Option<String> {
    let query = code.split_once('?')?.1;
    let query = query.split('#').next().unwrap_or(query);
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (pair_key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if pair_key == key {
            return Some(percent_decode(value));
        }
    }
    None
}

fn last_path_segment(code: &str) -> Option<String> {
    let rest = code.split_once("://")?.1;
    let path = rest.split(['?', '#']).next().unwrap_or(rest);
    // Skip the authority; segments after it form the path.
    let mut segments = path.split('/');
    segments.next();
    segments
        .rfind(|segment| !segment.is_empty())
        .map(percent_decode)
}

/// Lenient percent-decoding: valid `%XX` sequences are decoded, `+` is a
/// space, everything else passes through as-is.
fn percent_decode(input: &str) -> String {
    fn from_hex(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }

    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                if let (Some(hi), Some(lo)) = (from_hex(bytes[i + 1]), from_hex(bytes[i + 2])) {
                    out.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
                out.push(b'%');
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
