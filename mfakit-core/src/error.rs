use mfakit_store::StoreError;
use thiserror::Error;

/// Error outputs from MfaKit.
///
/// Every remote failure carries the step description it occurred in and,
/// for protocol errors, the HTTP status the server answered with, so
/// callers can present a useful notice without re-deriving context.
#[derive(Debug, Error)]
pub enum MfaError {
    /// The presented input is not valid for the requested operation.
    #[error("{reason}")]
    InvalidInput {
        /// Why the input was rejected.
        reason: String,
    },
    /// The server answered a structured HTTP error.
    #[error("{step}: status {status}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    Protocol {
        /// Step-specific description of the failing call.
        step: String,
        /// HTTP status code.
        status: u16,
        /// Parsed `{"error": ...}` body, when present.
        message: Option<String>,
    },
    /// Connectivity, timeout, or any other non-HTTP failure.
    #[error("{step}: {cause}")]
    Transport {
        /// Step-specific description of the failing call.
        step: String,
        /// The original cause, stringified.
        cause: String,
    },
    /// Seed encryption or decryption failed; the record is unusable.
    #[error("corrupted factor: {reason}")]
    DataIntegrity {
        /// What went wrong with the seed material.
        reason: String,
    },
    /// The seed vault could not perform a key or cipher operation.
    #[error("vault error: {reason}")]
    Vault {
        /// What went wrong inside the vault.
        reason: String,
    },
    /// The factor store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The operation's task was cancelled before it resolved.
    #[error("operation cancelled")]
    Cancelled,
}

impl MfaError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub(crate) fn vault(reason: impl Into<String>) -> Self {
        Self::Vault {
            reason: reason.into(),
        }
    }
}
