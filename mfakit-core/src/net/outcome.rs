//! Tri-state result of a remote call.

use crate::error::MfaError;

/// Classified result of one remote call.
///
/// Produced by the network gateway and consumed immediately by the caller;
/// the gateway itself never returns `Err` across its boundary. Protocol
/// errors preserve the HTTP status and the server's parsed `{"error"}`
/// message when one was present.
#[derive(Debug)]
pub enum NetworkOutcome<T> {
    /// The call succeeded and the body decoded.
    Success(T),
    /// The server answered with a structured HTTP error.
    Protocol {
        /// HTTP status code.
        status: u16,
        /// Parsed error body message, when the body was `{"error": ...}`.
        message: Option<String>,
    },
    /// The call never produced a usable HTTP response.
    Transport {
        /// The original cause, stringified.
        cause: String,
    },
}

impl<T> NetworkOutcome<T> {
    /// Converts the outcome into a domain error carrying a step-specific
    /// description, preserving the status code for protocol errors.
    ///
    /// # Errors
    /// Returns the converted error for the two failure cases.
    pub fn into_result(self, step: &str) -> Result<T, MfaError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Protocol { status, message } => Err(MfaError::Protocol {
                step: step.to_string(),
                status,
                message,
            }),
            Self::Transport { cause } => Err(MfaError::Transport {
                step: step.to_string(),
                cause,
            }),
        }
    }
}
