//! Network gateway: HTTP execution, response classification, and the
//! provider/tenant request policies.
//!
//! The gateway boundary never throws: every call resolves to a
//! [`NetworkOutcome`] so callers above it map failures into domain errors
//! with their own step descriptions. Retries are local to one call and the
//! gateway never invents success — exhausting retries returns whatever the
//! server last answered.

use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

pub mod outcome;
pub mod wire;

mod provider;
mod tenant;

pub use outcome::NetworkOutcome;
pub use provider::ProviderApi;
pub use tenant::TenantApi;

use crate::config::MfaConfig;
use wire::ErrorBody;

/// Fixed immediate retries for the provider API while the response is
/// non-success. Total attempts = 6.
const PROVIDER_MAX_RETRIES: usize = 5;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP executor with sensible defaults.
#[derive(Clone)]
pub(crate) struct Gateway {
    client: reqwest::Client,
}

impl Gateway {
    pub(crate) fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(MfaConfig::user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("HTTP client construction only fails on TLS backend misconfiguration");
        Self { client }
    }

    pub(crate) const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Executes a request once and decodes the JSON body.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> NetworkOutcome<T> {
        match send(builder).await {
            Ok(response) => decode(response).await,
            Err(failure) => failure.into_outcome(),
        }
    }

    /// Executes a request, immediately retrying while the response is
    /// non-success, then decodes the JSON body.
    ///
    /// The request template is cloned per attempt so request identity is
    /// preserved across retries. Transport failures are not retried.
    pub(crate) async fn execute_with_retry<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> NetworkOutcome<T> {
        let Some(template) = builder.try_clone() else {
            // Non-cloneable bodies (streams) fall back to a single attempt.
            return self.execute(builder).await;
        };

        let backoff = ConstantBuilder::default()
            .with_delay(Duration::ZERO)
            .with_max_times(PROVIDER_MAX_RETRIES);

        let result = (|| async {
            let attempt = template.try_clone().ok_or_else(|| CallFailure {
                status: None,
                message: None,
                cause: Some("request template is not cloneable".to_string()),
                retryable: false,
            })?;
            send(attempt).await
        })
        .retry(backoff)
        .when(CallFailure::is_retryable)
        .await;

        match result {
            Ok(response) => decode(response).await,
            Err(failure) => failure.into_outcome(),
        }
    }
}

/// One failed call attempt, classified.
#[derive(Debug)]
struct CallFailure {
    status: Option<u16>,
    message: Option<String>,
    cause: Option<String>,
    retryable: bool,
}

impl CallFailure {
    const fn is_retryable(&self) -> bool {
        self.retryable
    }

    fn into_outcome<T>(self) -> NetworkOutcome<T> {
        match self.status {
            Some(status) => NetworkOutcome::Protocol {
                status,
                message: self.message,
            },
            None => NetworkOutcome::Transport {
                cause: self
                    .cause
                    .unwrap_or_else(|| "request failed".to_string()),
            },
        }
    }
}

/// Sends one request and classifies the response.
///
/// Non-success statuses become retryable [`CallFailure`]s carrying the
/// parsed `{"error"}` body when present; everything else is a permanent
/// transport failure.
async fn send(builder: RequestBuilder) -> Result<Response, CallFailure> {
    match builder.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            debug!(status = status.as_u16(), "non-success response");
            let message = parse_error_body(response).await;
            Err(CallFailure {
                status: Some(status.as_u16()),
                message,
                cause: None,
                retryable: true,
            })
        }
        Err(e) => Err(CallFailure {
            status: None,
            message: None,
            cause: Some(e.to_string()),
            retryable: false,
        }),
    }
}

async fn parse_error_body(response: Response) -> Option<String> {
    let body = response.text().await.ok()?;
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(parsed) => Some(parsed.error),
        Err(_) => Some("unable to parse error response".to_string()),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> NetworkOutcome<T> {
    match response.json::<T>().await {
        Ok(value) => NetworkOutcome::Success(value),
        Err(e) => NetworkOutcome::Transport {
            cause: format!("failed to decode response body: {e}"),
        },
    }
}
