//! Status handling shared by the HTTP completion clients.

use std::time::Duration;

use crate::{MimirError, Result};

/// Map a non-success HTTP response to a provider error.
///
/// Consumes the response so the body can be included in the message.
pub(crate) async fn check_status(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(MimirError::AuthenticationFailed),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(MimirError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            Err(MimirError::Api {
                status: code,
                message: format!("{provider} API error: {status} {snippet}"),
            })
        }
    }
}

/// Map a reqwest send/decode error, attaching the configured timeout.
pub(crate) fn map_transport(err: reqwest::Error, timeout: Duration) -> MimirError {
    if err.is_timeout() {
        MimirError::Timeout(timeout)
    } else {
        MimirError::from(err)
    }
}
