//! Shared HTTP plumbing for control-plane adapters.
//!
//! Every HTTP failure is classified here, once, into a transient or terminal
//! [`ProviderError`].

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::domain::errors::{ProviderError, ProviderResult};

const MAX_BODY_IN_ERROR: usize = 256;

/// Map a non-success status to a provider error.
pub fn error_for_status(status: StatusCode, context: &str, body: &str) -> ProviderError {
    let body: String = body.chars().take(MAX_BODY_IN_ERROR).collect();
    let message = format!("{context} returned {status}: {body}");
    match status.as_u16() {
        401 | 403 => ProviderError::permission_denied(message),
        404 => ProviderError::not_found(message),
        400 | 409 | 422 => ProviderError::invalid_argument(message),
        429 => ProviderError::rate_limited(message),
        408 => ProviderError::timeout(message),
        s if s >= 500 => ProviderError::unavailable(message),
        _ => ProviderError::invalid_argument(message),
    }
}

/// Map a transport-level failure to a provider error.
pub fn error_for_transport(err: &reqwest::Error, context: &str) -> ProviderError {
    if err.is_timeout() {
        ProviderError::timeout(format!("{context} timed out: {err}"))
    } else if err.is_decode() {
        ProviderError::invalid_argument(format!("{context} returned an unreadable body: {err}"))
    } else {
        ProviderError::network(format!("{context} failed: {err}"))
    }
}

/// Send a request and turn anything but 2xx into a classified error.
pub async fn send(request: RequestBuilder, context: &str) -> ProviderResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| error_for_transport(&e, context))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_for_status(status, context, &body))
}

/// Send a deletion. A target that is already gone counts as deleted.
pub async fn send_delete(request: RequestBuilder, context: &str) -> ProviderResult<()> {
    match send(request, context).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!(operation = context, "target already absent");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Send and decode a JSON body.
pub async fn send_json<T: serde::de::DeserializeOwned>(
    request: RequestBuilder,
    context: &str,
) -> ProviderResult<T> {
    send(request, context)
        .await?
        .json::<T>()
        .await
        .map_err(|e| error_for_transport(&e, context))
}

/// Read a bearer token from the named environment variable.
///
/// Returns `None` if unset or empty; calls then fail as permission-denied.
pub fn token_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|t| !t.trim().is_empty())
}

/// Error returned when no token is configured.
pub fn missing_token(var: &str) -> ProviderError {
    ProviderError::permission_denied(format!("access token environment variable {var} is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let cases = [
            (401, false),
            (403, false),
            (404, false),
            (400, false),
            (409, false),
            (422, false),
            (429, true),
            (500, true),
            (503, true),
        ];
        for (code, transient) in cases {
            let err = error_for_status(StatusCode::from_u16(code).unwrap(), "op", "");
            assert_eq!(err.is_transient(), transient, "status {code}");
        }
        assert!(error_for_status(StatusCode::NOT_FOUND, "op", "").is_not_found());
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(10_000);
        let err = error_for_status(StatusCode::BAD_REQUEST, "op", &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn test_token_from_env() {
        temp_env::with_var("KEYWARDEN_TEST_TOKEN", Some("  "), || {
            assert!(token_from_env("KEYWARDEN_TEST_TOKEN").is_none());
        });
        temp_env::with_var("KEYWARDEN_TEST_TOKEN", Some("abc"), || {
            assert_eq!(token_from_env("KEYWARDEN_TEST_TOKEN").as_deref(), Some("abc"));
        });
    }
}
