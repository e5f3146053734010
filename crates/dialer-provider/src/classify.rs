//! Failure classification for the HTTP provider
//!
//! Maps transport errors and provider error responses onto
//! [`ProviderError`]. The job processor retries on nothing but `Transient`.
//! A timeout is `Transient` even though the request may have reached the
//! provider, so a retry after a timeout can place a second call.

use dialer_core::ProviderError;
use reqwest::StatusCode;
use serde::Deserialize;

/// Provider error codes meaning the destination number itself is unusable
const INVALID_NUMBER_CODES: [i64; 4] = [
    21211, // invalid 'To' phone number
    21214, // 'To' number cannot be reached
    21217, // phone number does not appear to be valid
    13224, // invalid number for dialing
];

/// Error document returned by the provider API
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Classify a failure that happened before a response arrived
pub fn transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Transient(format!("request timed out: {}", err))
    } else if err.is_connect() || err.is_request() {
        ProviderError::Transient(format!("connection failed: {}", err))
    } else if err.is_builder() {
        ProviderError::Permanent(format!("invalid request: {}", err))
    } else {
        ProviderError::Transient(err.to_string())
    }
}

/// Classify a non-success HTTP response
pub fn http_status(status: StatusCode, body: &str) -> ProviderError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|b| b.code);
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.chars().take(200).collect());
    let detail = match code {
        Some(code) => format!("HTTP {} (code {}): {}", status.as_u16(), code, message),
        None => format!("HTTP {}: {}", status.as_u16(), message),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Authentication(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => ProviderError::Transient(detail),
        s if s.is_server_error() => ProviderError::Transient(detail),
        _ if code.map_or(false, |c| INVALID_NUMBER_CODES.contains(&c)) => {
            ProviderError::InvalidDestination(detail)
        }
        _ => ProviderError::Permanent(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_fatal() {
        let err = http_status(StatusCode::UNAUTHORIZED, r#"{"code":20003,"message":"Authenticate"}"#);
        assert!(matches!(err, ProviderError::Authentication(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_rate_limit_and_5xx_are_transient() {
        assert!(http_status(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(http_status(StatusCode::BAD_GATEWAY, "<html>oops</html>").is_retryable());
        assert!(http_status(StatusCode::SERVICE_UNAVAILABLE, "{}").is_retryable());
    }

    #[test]
    fn test_request_timeout_is_retried() {
        let err = http_status(StatusCode::REQUEST_TIMEOUT, "");
        assert!(matches!(err, ProviderError::Transient(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_number_code() {
        let err = http_status(
            StatusCode::BAD_REQUEST,
            r#"{"code":21211,"message":"The 'To' number +1555 is not a valid phone number."}"#,
        );
        assert!(matches!(err, ProviderError::InvalidDestination(_)));
        assert!(err.to_string().contains("21211"));
    }

    #[test]
    fn test_other_4xx_is_permanent() {
        let err = http_status(StatusCode::BAD_REQUEST, r#"{"code":21205,"message":"Url is not valid"}"#);
        assert!(matches!(err, ProviderError::Permanent(_)));
        let err = http_status(StatusCode::NOT_FOUND, "not json");
        assert!(matches!(err, ProviderError::Permanent(_)));
    }
}
