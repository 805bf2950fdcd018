//! Shared reqwest plumbing for the HTTP-backed transport clients.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::domain::DeliveryError;

/// Connect/read timeouts for transport clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            read: Duration::from_secs(15),
        }
    }
}

pub(crate) fn build_client(timeouts: HttpTimeouts) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .build()
}

/// Map a non-success response to a classified failure.
///
/// 408 and 429 are worth retrying; any other 4xx will fail the same way again.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> DeliveryError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 200));
    let retryable = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if status.is_client_error() && !retryable {
        DeliveryError::permanent(message)
    } else {
        DeliveryError::transient(message)
    }
}

/// Request-level errors (connect, timeout, body) are always transient.
/// The URL is stripped so credentials embedded in it never reach a log line.
pub(crate) fn request_error(err: reqwest::Error) -> DeliveryError {
    let label = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connect failed"
    } else {
        "request failed"
    };
    DeliveryError::transient(format!("{label}: {}", err.without_url()))
}

fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use rstest::rstest;

    #[rstest]
    #[case::bad_request(400, FailureKind::Permanent)]
    #[case::unauthorized(401, FailureKind::Permanent)]
    #[case::not_found(404, FailureKind::Permanent)]
    #[case::request_timeout(408, FailureKind::Transient)]
    #[case::too_many_requests(429, FailureKind::Transient)]
    #[case::internal(500, FailureKind::Transient)]
    #[case::unavailable(503, FailureKind::Transient)]
    fn status_classification(#[case] code: u16, #[case] kind: FailureKind) {
        let status = StatusCode::from_u16(code).unwrap();
        let err = classify_status(status, "nope");
        assert_eq!(err.kind, kind);
        assert!(err.message.starts_with(&format!("HTTP {code}")));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1_000);
        let err = classify_status(StatusCode::BAD_GATEWAY, &body);
        assert!(err.message.len() < 220);
    }
}
