use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::ScannerError;

/// Number of extra attempts after a transport error or 5xx response.
pub(crate) const MAX_RETRIES: usize = 3;

const USER_AGENT: &str = concat!("depvet/", env!("CARGO_PKG_VERSION"));

/// JSON-over-HTTP client shared by the scanners.
pub(crate) struct HttpClient {
    client: reqwest::Client,
    scanner: &'static str,
}

impl HttpClient {
    pub(crate) fn new(scanner: &'static str, timeout: Duration) -> Self {
        let client = match reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                // The orchestrator's per-scanner deadline still applies.
                warn!(scanner, error = %e, "HTTP client setup failed, using defaults");
                reqwest::Client::new()
            }
        };

        Self { client, scanner }
    }

    /// POSTs `body` as JSON and decodes a successful JSON response.
    pub(crate) async fn post_json<B, T>(
        &self,
        url: &str,
        body: &B,
        bearer_token: Option<&str>,
    ) -> Result<T, ScannerError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_with_retry(url, body, bearer_token).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.scanner, status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ScannerError::invalid_response(self.scanner, e.to_string()))
    }

    async fn send_with_retry<B>(
        &self,
        url: &str,
        body: &B,
        bearer_token: Option<&str>,
    ) -> Result<reqwest::Response, ScannerError>
    where
        B: Serialize + ?Sized,
    {
        let mut attempt = 0;
        loop {
            let mut request = self.client.post(url).json(body);
            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) if response.status().is_server_error() && attempt < MAX_RETRIES => {
                    debug!(
                        scanner = self.scanner,
                        status = %response.status(),
                        attempt,
                        "retrying after server error"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if attempt < MAX_RETRIES => {
                    debug!(scanner = self.scanner, error = %e, attempt, "retrying after transport error");
                }
                Err(e) => return Err(ScannerError::transport(self.scanner, e.to_string())),
            }

            attempt += 1;
        }
    }
}

/// Maps a non-success HTTP status to an error kind.
pub(crate) fn classify_status(scanner: &str, status: StatusCode, body: &str) -> ScannerError {
    match status {
        StatusCode::UNAUTHORIZED => ScannerError::auth(scanner, "invalid API token"),
        StatusCode::FORBIDDEN => {
            ScannerError::auth(scanner, "access denied, check your subscription")
        }
        StatusCode::TOO_MANY_REQUESTS => ScannerError::quota(scanner, "rate limit exceeded"),
        _ => ScannerError::transport(scanner, format!("HTTP {}: {}", status.as_u16(), body.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScannerErrorKind;
    use httpmock::prelude::*;
    use serde_json::{json, Value};

    async fn post_to(server: &MockServer) -> Result<Value, ScannerError> {
        let client = HttpClient::new("test", Duration::from_secs(5));
        client
            .post_json(&server.url("/query"), &json!({ "q": 1 }), None)
            .await
    }

    async fn server_answering(status: u16) -> MockServer {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(status);
            })
            .await;
        server
    }

    #[test]
    fn test_classify_status() {
        let err = classify_status("Socket.dev", StatusCode::UNAUTHORIZED, "");
        assert!(matches!(err.kind, ScannerErrorKind::Auth(_)));

        let err = classify_status("Socket.dev", StatusCode::FORBIDDEN, "");
        assert!(matches!(err.kind, ScannerErrorKind::Auth(_)));

        let err = classify_status("Socket.dev", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(err.kind, ScannerErrorKind::Quota(_)));

        let err = classify_status("Google OSV", StatusCode::BAD_REQUEST, " bad query \n");
        assert_eq!(
            err.kind,
            ScannerErrorKind::Transport("HTTP 400: bad query".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_reported() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(503).body("unavailable");
            })
            .await;

        let err = post_to(&server).await.unwrap_err();

        mock.assert_hits_async(1 + MAX_RETRIES).await;
        assert_eq!(
            err.kind,
            ScannerErrorKind::Transport("HTTP 503: unavailable".to_string())
        );
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(401);
            })
            .await;

        let err = post_to(&server).await.unwrap_err();

        mock.assert_hits_async(1).await;
        assert!(matches!(err.kind, ScannerErrorKind::Auth(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_quota_error() {
        let server = server_answering(429).await;
        let err = post_to(&server).await.unwrap_err();
        assert!(matches!(err.kind, ScannerErrorKind::Quota(_)));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query");
                then.status(200).body("not json");
            })
            .await;

        let err = post_to(&server).await.unwrap_err();
        assert!(matches!(err.kind, ScannerErrorKind::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_successful_json_is_decoded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/query").json_body(json!({ "q": 1 }));
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(json!({ "ok": true }));
            })
            .await;

        let value = post_to(&server).await.unwrap();
        assert_eq!(value["ok"], true);
    }
}
