//! One HTTP round-trip with classification.

use std::time::Duration;

use pipeline::ProviderError;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

use crate::classify::{classify_status, classify_transport, malformed_envelope, parse_retry_after};

/// Sends `request` with a per-attempt `timeout` and decodes a 2xx body as `T`.
///
/// Every failure comes back as a classified [`ProviderError`].
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
    timeout: Duration,
) -> Result<T, ProviderError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| classify_transport(provider, &err))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers().get(reqwest::header::RETRY_AFTER));
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(provider, %status, "Provider returned error status");
        return Err(classify_status(provider, status, &body, retry_after));
    }

    let body = response
        .text()
        .await
        .map_err(|err| classify_transport(provider, &err))?;
    serde_json::from_str(&body).map_err(|err| malformed_envelope(provider, &err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::ErrorKind;
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[derive(Debug, Deserialize)]
    struct Echo {
        ok: bool,
    }

    /// Serves `response` verbatim to the first connection and returns its URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_success_body_decoded() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 11\r\nconnection: close\r\n\r\n{\"ok\":true}",
        )
        .await;
        let client = reqwest::Client::new();

        let echo: Echo = send_json("test", client.post(url), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(echo.ok);
    }

    #[tokio::test]
    async fn test_rate_limit_carries_retry_after() {
        let url = serve_once(
            "HTTP/1.1 429 Too Many Requests\r\nretry-after: 7\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;
        let client = reqwest::Client::new();

        let err = send_json::<Echo>("test", client.post(url), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[tokio::test]
    async fn test_wrong_envelope_is_unparseable() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n[]",
        )
        .await;
        let client = reqwest::Client::new();

        let err = send_json::<Echo>("test", client.post(url), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnparseableResponse);
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_failed() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = reqwest::Client::new();
        let err = send_json::<Echo>("test", client.post(format!("http://{addr}/")), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionFailed);
    }
}
