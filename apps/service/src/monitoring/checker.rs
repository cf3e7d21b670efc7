use anyhow::Result;
use std::error::Error as _;
use std::time::{Duration, Instant};

use super::types::ProbeOutcome;

/// Redirect hops followed before a probe gives up
const MAX_REDIRECTS: usize = 10;

/// Executes one health check against a target.
///
/// Implementations never retry and never return an error: every failure is
/// folded into a non-success [`ProbeOutcome`].
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str, timeout_ms: u64) -> ProbeOutcome;
}

/// HTTP/HTTPS prober issuing a single GET per check
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("watchup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str, timeout_ms: u64) -> ProbeOutcome {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await;

        let latency = start.elapsed().as_millis() as u64;

        match response {
            Ok(response) => {
                let status = response.status();
                // 2xx and 3xx count as up
                if status.is_success() || status.is_redirection() {
                    ProbeOutcome::success(status.as_u16(), latency)
                } else {
                    ProbeOutcome::rejected(status.as_u16(), latency)
                }
            }
            Err(e) => ProbeOutcome::transport_failure(describe_failure(&e), latency),
        }
    }
}

/// Flatten a reqwest error and its sources into one line
fn describe_failure(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "request timed out"
    } else if error.is_connect() {
        "connection failed"
    } else if error.is_redirect() {
        "too many redirects"
    } else if error.is_builder() {
        "invalid request"
    } else {
        "request failed"
    };

    let mut message = kind.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `responses` in order, one per accepted connection, then stop.
    async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        format!("http://{addr}/health")
    }

    fn reply(status_line: &str, extra_headers: &str) -> String {
        format!("HTTP/1.1 {status_line}\r\n{extra_headers}Content-Length: 0\r\nConnection: close\r\n\r\n")
    }

    #[tokio::test]
    async fn test_success_status() {
        let url = serve(vec![reply("204 No Content", "")]).await;
        let outcome = HttpProber::new().unwrap().probe(&url, 2000).await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(204));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_server_error_is_failure_with_code() {
        let url = serve(vec![reply("503 Service Unavailable", "")]).await;
        let outcome = HttpProber::new().unwrap().probe(&url, 2000).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, Some(503));
        assert_eq!(outcome.error.as_deref(), Some("HTTP status 503"));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let target = serve(vec![reply("200 OK", "")]).await;
        let url = serve(vec![reply("302 Found", &format!("Location: {target}\r\n"))]).await;
        let outcome = HttpProber::new().unwrap().probe(&url, 2000).await;

        assert!(outcome.success);
        assert_eq!(outcome.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = HttpProber::new().unwrap().probe(&format!("http://{addr}/"), 2000).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_timeout_measures_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the socket without ever answering.
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let outcome = HttpProber::new().unwrap().probe(&format!("http://{addr}/"), 200).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status_code, None);
        assert!(outcome.latency_ms >= 200);
        assert!(outcome.error.unwrap().contains("timed out"));
    }
}
