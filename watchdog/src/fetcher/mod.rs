use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

/// Raw response from an endpoint. Parsing is left to the caller.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Largest response body accepted from any endpoint.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// GET-only HTTP client with a hard per-request deadline. No retries: a
/// failed request is retried by the next cycle, not here.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_body: usize,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            timeout,
            max_body: MAX_BODY_BYTES,
            user_agent: format!("node-watchdog/{}", env!("CARGO_PKG_VERSION")),
        })
    }

    pub fn with_max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    /// GET `url` and return status and body, whatever the status. Bodies
    /// larger than the configured cap are rejected without being buffered.
    pub async fn fetch(&self, url: &str) -> std::result::Result<HttpResponse, FetchError> {
        debug!("GET {}", url);

        let mut resp = self
            .client
            .get(url)
            .header("user-agent", &self.user_agent)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = resp.status().as_u16();
        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_body,
        };
        if resp.content_length().is_some_and(|len| len > self.max_body as u64) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| self.classify(url, e))? {
            if body.len() + chunk.len() > self.max_body {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(HttpResponse { status, body })
    }

    /// Like [`fetch`](Self::fetch) but a non-2xx status is an error.
    pub async fn fetch_ok(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        let resp = self.fetch(url).await?;
        if !resp.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status,
            });
        }
        Ok(resp.body)
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout: self.timeout,
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                source: e,
            }
        }
    }
}

/// Join a base URL and an endpoint path without doubling the slash.
pub fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
