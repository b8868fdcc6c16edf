use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client};
use std::time::Duration;

use crate::error::WatchError;

/// Creates an HTTP client with standard browser headers so the sale sites
/// serve us the same markup they serve a browser.
pub fn create_http_client(user_agent: &str) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.9,ja;q=0.8")
    );
    headers.insert(
        header::ACCEPT_ENCODING,
        header::HeaderValue::from_static("gzip, deflate, br")
    );
    headers.insert(
        header::CONNECTION,
        header::HeaderValue::from_static("keep-alive")
    );
    headers.insert(
        "Upgrade-Insecure-Requests",
        header::HeaderValue::from_static("1")
    );

    let client = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .build()?;

    Ok(client)
}

/// The single network primitive the core needs: fetch a URL and return body
/// text, or fail after retries are exhausted. Behind a trait so pagination and
/// enrichment can be driven from canned pages in tests.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, WatchError>;
}

pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff_ms: u64,
}

impl HttpFetcher {
    pub fn new(client: Client, retries: u32, backoff_ms: u64) -> Self {
        Self {
            client,
            retries: retries.max(1),
            backoff_ms,
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, WatchError> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.retries {
            tracing::debug!("GET {} (attempt {}/{})", url, attempt, self.retries);

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => last_error = format!("failed to read body: {}", e),
                        }
                    } else {
                        last_error = format!("HTTP {}", status);
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.retries {
                let backoff = Duration::from_millis(self.backoff_ms * attempt as u64);
                tracing::warn!("Fetch of {} failed ({}), retrying in {:?}", url, last_error, backoff);
                tokio::time::sleep(backoff).await;
            }
        }

        Err(WatchError::FetchFailure {
            url: url.to_string(),
            reason: last_error,
        })
    }
}
