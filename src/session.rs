//! Browsing sessions routed through a proxy.
//!
//! Walkers only see the [`PageFetcher`] trait, so fixtures can stand in for the live site.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::error::FetchError;
use crate::ProxyRecord;

/// Desktop Chrome user agent presented on every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Loads `url` and returns the document body once fully received.
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;

    /// Releases the session. Fetches after this fail with [`FetchError::Closed`].
    async fn close(&self) {}
}

/// A single proxied session reused across a whole walk.
pub struct BrowserSession {
    client: Mutex<Option<reqwest::Client>>,
    proxy_address: String,
    delay: Duration,
}

impl BrowserSession {
    pub fn launch(proxy: &ProxyRecord, delay_ms: u64) -> Result<Self> {
        let egress = reqwest::Proxy::all(format!("http://{}", proxy.address))
            .with_context(|| format!("Invalid proxy address {}", proxy.address))?
            .basic_auth(&proxy.username, &proxy.password);

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .proxy(egress)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client: Mutex::new(Some(client)),
            proxy_address: proxy.address.clone(),
            delay: Duration::from_millis(delay_ms),
        })
    }

    pub fn proxy_address(&self) -> &str {
        &self.proxy_address
    }

    pub fn is_closed(&self) -> bool {
        self.client.lock().map(|client| client.is_none()).unwrap_or(true)
    }

    fn client(&self) -> Option<reqwest::Client> {
        self.client.lock().ok().and_then(|client| client.clone())
    }
}

#[async_trait]
impl PageFetcher for BrowserSession {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let Some(client) = self.client() else {
            return Err(FetchError::Closed(url.to_string()));
        };

        debug!("Fetching: {}", url);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn close(&self) {
        if let Ok(mut client) = self.client.lock() {
            if client.take().is_some() {
                debug!("Closing session via {}", self.proxy_address);
            }
        }
    }
}

/// Plain client used to download artifacts outside the browsing session.
pub fn download_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(120))
        .build()
        .context("Failed to create download client")
}
