//! Proxy list parsing and selection.

use anyhow::{bail, Context, Result};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use crate::store::HarvestStore;
use crate::ProxyRecord;

/// Where exit nodes come from.
#[derive(Debug, Clone)]
pub enum ProxySource {
    /// A newline-delimited `ip:port:username:password` list fetched on every call.
    Remote(String),
    /// The `proxies` table, refreshed by `refresh-proxies`.
    Table,
}

/// Parses `ip:port:username:password` lines. Blank and malformed lines are dropped.
pub fn parse_proxy_list(text: &str) -> Vec<ProxyRecord> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            match parts.as_slice() {
                [ip, port, username, password]
                    if !ip.is_empty() && !port.is_empty() && !username.is_empty() =>
                {
                    Some(ProxyRecord {
                        address: format!("{}:{}", ip, port),
                        username: username.to_string(),
                        password: password.to_string(),
                    })
                }
                _ => {
                    debug!("Skipping malformed proxy line");
                    None
                }
            }
        })
        .collect()
}

pub async fn fetch_proxy_list(client: &reqwest::Client, url: &str) -> Result<Vec<ProxyRecord>> {
    let resp = client
        .get(url)
        .send()
        .await
        .context("Failed to fetch proxies")?;

    let status = resp.status();
    if !status.is_success() {
        bail!("Failed to fetch proxies: HTTP {}", status);
    }

    let body = resp.text().await.context("Failed to read proxy list")?;
    let proxies = parse_proxy_list(&body);
    info!("Fetched {} proxies", proxies.len());
    Ok(proxies)
}

/// Picks one exit node. An empty source is fatal: nothing can be scraped without one.
pub async fn select_proxy(
    source: &ProxySource,
    client: &reqwest::Client,
    store: &dyn HarvestStore,
) -> Result<ProxyRecord> {
    let proxy = match source {
        ProxySource::Remote(url) => {
            let proxies = fetch_proxy_list(client, url).await?;
            let mut rng = rand::rng();
            proxies.choose(&mut rng).cloned()
        }
        ProxySource::Table => store.random_proxy().await?,
    };

    match proxy {
        Some(proxy) => {
            info!("Using proxy: {}", proxy.address);
            Ok(proxy)
        }
        None => {
            warn!("Proxy source {:?} returned no entries", source);
            bail!("No proxy available")
        }
    }
}

/// Replaces the stored proxy set with the remote list.
pub async fn refresh_proxies(
    client: &reqwest::Client,
    url: &str,
    store: &dyn HarvestStore,
) -> Result<usize> {
    let proxies = fetch_proxy_list(client, url).await?;
    if proxies.is_empty() {
        bail!("Proxy list at {} is empty; keeping the current table", url);
    }
    store.replace_proxies(&proxies).await?;
    Ok(proxies.len())
}
