use thiserror::Error;

/// Failure to load a page or file through a session.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no page available at {0}")]
    Missing(String),
    #[error("session closed before fetching {0}")]
    Closed(String),
}

