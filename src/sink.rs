//! Idempotent PDF persistence keyed by paper origin.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::PaperMetadata;

/// Object name for a paper: hash of its origin URL, so re-listing never re-downloads.
pub fn artifact_key(origin: &str) -> String {
    let digest = Sha256::digest(origin.as_bytes());
    format!("{}.pdf", URL_SAFE_NO_PAD.encode(digest))
}

/// Custom metadata attached to a stored PDF. List fields are JSON-encoded strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    pub title: String,
    pub origin: String,
    pub tasks: String,
    pub datasets: String,
    pub methods: String,
    pub results: String,
    pub stored_at: String,
}

impl ArtifactMetadata {
    pub fn from_paper(metadata: &PaperMetadata) -> Result<Self> {
        Ok(Self {
            title: metadata.title.clone(),
            origin: metadata.origin.clone(),
            tasks: serde_json::to_string(&metadata.tasks)?,
            datasets: serde_json::to_string(&metadata.datasets)?,
            methods: serde_json::to_string(&metadata.methods)?,
            results: serde_json::to_string(&metadata.results)?,
            stored_at: Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn put(&self, key: &str, content: &[u8], metadata: &ArtifactMetadata) -> Result<()>;
}

/// Stores artifacts as files under a root directory, with a JSON side-car per key.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create artifact directory at {:?}", root))?;
        Ok(Self { root })
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn metadata_path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.metadata.json", key))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .with_context(|| format!("Failed to check artifact {}", key))
    }

    async fn put(&self, key: &str, content: &[u8], metadata: &ArtifactMetadata) -> Result<()> {
        let sidecar = serde_json::to_vec_pretty(metadata)?;
        tokio::fs::write(self.metadata_path_for(key), sidecar)
            .await
            .with_context(|| format!("Failed to write metadata for {}", key))?;

        // The PDF lands last and atomically; its presence is what `exists` checks.
        let staging = self.root.join(format!(".{}.partial", key));
        tokio::fs::write(&staging, content)
            .await
            .with_context(|| format!("Failed to write {}", key))?;
        tokio::fs::rename(&staging, self.path_for(key))
            .await
            .with_context(|| format!("Failed to finalize {}", key))?;
        Ok(())
    }
}

/// A paper whose PDF should be stored.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub key: String,
    pub pdf_url: String,
    pub metadata: PaperMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Stored,
    FetchFailed,
    WriteFailed,
}

pub struct ArtifactSink {
    store: Arc<dyn ArtifactStore>,
    client: reqwest::Client,
    concurrency: usize,
}

impl ArtifactSink {
    pub fn new(store: Arc<dyn ArtifactStore>, client: reqwest::Client, concurrency: usize) -> Self {
        Self {
            store,
            client,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.store.exists(key).await
    }

    /// Runs every job with bounded concurrency and waits for all of them. Outcomes are
    /// returned in job order.
    pub async fn persist_all(&self, jobs: Vec<UploadJob>) -> Vec<(UploadJob, UploadOutcome)> {
        let mut finished: Vec<(usize, UploadJob, UploadOutcome)> =
            stream::iter(jobs.into_iter().enumerate())
                .map(|(index, job)| async move {
                    let outcome = self.persist(&job).await;
                    (index, job, outcome)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

        finished.sort_by_key(|(index, _, _)| *index);
        finished
            .into_iter()
            .map(|(_, job, outcome)| (job, outcome))
            .collect()
    }

    /// Downloads one PDF and stores it. Failures are logged, never retried.
    pub async fn persist(&self, job: &UploadJob) -> UploadOutcome {
        let content = match self.download(&job.pdf_url).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: {:#}", job.metadata.origin, e);
                return UploadOutcome::FetchFailed;
            }
        };

        let stored = async {
            let metadata = ArtifactMetadata::from_paper(&job.metadata)?;
            self.store.put(&job.key, &content, &metadata).await
        }
        .await;

        match stored {
            Ok(()) => {
                debug!("Stored {} ({} bytes) as {}", job.pdf_url, content.len(), job.key);
                UploadOutcome::Stored
            }
            Err(e) => {
                warn!("Error storing file {}: {:#}", job.key, e);
                UploadOutcome::WriteFailed
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read {}", url))?;
        Ok(bytes.to_vec())
    }
}
