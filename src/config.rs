//! Environment-driven settings shared by every mode.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// 23 hours and 55 minutes, just inside a one-day job timeout.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 86_100;

const DEFAULT_ARTIFACT_DIR: &str = "./data/papers";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: Option<String>,
    pub proxy_list_url: Option<String>,
    pub artifact_dir: PathBuf,
}

impl Settings {
    /// Reads settings from the process environment. Call `dotenvy::dotenv()` first to
    /// pick up a local `.env` file.
    pub fn from_env() -> Self {
        let database_url = env::var("POSTGRES_URI")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok();
        let proxy_list_url = env::var("PROXY_LIST_URL").ok().filter(|v| !v.trim().is_empty());
        let artifact_dir = env::var("ARTIFACT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ARTIFACT_DIR));

        Self {
            database_url,
            proxy_list_url,
            artifact_dir,
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("POSTGRES_URI or DATABASE_URL must be set")
    }

    pub fn require_proxy_list_url(&self) -> Result<&str> {
        self.proxy_list_url
            .as_deref()
            .context("PROXY_LIST_URL must be set")
    }
}

/// Wall-clock allowance for a run, measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: std::time::Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self {
            started: std::time::Instant::now(),
            budget,
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }
}
