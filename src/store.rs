//! Bookkeeping state: task counts, proxies and already-ingested paper origins.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

use crate::ProxyRecord;

/// Task URL to last observed paper count, ordered by URL.
pub type TaskCounts = BTreeMap<String, u32>;

#[async_trait]
pub trait HarvestStore: Send + Sync {
    async fn load_task_counts(&self) -> Result<TaskCounts>;

    /// Inserts the task or overwrites its count.
    async fn upsert_task_count(&self, url: &str, count: u32) -> Result<()>;

    async fn random_proxy(&self) -> Result<Option<ProxyRecord>>;

    /// Swaps the whole proxy set in one unit.
    async fn replace_proxies(&self, proxies: &[ProxyRecord]) -> Result<()>;

    async fn is_ingested(&self, origin: &str) -> Result<bool>;

    async fn mark_ingested(&self, origin: &str, filename: &str, pdf_url: &str) -> Result<()>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS papers_with_code_tasks (
        url TEXT PRIMARY KEY,
        count INTEGER NOT NULL DEFAULT 0,
        updated_at TIMESTAMP DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS proxies (
        ip TEXT PRIMARY KEY,
        username TEXT NOT NULL,
        password TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS papers_with_code_papers (
        origin TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        pdf_url TEXT NOT NULL,
        ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        info!("Connected to database");

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create table")?;
        }
        Ok(())
    }
}

#[async_trait]
impl HarvestStore for PgStore {
    async fn load_task_counts(&self) -> Result<TaskCounts> {
        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT url, count FROM papers_with_code_tasks")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load tasks")?;

        Ok(rows
            .into_iter()
            .map(|(url, count)| (url, u32::try_from(count).unwrap_or(0)))
            .collect())
    }

    async fn upsert_task_count(&self, url: &str, count: u32) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO papers_with_code_tasks (url, count)
            VALUES ($1, $2)
            ON CONFLICT (url) DO UPDATE
            SET count = EXCLUDED.count, updated_at = NOW()
            "#,
        )
        .bind(url)
        .bind(i32::try_from(count).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert task {}", url))?;

        Ok(())
    }

    async fn random_proxy(&self) -> Result<Option<ProxyRecord>> {
        sqlx::query_as::<_, ProxyRecord>(
            "SELECT ip, username, password FROM proxies ORDER BY RANDOM() LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to select proxy")
    }

    async fn replace_proxies(&self, proxies: &[ProxyRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to start transaction")?;

        sqlx::query("DELETE FROM proxies")
            .execute(&mut *tx)
            .await
            .context("Failed to clear proxies")?;

        for proxy in proxies {
            sqlx::query(
                "INSERT INTO proxies (ip, username, password) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
            )
            .bind(&proxy.address)
            .bind(&proxy.username)
            .bind(&proxy.password)
            .execute(&mut *tx)
            .await
            .context("Failed to insert proxy")?;
        }

        tx.commit().await.context("Failed to commit proxy refresh")?;
        Ok(())
    }

    async fn is_ingested(&self, origin: &str) -> Result<bool> {
        let row: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM papers_with_code_papers WHERE origin = $1")
                .bind(origin)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to look up paper origin")?;
        Ok(row.is_some())
    }

    async fn mark_ingested(&self, origin: &str, filename: &str, pdf_url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO papers_with_code_papers (origin, filename, pdf_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (origin) DO NOTHING
            "#,
        )
        .bind(origin)
        .bind(filename)
        .bind(pdf_url)
        .execute(&self.pool)
        .await
        .context("Failed to record ingested paper")?;
        Ok(())
    }
}

// ============================================================================
// In-memory (dry runs and tests)
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<TaskCounts>,
    proxies: Mutex<Vec<ProxyRecord>>,
    ingested: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn with_tasks(tasks: TaskCounts) -> Self {
        Self {
            tasks: Mutex::new(tasks),
            ..Self::default()
        }
    }

    pub fn task_counts(&self) -> TaskCounts {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn ingested_count(&self) -> usize {
        self.ingested.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl HarvestStore for MemoryStore {
    async fn load_task_counts(&self) -> Result<TaskCounts> {
        Ok(self.task_counts())
    }

    async fn upsert_task_count(&self, url: &str, count: u32) -> Result<()> {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), count);
        Ok(())
    }

    async fn random_proxy(&self) -> Result<Option<ProxyRecord>> {
        use rand::seq::IndexedRandom;

        let proxies = self.proxies.lock().unwrap_or_else(|e| e.into_inner());
        let mut rng = rand::rng();
        Ok(proxies.choose(&mut rng).cloned())
    }

    async fn replace_proxies(&self, proxies: &[ProxyRecord]) -> Result<()> {
        *self.proxies.lock().unwrap_or_else(|e| e.into_inner()) = proxies.to_vec();
        Ok(())
    }

    async fn is_ingested(&self, origin: &str) -> Result<bool> {
        Ok(self
            .ingested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(origin))
    }

    async fn mark_ingested(&self, origin: &str, _filename: &str, _pdf_url: &str) -> Result<()> {
        self.ingested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(origin.to_string());
        Ok(())
    }
}
