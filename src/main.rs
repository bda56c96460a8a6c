//! Papers with Code harvester
//!
//! Batch worker with one mode per invocation:
//!     pwc_harvester scrape-papers-with-code-tasks
//!     pwc_harvester scrape-papers-with-code-papers [TASK_URL]
//!     pwc_harvester refresh-proxies

use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pwc_harvester::config::{Deadline, Settings, DEFAULT_TIME_BUDGET_SECS};
use pwc_harvester::papers::{PaperWalker, WalkOptions};
use pwc_harvester::proxy::{refresh_proxies, select_proxy, ProxySource};
use pwc_harvester::session::{download_client, BrowserSession};
use pwc_harvester::sink::{ArtifactSink, FsArtifactStore};
use pwc_harvester::store::{HarvestStore, MemoryStore, PgStore};
use pwc_harvester::taxonomy::TaxonomyWalker;
use pwc_harvester::DEFAULT_BASE_URL;

#[derive(Parser, Debug)]
#[command(author, version, about = "Harvest Papers with Code tasks and paper PDFs", long_about = None)]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Verbose output
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Walk the SOTA taxonomy and upsert task paper counts
    #[command(name = "scrape-papers-with-code-tasks")]
    Tasks {
        #[command(flatten)]
        scrape: ScrapeArgs,
    },

    /// Walk task listings and store paper PDFs with their metadata
    #[command(name = "scrape-papers-with-code-papers")]
    Papers {
        /// Only process this task URL
        task: Option<String>,

        #[command(flatten)]
        scrape: ScrapeArgs,

        /// Stop after this many seconds (checked between papers)
        #[arg(long, default_value_t = DEFAULT_TIME_BUDGET_SECS)]
        time_budget_secs: u64,

        /// Maximum number of tasks to walk (0 = all)
        #[arg(short, long, default_value_t = 0)]
        max_tasks: usize,

        /// Skip papers already recorded in the ingested-papers table
        #[arg(long, default_value_t = false)]
        skip_ingested: bool,

        /// PDF downloads in flight at once
        #[arg(long, default_value_t = 4)]
        upload_concurrency: usize,
    },

    /// Replace the proxies table with the list at PROXY_LIST_URL
    #[command(name = "refresh-proxies")]
    RefreshProxies,
}

#[derive(ClapArgs, Debug)]
struct ScrapeArgs {
    /// Site root to scrape
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Delay between page requests in milliseconds
    #[arg(short, long, default_value_t = 0)]
    delay_ms: u64,

    /// Pick the proxy from the proxies table instead of PROXY_LIST_URL
    #[arg(long, default_value_t = false)]
    proxy_from_table: bool,

    /// Dry run - don't write to database
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

async fn open_store(settings: &Settings, dry_run: bool) -> Result<Box<dyn HarvestStore>> {
    if dry_run {
        warn!("DRY RUN MODE - No database writes will occur");
        return Ok(Box::new(MemoryStore::default()));
    }
    let store = PgStore::connect(settings.require_database_url()?).await?;
    Ok(Box::new(store))
}

fn proxy_source(settings: &Settings, from_table: bool) -> Result<ProxySource> {
    if from_table {
        Ok(ProxySource::Table)
    } else {
        Ok(ProxySource::Remote(settings.require_proxy_list_url()?.to_string()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings::from_env();
    let client = download_client()?;

    match args.mode {
        Mode::Tasks { scrape } => {
            info!("Scraping Papers with Code tasks...");
            let source = proxy_source(&settings, scrape.proxy_from_table)?;
            let store = open_store(&settings, scrape.dry_run).await?;

            let proxy = select_proxy(&source, &client, store.as_ref()).await?;
            let session = BrowserSession::launch(&proxy, scrape.delay_ms)?;

            let mut walker = TaxonomyWalker::new(&session, store.as_ref(), &scrape.base_url);
            walker.run().await?;
            walker.print_stats();
            info!("Tasks updated successfully.");
        }
        Mode::Papers {
            task,
            scrape,
            time_budget_secs,
            max_tasks,
            skip_ingested,
            upload_concurrency,
        } => {
            let deadline = Deadline::from_secs(time_budget_secs);
            info!(
                "Scraping Papers with Code papers for task: {}",
                task.as_deref().unwrap_or("all tasks")
            );
            let source = proxy_source(&settings, scrape.proxy_from_table)?;
            let store = open_store(&settings, scrape.dry_run).await?;
            let tasks = store.load_task_counts().await?;

            let artifacts = FsArtifactStore::open(&settings.artifact_dir).await?;
            info!("Storing artifacts in {:?}", settings.artifact_dir);
            let sink = ArtifactSink::new(Arc::new(artifacts), client.clone(), upload_concurrency);

            let proxy = select_proxy(&source, &client, store.as_ref()).await?;
            let session = BrowserSession::launch(&proxy, scrape.delay_ms)?;

            let options = WalkOptions {
                target_task: task,
                max_tasks,
                skip_ingested,
            };
            let mut walker = PaperWalker::new(&session, store.as_ref(), &sink, deadline, options);
            let count = walker.run(&tasks).await?;
            walker.print_stats();
            info!("Papers processed: {}", count);
        }
        Mode::RefreshProxies => {
            let url = settings.require_proxy_list_url()?;
            let store = PgStore::connect(settings.require_database_url()?).await?;
            let count = refresh_proxies(&client, url, &store).await?;
            info!("Proxy table refreshed with {} entries", count);
        }
    }

    Ok(())
}
