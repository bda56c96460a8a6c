use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod pages;
pub mod papers;
pub mod proxy;
pub mod session;
pub mod sink;
pub mod store;
pub mod taxonomy;

pub use error::FetchError;

/// Site root used when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://paperswithcode.com";

// ============================================================================
// Scraped Records
// ============================================================================

/// A task page and the number of papers it reported when last observed.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskCount {
    pub url: String,
    pub count: u32,
}

/// A paper card found on a task listing page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PaperRef {
    pub origin: String,
    pub title: String,
}

/// One row of a paper's evaluation table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub task: String,
    pub dataset: String,
    pub model: String,
    pub metric: String,
    pub value: String,
    pub rank: Option<u32>,
}

/// Everything extracted from a paper detail page.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PaperMetadata {
    pub title: String,
    pub origin: String,
    pub tasks: Vec<String>,
    pub datasets: Vec<String>,
    pub methods: Vec<String>,
    pub results: Vec<LeaderboardRow>,
}

/// An authenticated exit node.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
    #[sqlx(rename = "ip")]
    pub address: String,
    pub username: String,
    pub password: String,
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Parses the integer left after removing every non-digit character.
///
/// `"1,234 papers"` becomes `1234`. Missing fragments, fragments without digits and
/// values that overflow `u32` all yield `None`.
pub fn parse_digits(text: &str) -> Option<u32> {
    static NON_DIGITS: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"[^0-9]").expect("Invalid regex"));

    let digits = NON_DIGITS.replace_all(text, "");
    digits.parse().ok()
}

/// Paper count shown on a task card. Defaults to 0 when absent or unparsable.
pub fn parse_count(text: Option<&str>) -> u32 {
    text.and_then(parse_digits).unwrap_or(0)
}

/// Number of listing pages worth visiting for a task: `min(ceil(count / 10), 20)`.
pub fn page_budget(count: u32) -> u32 {
    count.div_ceil(10).min(20)
}
