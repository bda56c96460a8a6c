//! Evaluation tables on paper pages.
//!
//! The site visually merges the task, dataset and model columns across consecutive
//! rows, so later rows arrive with fewer leading cells. Trailing cells beyond the six
//! core columns are trimmed by a width fixed on the first data row, then the core cells
//! are read right to left. Missing task/dataset/model cells take the last value seen in
//! the same table.

use scraper::{ElementRef, Html};
use tracing::debug;

use super::{element_text, selector};
use crate::{parse_digits, LeaderboardRow};

/// Task, dataset, model, metric, value, rank.
pub const CORE_COLUMNS: usize = 6;

/// Why a row produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSkip {
    /// Fewer than the three always-present cells (metric, value, rank).
    TooShort,
    /// Task, dataset or model unresolved even after carry-forward.
    Unresolved,
}

/// Per-table parsing state. Create one per table and feed it rows in order.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    overflow: Option<usize>,
    last_task: Option<String>,
    last_dataset: Option<String>,
    last_model: Option<String>,
}

impl TableState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trailing cells discarded per row, once a row has fixed it.
    pub fn overflow(&self) -> Option<usize> {
        self.overflow
    }

    /// Resolves one data row given its cell texts, left to right.
    pub fn resolve(&mut self, mut cells: Vec<String>) -> Result<LeaderboardRow, RowSkip> {
        let overflow = *self
            .overflow
            .get_or_insert_with(|| cells.len().saturating_sub(CORE_COLUMNS));
        cells.truncate(cells.len().saturating_sub(overflow));

        let (Some(rank), Some(value), Some(metric)) = (cells.pop(), cells.pop(), cells.pop())
        else {
            return Err(RowSkip::TooShort);
        };
        let model = carry(&mut self.last_model, cells.pop());
        let dataset = carry(&mut self.last_dataset, cells.pop());
        let task = carry(&mut self.last_task, cells.pop());

        match (task, dataset, model) {
            (Some(task), Some(dataset), Some(model)) => Ok(LeaderboardRow {
                task,
                dataset,
                model,
                metric,
                value,
                rank: parse_digits(&rank),
            }),
            _ => Err(RowSkip::Unresolved),
        }
    }
}

/// Refreshes `last` with a non-empty cell, or falls back to it.
fn carry(last: &mut Option<String>, cell: Option<String>) -> Option<String> {
    match cell.filter(|value| !value.is_empty()) {
        Some(value) => {
            *last = Some(value.clone());
            Some(value)
        }
        None => last.clone(),
    }
}

/// Parses the rows of one evaluation table element. The first `tr` is the header.
pub fn parse_table(table: ElementRef<'_>, page_url: &str) -> Vec<LeaderboardRow> {
    let row_selector = selector("tr");
    let cell_selector = selector("td");

    let mut state = TableState::new();
    let mut results = Vec::new();
    for (index, row) in table.select(&row_selector).enumerate().skip(1) {
        let cells: Vec<String> = row.select(&cell_selector).map(element_text).collect();
        match state.resolve(cells) {
            Ok(result) => results.push(result),
            Err(RowSkip::TooShort) => {
                debug!("Too few cells for {} at row {}", page_url, index);
            }
            Err(RowSkip::Unresolved) => {
                debug!("Missing task, dataset or model for {} at row {}", page_url, index);
            }
        }
    }
    results
}

/// Leaderboard rows under the `#evaluation` section of a paper page. Each table gets its
/// own state, so overflow and carried names never cross a table boundary.
pub fn parse_evaluation(document: &Html, page_url: &str) -> Vec<LeaderboardRow> {
    document
        .select(&selector("#evaluation table"))
        .flat_map(|table| parse_table(table, page_url))
        .collect()
}
