//! Page parsers: each turns one HTML document into typed records.
//!
//! Parsers never touch the network. Relative links are resolved against the URL the
//! document was loaded from.

pub mod leaderboard;
pub mod listing;
pub mod paper;
pub mod taxonomy;

use scraper::{ElementRef, Selector};
use url::Url;

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("Invalid selector")
}

/// Visible text of an element with runs of whitespace collapsed.
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Absolute form of `href` as a browser would report it.
pub(crate) fn absolute_url(page_url: &str, href: &str) -> String {
    match Url::parse(page_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Absolute `href` of the first anchor inside `element`.
pub(crate) fn first_link(element: ElementRef<'_>, page_url: &str) -> Option<String> {
    let anchor = selector("a");
    element
        .select(&anchor)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(|href| absolute_url(page_url, href))
}
