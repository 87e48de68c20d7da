//! Test fixtures for integration tests
//!
//! Provides sample crawl setups and helper functions

use chrono::{DateTime, TimeZone, Utc};

use recrawl::history::{content_digest, FetchHistoryTracker};
use recrawl::models::{CrawlUri, FetchOutcome, ResponseMetadata};

/// Page bodies served on the first and second crawl
pub const PAGE_V1: &[u8] = b"<html><body>Hello</body></html>";
pub const PAGE_V2: &[u8] = b"<html><body>Hello again</body></html>";

/// Seeds shared by both crawls
pub const SEEDS: &[&str] = &[
    "http://example.com/",
    "http://example.com/news",
    "http://www.example.org/",
];

/// Start of crawl number `crawl`
pub fn crawl_start(crawl: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1 + crawl, 0, 0, 0).unwrap()
}

/// What a fetch engine reports after fetching `body`
pub fn outcome_for(body: &[u8], crawl: u32) -> FetchOutcome {
    let response = ResponseMetadata::new()
        .with_header("ETag", format!("\"v{crawl}\""))
        .with_header("Last-Modified", "Mon, 01 Jan 2024 00:00:00 GMT");
    FetchOutcome::new(200, crawl_start(crawl))
        .with_digest(content_digest(body))
        .with_response(response)
        .with_content_length(body.len() as i64)
}

/// Simulate a successful fetch of `curi`
pub fn simulate_fetch(tracker: &FetchHistoryTracker, curi: &mut CrawlUri, body: &[u8], crawl: u32) {
    curi.fetch_status = 200;
    tracker.record_fetch(curi, &outcome_for(body, crawl));
}
