//! Common test utilities

use chrono::{DateTime, TimeZone, Utc};
use recrawl::history::FetchHistoryTracker;
use recrawl::models::{CrawlUri, FetchOutcome};

/// Fixed fetch time `n` hours into 2024
pub fn fetch_time(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(i64::from(n))
}

/// Apply one successful fetch with `digest` to `curi`
pub fn fetch(tracker: &FetchHistoryTracker, curi: &mut CrawlUri, n: u32, digest: &str) {
    curi.fetch_status = 200;
    let outcome = FetchOutcome::new(200, fetch_time(n)).with_digest(digest);
    tracker.record_fetch(curi, &outcome);
}

/// A URI fetched once with the given digest
#[allow(dead_code)]
pub fn fetched_uri(uri: &str, digest: &str) -> CrawlUri {
    let tracker = FetchHistoryTracker::default();
    let mut curi = CrawlUri::new(uri);
    fetch(&tracker, &mut curi, 0, digest);
    curi
}
