//! Per-URI fetch history
//!
//! Every completed fetch becomes a history entry at index 0 of a fixed-length
//! rotating array kept under [`A_FETCH_HISTORY`] in the URI's record. Older
//! entries shift one slot right; the last one falls off.
//!
//! ```text
//! before: [ f2 | f1 | -- ]    after fetch f3: [ f3 | f2 | f1 ]
//! ```

use sha2::{Digest, Sha256};

use crate::config::HistoryConfig;
use crate::metrics;
use crate::models::{CrawlUri, FetchOutcome, PersistentKeys};
use crate::record::keys::{
    A_CONTENT_DIGEST, A_ETAG_HEADER, A_FETCH_BEGAN_TIME, A_FETCH_HISTORY, A_LAST_MODIFIED_HEADER,
    A_REFERENCE_LENGTH, A_STATUS,
};
use crate::record::{AttributeRecord, Value};

/// Default number of retained history entries (current fetch included)
pub const DEFAULT_HISTORY_LENGTH: usize = 2;

/// Maintains the rotating fetch history of each processed URI
#[derive(Debug, Clone)]
pub struct FetchHistoryTracker {
    history_length: usize,
}

impl FetchHistoryTracker {
    /// Create a tracker retaining `history_length` entries
    ///
    /// The current fetch occupies one slot, so 2 is the smallest length
    /// that lets rules compare against a previous fetch. A length of 0 is
    /// raised to 1.
    pub fn new(history_length: usize) -> Self {
        Self {
            history_length: history_length.max(1),
        }
    }

    /// Tracker sized by the `[history]` configuration section
    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.history_length)
    }

    pub fn history_length(&self) -> usize {
        self.history_length
    }

    /// Keys this tracker needs carried across requeues and recrawls
    pub fn persistent_keys(&self) -> PersistentKeys {
        PersistentKeys::new().with(A_FETCH_HISTORY)
    }

    /// Record a completed fetch into the URI's history
    pub fn record_fetch(&self, curi: &mut CrawlUri, outcome: &FetchOutcome) {
        let entry = build_entry(&curi.attributes, outcome);
        self.push_entry(&mut curi.attributes, entry);

        tracing::trace!(
            uri = %curi.uri,
            status = outcome.status,
            "Fetch history updated"
        );
        metrics::record_history_entry();
    }

    /// Insert `entry` at index 0 of the record's history array
    pub fn push_entry(&self, record: &mut AttributeRecord, entry: AttributeRecord) {
        let mut history = match record.remove(A_FETCH_HISTORY) {
            Some(Value::RecordArray(slots)) => slots,
            _ => Vec::new(),
        };
        history.resize(self.history_length, None);

        // rotate all entries up one slot, insert new at [0]
        history.rotate_right(1);
        history[0] = Some(entry);

        record.put_record_array(A_FETCH_HISTORY, history);
    }
}

impl Default for FetchHistoryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LENGTH)
    }
}

fn build_entry(attributes: &AttributeRecord, outcome: &FetchOutcome) -> AttributeRecord {
    let mut entry = AttributeRecord::new();
    entry.put_int(A_STATUS, outcome.status);
    entry.put_date(A_FETCH_BEGAN_TIME, outcome.fetch_began);
    if let Some(digest) = &outcome.content_digest {
        entry.put_string(A_CONTENT_DIGEST, digest.clone());
    }

    if let Some(response) = &outcome.response {
        if let Some(etag) = response.header(A_ETAG_HEADER) {
            entry.put_string(A_ETAG_HEADER, etag);
        }
        if let Some(last_modified) = response.header(A_LAST_MODIFIED_HEADER) {
            entry.put_string(A_LAST_MODIFIED_HEADER, last_modified);
        }
        // a length carried over from an earlier fetch wins over this one's
        let reference_length = attributes
            .get_long(A_REFERENCE_LENGTH)
            .ok()
            .or(outcome.content_length);
        if let Some(length) = reference_length {
            entry.put_long(A_REFERENCE_LENGTH, length);
        }
    }
    entry
}

/// Scheme-prefixed SHA-256 digest of fetched content
///
/// # Examples
///
/// ```
/// let digest = recrawl::history::content_digest(b"");
/// assert!(digest.starts_with("sha256:e3b0c442"));
/// ```
pub fn content_digest(content: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(content))
}
