//! Persisting fetch history across crawls
//!
//! Three processors share one notion of what gets stored: the persistent
//! keys of a URI, projected out of its record, under the URI's persistence
//! key.
//!
//! - [`PersistStoreProcessor`] writes straight to a [`HistoryStore`]
//! - [`PersistLogProcessor`] appends `<key> <record>` lines to a journal,
//!   for later import into a store
//! - [`PersistLoadProcessor`] merges previously stored history into a live
//!   URI, never overwriting what the URI already carries
//!
//! [`preload`] seeds a store from a journal (file or URL) or from the store
//! environment of an earlier crawl.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::JournalConfig;
use crate::crawler::url::persist_key_for;
use crate::metrics;
use crate::models::{CrawlUri, PersistentKeys};
use crate::record::keys::A_FETCH_HISTORY;
use crate::record::AttributeRecord;
use crate::storage::checkpoint::Checkpointable;
use crate::storage::history_store::{HistoryStore, SqliteHistoryStore, StoreResult};
use crate::storage::journal::{self, CrawlerJournal, JournalEntry, JournalReader};

/// Whether a URI's history is worth persisting
///
/// The default gate: the fetch produced a response and left a fetch history
/// behind. Processors accept a replacement through `with_gate`.
pub fn should_store(curi: &CrawlUri) -> bool {
    curi.is_success() && curi.attributes.contains_key(A_FETCH_HISTORY)
}

/// Per-URI decision whether its history is persisted
pub type StoreGate = Box<dyn Fn(&CrawlUri) -> bool + Send + Sync>;

/// Format one journal line: `<persist-key> <json record>`
pub fn format_log_line(key: &str, record: &AttributeRecord) -> serde_json::Result<String> {
    Ok(format!("{key} {}", serde_json::to_string(record)?))
}

/// Split a journal data line back into key and record
pub fn parse_log_line(line: &str) -> Option<(&str, serde_json::Result<AttributeRecord>)> {
    let (key, json) = line.split_once(' ')?;
    if key.is_empty() {
        return None;
    }
    Some((key, serde_json::from_str(json)))
}

// ============================================================================
// Processors
// ============================================================================

/// Writes the persistent part of each storable URI into a history store
pub struct PersistStoreProcessor {
    store: Arc<dyn HistoryStore>,
    keys: PersistentKeys,
    gate: StoreGate,
}

impl PersistStoreProcessor {
    pub fn new(store: Arc<dyn HistoryStore>, keys: PersistentKeys) -> Self {
        Self {
            store,
            keys,
            gate: Box::new(should_store),
        }
    }

    /// Replace the default [`should_store`] gate
    pub fn with_gate(mut self, gate: impl Fn(&CrawlUri) -> bool + Send + Sync + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Store the URI's history; returns whether anything was written
    pub fn process(&self, curi: &CrawlUri) -> StoreResult<bool> {
        if !(self.gate)(curi) {
            return Ok(false);
        }
        let key = persist_key_for(&curi.uri);
        self.store.put(&key, &curi.persistent_record(&self.keys))?;
        metrics::record_store_write();
        tracing::trace!(key = %key, "History stored");
        Ok(true)
    }
}

/// Appends the persistent part of each storable URI to a journal
pub struct PersistLogProcessor {
    journal: CrawlerJournal,
    keys: PersistentKeys,
    gate: StoreGate,
}

impl PersistLogProcessor {
    pub fn new(journal: CrawlerJournal, keys: PersistentKeys) -> Self {
        Self {
            journal,
            keys,
            gate: Box::new(should_store),
        }
    }

    /// Replace the default [`should_store`] gate
    pub fn with_gate(mut self, gate: impl Fn(&CrawlUri) -> bool + Send + Sync + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Create the journal at `path` and wrap it
    pub fn create(
        path: impl AsRef<Path>,
        timestamp_interval: u64,
        keys: PersistentKeys,
    ) -> crate::Result<Self> {
        Ok(Self::new(
            CrawlerJournal::create(path, timestamp_interval)?,
            keys,
        ))
    }

    /// Create the journal described by the `[journal]` configuration section
    pub fn from_config(config: &JournalConfig, keys: PersistentKeys) -> crate::Result<Self> {
        Self::create(&config.path, config.timestamp_interval, keys)
    }

    pub fn journal(&self) -> &CrawlerJournal {
        &self.journal
    }

    /// Log the URI's history; returns whether a line was written
    ///
    /// Records that cannot be serialized are logged and skipped.
    pub fn process(&self, curi: &CrawlUri) -> bool {
        if !(self.gate)(curi) {
            return false;
        }
        let key = persist_key_for(&curi.uri);
        match format_log_line(&key, &curi.persistent_record(&self.keys)) {
            Ok(line) => {
                self.journal.write_line(&[&line]);
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "History record not serializable");
                false
            }
        }
    }

    pub fn close(&self) {
        self.journal.close();
    }
}

impl Checkpointable for PersistLogProcessor {
    fn checkpoint_name(&self) -> String {
        self.journal.checkpoint_name()
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> crate::Result<()> {
        self.journal.checkpoint(checkpoint_dir)
    }
}

/// Merges stored history into URIs about to be processed
pub struct PersistLoadProcessor {
    store: Arc<dyn HistoryStore>,
}

impl PersistLoadProcessor {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Merge stored history into `curi`; returns whether a record was found
    ///
    /// Keys the URI already carries win over stored ones.
    pub fn process(&self, curi: &mut CrawlUri) -> StoreResult<bool> {
        let key = persist_key_for(&curi.uri);
        let Some(prior) = self.store.get(&key)? else {
            return Ok(false);
        };
        curi.attributes.merge_missing_from(&prior);
        metrics::record_store_hit();
        tracing::trace!(key = %key, "Prior history loaded");
        Ok(true)
    }
}

// ============================================================================
// Preloading
// ============================================================================

/// Where previously persisted history comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadSource {
    /// Journal file written by [`PersistLogProcessor`] (gzip or plain)
    Journal(PathBuf),
    /// Journal served over HTTP(S)
    Url(String),
    /// Store environment directory of an earlier crawl
    Environment(PathBuf),
}

impl PreloadSource {
    /// Classify a source string: URL, existing directory, or journal file
    pub fn parse(source: &str) -> Self {
        if journal::is_url(source) {
            Self::Url(source.to_string())
        } else if Path::new(source).is_dir() {
            Self::Environment(PathBuf::from(source))
        } else {
            Self::Journal(PathBuf::from(source))
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Journal(path) | Self::Environment(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Copy every record from `source` into `store`, returning the count loaded
///
/// Best effort: unreadable sources, malformed lines and failed writes are
/// logged and skipped, so a partial load is possible.
pub fn preload(store: &dyn HistoryStore, source: &PreloadSource) -> usize {
    let described = source.describe();
    tracing::info!(source = %described, "Preloading fetch history");

    let loaded = match source {
        PreloadSource::Journal(path) => match journal::open_reader(path) {
            Ok(reader) => preload_journal(store, reader),
            Err(e) => {
                tracing::error!(source = %described, error = %e, "Cannot open preload journal");
                0
            }
        },
        PreloadSource::Url(url) => match journal::open_url_reader(url) {
            Ok(reader) => preload_journal(store, reader),
            Err(e) => {
                tracing::error!(source = %described, error = %e, "Cannot fetch preload journal");
                0
            }
        },
        PreloadSource::Environment(dir) => preload_environment(store, dir),
    };

    metrics::record_preloaded(loaded);
    tracing::info!(source = %described, loaded, "Preload finished");
    loaded
}

fn preload_journal<R: BufRead>(store: &dyn HistoryStore, reader: R) -> usize {
    let mut loaded = 0;
    for (index, entry) in JournalReader::new(reader).enumerate() {
        let line = match entry {
            Ok(JournalEntry::Data(line)) => line,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "Preload journal truncated");
                break;
            }
        };
        match parse_log_line(&line) {
            Some((key, Ok(record))) => match store.put(key, &record) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(key, error = %e, "Preload write failed"),
            },
            Some((key, Err(e))) => {
                tracing::warn!(key, entry = index, error = %e, "Undecodable preload record")
            }
            None => tracing::warn!(entry = index, "Malformed preload line"),
        }
    }
    loaded
}

fn preload_environment(store: &dyn HistoryStore, dir: &Path) -> usize {
    let prior = match SqliteHistoryStore::open_existing(dir) {
        Ok(prior) => prior,
        Err(e) => {
            tracing::error!(path = %dir.display(), error = %e, "Cannot open prior store");
            return 0;
        }
    };

    let mut loaded = 0;
    let scanned = prior.scan(&mut |key, record| match store.put(key, &record) {
        Ok(()) => loaded += 1,
        Err(e) => tracing::warn!(key, error = %e, "Preload write failed"),
    });
    if let Err(e) = scanned {
        tracing::warn!(path = %dir.display(), error = %e, "Prior store scan aborted");
    }
    if let Err(e) = prior.close() {
        tracing::warn!(path = %dir.display(), error = %e, "Prior store close failed");
    }
    loaded
}
