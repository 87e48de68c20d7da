//! recrawl - fetch-history persistence and crawl mapping
//!
//! The recrawl subsystem of a large-scale web crawler: it remembers what was
//! seen on earlier fetches of each URI so later crawls can skip unchanged
//! content, and it partitions URIs across cooperating crawler nodes.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`record`] - Strongly-typed attribute records attached to each URI
//! - [`models`] - Crawl URIs, fetch outcomes and persistent key lists
//! - [`history`] - Rolling per-URI fetch history
//! - [`decide`] - Decide rules, including the identical-digest predicate
//! - [`storage`] - History store, gzip journal, persist processors and checkpoints
//! - [`partition`] - Hash and lexical crawl mappers with diversion logs
//! - [`crawler`] - Class keys and SURT forms supplied by the crawl engine
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus counters
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use recrawl::history::FetchHistoryTracker;
//! use recrawl::models::{CrawlUri, FetchOutcome};
//! use recrawl::storage::{PersistStoreProcessor, SqliteHistoryStore};
//! use std::sync::Arc;
//!
//! fn main() -> recrawl::Result<()> {
//!     let store = Arc::new(SqliteHistoryStore::open("state/history")?);
//!     let tracker = FetchHistoryTracker::default();
//!     let persist = PersistStoreProcessor::new(store, tracker.persistent_keys());
//!
//!     let mut curi = CrawlUri::new("http://example.com/");
//!     curi.fetch_status = 200;
//!     tracker.record_fetch(&mut curi, &FetchOutcome::new(200, Utc::now()));
//!     persist.process(&curi)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crawler;
pub mod decide;
pub mod error;
pub mod history;
pub mod metrics;
pub mod models;
pub mod partition;
pub mod record;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::decide::{DecideRule, Decision, IdenticalDigestRule};
    pub use crate::error::{Error, ErrorCategory, RecrawlErrorTrait, Result};
    pub use crate::history::FetchHistoryTracker;
    pub use crate::models::{CandidateUri, CrawlUri, FetchOutcome, PersistentKeys};
    pub use crate::partition::{
        CrawlMapProcessor, CrawlMapper, HashCrawlMapper, LexicalCrawlMapper, MapperSettings,
    };
    pub use crate::record::AttributeRecord;
    pub use crate::storage::{
        CheckpointCoordinator, Checkpointable, CrawlerJournal, HistoryStore, SqliteHistoryStore,
    };
}

// Direct re-exports for convenience
pub use error::{Error, Result};
