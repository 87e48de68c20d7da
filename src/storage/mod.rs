//! Durable state: history store, recrawl journal, persist processors and
//! checkpointing

pub mod checkpoint;
pub mod history_store;
pub mod journal;
pub mod persist;

pub use checkpoint::{CheckpointCoordinator, CheckpointReport, Checkpointable};
pub use history_store::{HistoryStore, MemoryHistoryStore, SqliteHistoryStore};
pub use journal::{CrawlerJournal, JournalEntry, JournalReader};
pub use persist::{
    preload, should_store, PersistLoadProcessor, PersistLogProcessor, PersistStoreProcessor,
    PreloadSource, StoreGate,
};
