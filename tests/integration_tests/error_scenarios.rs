//! Error handling scenarios
//!
//! Startup failures are fatal; runtime failures are logged and survived.

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;

use recrawl::config::{Config, MapperStrategy};
use recrawl::error::{Error, ErrorCategory, RecrawlErrorTrait};
use recrawl::models::CrawlUri;
use recrawl::partition::{
    CrawlMapProcessor, HashCrawlMapper, KeyReduction, LexicalCrawlMapper, MapperSettings,
};
use recrawl::record::{AttributeRecord, ByteStream};
use recrawl::storage::history_store::{HistoryStore, SqliteHistoryStore};
use recrawl::storage::journal::CrawlerJournal;
use recrawl::storage::persist::PersistLoadProcessor;
use recrawl::utils::error::{PartitionError, RecordError, StoreError};

#[test]
fn test_type_mismatch_is_typed() {
    let mut record = AttributeRecord::new();
    record.put_long("length", 10);

    match record.get_int("length") {
        Err(RecordError::TypeMismatch { key, .. }) => assert_eq!(key, "length"),
        other => panic!("expected type mismatch, got {other:?}"),
    }
    assert!(matches!(record.get_int("absent"), Err(RecordError::NoSuchKey(_))));
}

#[test]
fn test_streams_never_reach_the_store() {
    let store = SqliteHistoryStore::in_memory().unwrap();
    let mut record = AttributeRecord::new();
    record.put_stream("body", ByteStream::new(std::io::Cursor::new(b"payload".to_vec())));

    let err: Error = store.put("k", &record).unwrap_err().into();
    assert!(matches!(err, Error::Store(StoreError::Codec(_))));
    assert!(store.get("k").unwrap().is_none());
}

#[test]
fn test_missing_prior_environment_is_fatal() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        SqliteHistoryStore::open_existing(dir.path()),
        Err(StoreError::InvalidEnvironment { .. })
    ));
}

#[test]
fn test_closed_store_rejects_use() {
    let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    store.close().unwrap();

    let load = PersistLoadProcessor::new(store);
    let mut curi = CrawlUri::new("http://example.com/");
    assert!(matches!(load.process(&mut curi), Err(StoreError::Closed)));
}

#[test]
fn test_malformed_map_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("crawl.map");
    fs::write(&path, "a node1\nthree tokens here\n").unwrap();

    let err: Error = LexicalCrawlMapper::load(path.to_str().unwrap(), "local")
        .unwrap_err()
        .into();
    assert!(matches!(
        err,
        Error::Partition(PartitionError::MalformedMapLine { line_number: 2, .. })
    ));
    assert_eq!(err.category(), ErrorCategory::Config);
    assert!(!err.is_recoverable());
}

#[test]
fn test_unusable_diversion_dir_is_fatal() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir");
    fs::write(&file, "x").unwrap();

    let settings = MapperSettings {
        diversion_dir: file.join("diversions"),
        cache_capacity: 16,
        ..Default::default()
    };
    let mapper = HashCrawlMapper::new(2, KeyReduction::None).unwrap();
    assert!(matches!(
        CrawlMapProcessor::new(mapper, settings),
        Err(PartitionError::DiversionDir { .. })
    ));
}

#[test]
fn test_writes_after_close_are_dropped() {
    let dir = TempDir::new().unwrap();
    let journal = CrawlerJournal::create(dir.path().join("j.gz"), 0).unwrap();
    journal.write_line(&["kept"]);
    journal.close();
    journal.write_line(&["dropped"]);
    journal.serious_error("also dropped");
    journal.close();

    assert!(journal.is_closed());
    assert_eq!(journal.line_count(), 1);
}

#[test]
fn test_invalid_config_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("recrawl.toml");
    fs::write(&path, "[mapper]\nstrategy = \"lexical\"\n").unwrap();

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.mapper.strategy, MapperStrategy::Lexical);
    assert!(config.validate().is_err());

    fs::write(&path, "[mapper\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}
