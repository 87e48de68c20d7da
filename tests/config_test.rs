//! Tests for building components from a configuration file

mod common;

use std::fs;

use tempfile::TempDir;

use recrawl::config::Config;
use recrawl::crawler::url::persist_key_for;
use recrawl::history::FetchHistoryTracker;
use recrawl::models::{CandidateUri, CrawlUri};
use recrawl::partition::{CrawlMapProcessor, HashCrawlMapper};
use recrawl::record::keys::A_FETCH_HISTORY;
use recrawl::storage::history_store::{HistoryStore, SqliteHistoryStore};
use recrawl::storage::journal::{self, JournalEntry, JournalReader};
use recrawl::storage::persist::{preload, PersistLogProcessor, PreloadSource};

use common::fetch;

fn write_config(dir: &TempDir) -> Config {
    let root = dir.path();
    let journal_path = root.join("logs").join("persistlog.txt.gz");
    let toml = format!(
        r#"
[history]
history_length = 3

[journal]
path = "{journal}"
timestamp_interval = 2

[persist]
env_dir = "{state}"
preload_source = "{journal}"

[mapper]
local_name = "here"
bucket_count = 4
diversion_dir = "{diversions}"
check_outlinks = false
rotation_digits = 8
"#,
        journal = journal_path.display(),
        state = root.join("state").display(),
        diversions = root.join("diversions").display(),
    );
    let path = root.join("recrawl.toml");
    fs::write(&path, toml).unwrap();

    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();
    config
}

#[test]
fn test_history_and_journal_follow_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let tracker = FetchHistoryTracker::from_config(&config.history);
    assert_eq!(tracker.history_length(), 3);

    let log = PersistLogProcessor::from_config(&config.journal, tracker.persistent_keys()).unwrap();
    for uri in ["http://example.com/", "http://example.com/a", "http://example.org/"] {
        let mut curi = CrawlUri::new(uri);
        fetch(&tracker, &mut curi, 0, "sha256:same");
        assert!(log.process(&curi));
    }
    log.close();

    // three data lines with a marker after every second one
    let markers = JournalReader::new(journal::open_reader(&config.journal.path).unwrap())
        .filter(|e| matches!(e, Ok(JournalEntry::Timestamp(_))))
        .count();
    assert_eq!(markers, 1);

    let store = SqliteHistoryStore::open(&config.persist.env_dir).unwrap();
    let source = PreloadSource::parse(config.persist.preload_source.as_deref().unwrap());
    assert_eq!(preload(&store, &source), 3);

    let record = store.get(&persist_key_for("http://example.com/a")).unwrap().unwrap();
    assert_eq!(record.get_record_array(A_FETCH_HISTORY).unwrap().len(), 3);
    store.close().unwrap();
}

#[test]
fn test_mapper_settings_follow_config() {
    let dir = TempDir::new().unwrap();
    let config = write_config(&dir);

    let settings = config.mapper.settings();
    assert_eq!(settings.local_name, "here");
    assert!(!settings.check_outlinks);

    let mapper =
        HashCrawlMapper::new(config.mapper.bucket_count, config.mapper.key_reduction()).unwrap();
    let processor = CrawlMapProcessor::new(mapper, settings).unwrap();

    // buckets are named "0".."3", so nothing maps to "here"
    let mut curi = CrawlUri::new("http://example.com/");
    curi.outlinks = vec![CandidateUri::new("http://example.org/x")];
    let outcome = processor.process(&mut curi).unwrap();
    assert!(outcome.uri_target.is_some());
    assert_eq!(outcome.outlinks_diverted, 0);
    assert_eq!(curi.outlinks.len(), 1);

    assert_eq!(processor.diversions().generation().len(), 8);
    processor.close();

    let finished: Vec<String> = fs::read_dir(&config.mapper.diversion_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(finished.len(), 1);
    assert!(finished[0].contains("-here-to-") && finished[0].ends_with(".divert"));
}
