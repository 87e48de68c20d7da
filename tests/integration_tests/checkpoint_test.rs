//! Checkpoint coordination tests

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use recrawl::history::FetchHistoryTracker;
use recrawl::models::CrawlUri;
use recrawl::partition::{CrawlMapProcessor, CrawlMapper, MapperSettings};
use recrawl::storage::checkpoint::{CheckpointCoordinator, CheckpointReport, Checkpointable};
use recrawl::storage::journal::{self, JournalEntry, JournalReader};
use recrawl::storage::persist::PersistLogProcessor;

use super::fixtures::{simulate_fetch, PAGE_V1};

struct EverythingElsewhere;

impl CrawlMapper for EverythingElsewhere {
    fn target_for(&self, _class_key: &str) -> String {
        "elsewhere".to_string()
    }
}

struct Broken;

impl Checkpointable for Broken {
    fn checkpoint_name(&self) -> String {
        "broken".to_string()
    }

    fn checkpoint(&self, _checkpoint_dir: &Path) -> recrawl::Result<()> {
        Err(recrawl::Error::other("snapshot failed"))
    }
}

fn count_data_lines(path: &Path) -> usize {
    JournalReader::new(journal::open_reader(path).unwrap())
        .filter(|e| matches!(e, Ok(JournalEntry::Data(_))))
        .count()
}

#[test]
fn test_checkpoint_rotates_journal_and_flushes_diversions() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("persistlog.txt.gz");
    let tracker = FetchHistoryTracker::default();

    let log = Arc::new(
        PersistLogProcessor::create(&journal_path, 0, tracker.persistent_keys()).unwrap(),
    );
    let settings = MapperSettings {
        local_name: "here".to_string(),
        diversion_dir: dir.path().join("diversions"),
        cache_capacity: 64,
        ..Default::default()
    };
    let mapper = Arc::new(CrawlMapProcessor::new(EverythingElsewhere, settings).unwrap());

    let mut coordinator = CheckpointCoordinator::new();
    coordinator.register(log.clone());
    coordinator.register(Arc::new(Broken));
    coordinator.register(mapper.clone());
    assert_eq!(coordinator.len(), 3);

    for i in 0..3 {
        let mut curi = CrawlUri::new(format!("http://example.com/{i}"));
        simulate_fetch(&tracker, &mut curi, PAGE_V1, 0);
        log.process(&curi);
    }
    let mut foreign = CrawlUri::new("http://example.net/");
    mapper.process(&mut foreign).unwrap();

    let checkpoint_dir = dir.path().join("checkpoints").join("cp00001");
    let report = coordinator.run(&checkpoint_dir).unwrap();
    assert!(!report.is_clean());
    let failed: Vec<_> = report.failures().map(|f| f.component.as_str()).collect();
    assert_eq!(failed, vec!["broken"]);

    let loaded = CheckpointReport::load(&checkpoint_dir).unwrap().unwrap();
    assert_eq!(loaded.checkpoint_id, "cp00001");
    assert_eq!(loaded.components.len(), 3);

    // diversions are flushed but stay open until the generation ends
    let generation = mapper.diversions().generation();
    let open_log = dir
        .path()
        .join("diversions")
        .join(format!("{generation}-here-to-elsewhere.open"));
    let diverted = std::fs::read_to_string(open_log).unwrap();
    assert!(diverted.starts_with("CrawlURI http://example.net/"));

    let mut curi = CrawlUri::new("http://example.com/after");
    simulate_fetch(&tracker, &mut curi, PAGE_V1, 0);
    log.process(&curi);
    log.close();

    let rotated = dir.path().join("persistlog.txt.gz.cp00001");
    assert_eq!(count_data_lines(&rotated), 3);
    assert_eq!(count_data_lines(&journal_path), 1);
    mapper.close();
}
