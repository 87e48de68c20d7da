//! Two-crawl recrawl cycle tests
//!
//! The first crawl fetches every seed and persists its history; the second
//! crawl loads that history back and decides on unchanged content.

use std::sync::Arc;

use tempfile::TempDir;

use recrawl::crawler::url::persist_key_for;
use recrawl::decide::{DecideRule, Decision, IdenticalDigestRule};
use recrawl::history::FetchHistoryTracker;
use recrawl::models::CrawlUri;
use recrawl::record::keys::{A_ETAG_HEADER, A_FETCH_HISTORY, A_REFERENCE_LENGTH};
use recrawl::storage::history_store::{HistoryStore, SqliteHistoryStore};
use recrawl::storage::persist::{
    preload, PersistLoadProcessor, PersistLogProcessor, PersistStoreProcessor, PreloadSource,
};

use super::fixtures::{simulate_fetch, PAGE_V1, PAGE_V2, SEEDS};

#[test]
fn test_store_backed_recrawl_skips_unchanged() {
    let dir = TempDir::new().unwrap();
    let tracker = FetchHistoryTracker::default();

    // crawl 1
    {
        let store = Arc::new(SqliteHistoryStore::open(dir.path()).unwrap());
        let persist = PersistStoreProcessor::new(store.clone(), tracker.persistent_keys());
        for seed in SEEDS {
            let mut curi = CrawlUri::new(*seed);
            simulate_fetch(&tracker, &mut curi, PAGE_V1, 0);
            assert!(persist.process(&curi).unwrap());
        }
        store.close().unwrap();
    }

    // crawl 2: news changed, the rest did not
    let store = Arc::new(SqliteHistoryStore::open(dir.path()).unwrap());
    assert_eq!(store.len().unwrap(), SEEDS.len());
    let load = PersistLoadProcessor::new(store.clone());
    let rule = IdenticalDigestRule::default();

    let mut decisions = Vec::new();
    for seed in SEEDS {
        let mut curi = CrawlUri::new(*seed);
        assert!(load.process(&mut curi).unwrap());
        let body = if seed.ends_with("/news") { PAGE_V2 } else { PAGE_V1 };
        simulate_fetch(&tracker, &mut curi, body, 1);
        decisions.push(DecideRule::<CrawlUri>::decision_for(&rule, &curi));

        let history = curi.attributes.get_record_array(A_FETCH_HISTORY).unwrap();
        assert!(history.iter().all(Option::is_some));
        let previous = history[1].as_ref().unwrap();
        assert_eq!(previous.get_string(A_ETAG_HEADER).unwrap(), "\"v0\"");
    }
    assert_eq!(
        decisions,
        vec![Decision::Reject, Decision::Pass, Decision::Reject]
    );
}

#[test]
fn test_journal_backed_recrawl_via_preload() {
    let dir = TempDir::new().unwrap();
    let journal_path = dir.path().join("logs").join("persistlog.txt.gz");
    let tracker = FetchHistoryTracker::default();

    let log = PersistLogProcessor::create(&journal_path, 100, tracker.persistent_keys()).unwrap();
    for seed in SEEDS {
        let mut curi = CrawlUri::new(*seed);
        simulate_fetch(&tracker, &mut curi, PAGE_V1, 0);
        assert!(log.process(&curi));
    }
    // unfetched URIs are never logged
    assert!(!log.process(&CrawlUri::new("http://example.com/never")));
    log.close();

    let store = Arc::new(SqliteHistoryStore::open(dir.path().join("state")).unwrap());
    let source = PreloadSource::parse(journal_path.to_str().unwrap());
    assert_eq!(preload(&*store, &source), SEEDS.len());

    let load = PersistLoadProcessor::new(store.clone());
    let mut curi = CrawlUri::new(SEEDS[0]);
    assert!(load.process(&mut curi).unwrap());
    simulate_fetch(&tracker, &mut curi, PAGE_V1, 1);
    assert!(!IdenticalDigestRule::default().admits(&curi));
}

#[test]
fn test_preload_from_prior_environment() {
    let dir = TempDir::new().unwrap();
    let prior_dir = dir.path().join("crawl-1");
    let tracker = FetchHistoryTracker::default();
    {
        let prior = Arc::new(SqliteHistoryStore::open(&prior_dir).unwrap());
        let persist = PersistStoreProcessor::new(prior.clone(), tracker.persistent_keys());
        for seed in SEEDS {
            let mut curi = CrawlUri::new(*seed);
            simulate_fetch(&tracker, &mut curi, PAGE_V1, 0);
            persist.process(&curi).unwrap();
        }
        prior.close().unwrap();
    }

    let store = SqliteHistoryStore::open(dir.path().join("crawl-2")).unwrap();
    let source = PreloadSource::parse(prior_dir.to_str().unwrap());
    assert!(matches!(source, PreloadSource::Environment(_)));
    assert_eq!(preload(&store, &source), SEEDS.len());

    let record = store.get(&persist_key_for(SEEDS[2])).unwrap().unwrap();
    let history = record.get_record_array(A_FETCH_HISTORY).unwrap();
    let latest = history[0].as_ref().unwrap();
    assert_eq!(latest.get_long(A_REFERENCE_LENGTH).unwrap(), PAGE_V1.len() as i64);
}

#[test]
fn test_live_history_not_overwritten_by_store() {
    let tracker = FetchHistoryTracker::default();
    let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
    let persist = PersistStoreProcessor::new(store.clone(), tracker.persistent_keys());

    let mut stale = CrawlUri::new(SEEDS[0]);
    simulate_fetch(&tracker, &mut stale, PAGE_V1, 0);
    persist.process(&stale).unwrap();

    let mut live = CrawlUri::new(SEEDS[0]);
    simulate_fetch(&tracker, &mut live, PAGE_V2, 3);
    live.attributes.put_string("annotation-source", "live");

    PersistLoadProcessor::new(store).process(&mut live).unwrap();
    let history = live.attributes.get_record_array(A_FETCH_HISTORY).unwrap();
    assert!(history[1].is_none());
    assert_eq!(live.attributes.get_string("annotation-source").unwrap(), "live");
}
