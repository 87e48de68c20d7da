//! Integration tests for fetch history and the identical-digest rule

mod common;

use proptest::prelude::*;

use recrawl::decide::{has_identical_digest, DecideRule, Decision, IdenticalDigestRule};
use recrawl::history::FetchHistoryTracker;
use recrawl::models::CrawlUri;
use recrawl::record::keys::{A_CONTENT_DIGEST, A_FETCH_BEGAN_TIME, A_FETCH_HISTORY};
use recrawl::record::AttributeRecord;

use common::{fetch, fetch_time};

proptest! {
    /// After N fetches the history holds min(N, D) entries, newest first
    #[test]
    fn prop_history_rotation(fetches in 0u32..12, depth in 1usize..6) {
        let tracker = FetchHistoryTracker::new(depth);
        let mut curi = CrawlUri::new("http://example.com/");
        for n in 0..fetches {
            fetch(&tracker, &mut curi, n, &format!("sha256:{n}"));
        }

        if fetches == 0 {
            prop_assert!(!curi.attributes.contains_key(A_FETCH_HISTORY));
            return Ok(());
        }

        let history = curi.attributes.get_record_array(A_FETCH_HISTORY).unwrap();
        prop_assert_eq!(history.len(), depth);
        let filled = history.iter().filter(|e| e.is_some()).count();
        prop_assert_eq!(filled, (fetches as usize).min(depth));

        for (i, slot) in history.iter().enumerate() {
            match slot {
                Some(entry) => {
                    let n = fetches - 1 - i as u32;
                    prop_assert_eq!(entry.get_date(A_FETCH_BEGAN_TIME).unwrap(), fetch_time(n));
                    let expected = format!("sha256:{n}");
                    prop_assert_eq!(entry.get_string(A_CONTENT_DIGEST).unwrap(), expected.as_str());
                }
                None => prop_assert!(i >= fetches as usize),
            }
        }
    }
}

#[test]
fn test_history_length_change_between_runs() {
    let long = FetchHistoryTracker::new(4);
    let mut curi = CrawlUri::new("http://example.com/");
    for n in 0..4 {
        fetch(&long, &mut curi, n, "sha256:a");
    }

    let short = FetchHistoryTracker::new(2);
    fetch(&short, &mut curi, 4, "sha256:b");
    let history = curi.attributes.get_record_array(A_FETCH_HISTORY).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(
        history[1].as_ref().unwrap().get_date(A_FETCH_BEGAN_TIME).unwrap(),
        fetch_time(3)
    );
}

fn record_with_digests(digests: &[Option<&str>]) -> AttributeRecord {
    let history = digests
        .iter()
        .map(|digest| {
            let mut entry = AttributeRecord::new();
            entry.put_int("status", 200);
            if let Some(d) = digest {
                entry.put_string(A_CONTENT_DIGEST, *d);
            }
            Some(entry)
        })
        .collect();
    let mut record = AttributeRecord::new();
    record.put_record_array(A_FETCH_HISTORY, history);
    record
}

#[test]
fn test_digest_match_truth_table() {
    let cases: &[(&[Option<&str>], bool)] = &[
        (&[], false),
        (&[Some("sha256:x")], false),
        (&[Some("sha256:x"), Some("sha256:x")], true),
        (&[Some("sha256:x"), Some("sha256:y")], false),
        (&[Some("sha256:x"), None], false),
        (&[None, Some("sha256:x")], false),
        (&[None, None], false),
        (&[Some("sha256:abc"), Some("SHA256:ABC")], false),
        (&[Some("sha256:x"), Some("sha256:x"), Some("sha256:y")], true),
    ];
    for (digests, expected) in cases {
        assert_eq!(
            has_identical_digest(&record_with_digests(digests)),
            *expected,
            "digests: {digests:?}"
        );
    }

    assert!(!has_identical_digest(&AttributeRecord::new()));
}

#[test]
fn test_rule_on_refetched_unchanged_page() {
    let tracker = FetchHistoryTracker::default();
    let rule = IdenticalDigestRule::default();
    let mut curi = CrawlUri::new("http://example.com/");

    fetch(&tracker, &mut curi, 0, "sha256:same");
    assert_eq!(DecideRule::<CrawlUri>::decision_for(&rule, &curi), Decision::Pass);

    fetch(&tracker, &mut curi, 1, "sha256:same");
    assert_eq!(DecideRule::<CrawlUri>::decision_for(&rule, &curi), Decision::Reject);

    fetch(&tracker, &mut curi, 2, "sha256:changed");
    assert_eq!(DecideRule::<CrawlUri>::decision_for(&rule, &curi), Decision::Pass);
}

#[test]
fn test_merge_missing_keeps_live_values() {
    let mut stored = AttributeRecord::new();
    stored.put_string("shared", "stored");
    stored.put_long("only-stored", 7);

    let mut live = AttributeRecord::new();
    live.put_string("shared", "live");

    let bytes = serde_json::to_vec(&stored).unwrap();
    let restored: AttributeRecord = serde_json::from_slice(&bytes).unwrap();
    live.merge_missing_from(&restored);

    assert_eq!(live.get_string("shared").unwrap(), "live");
    assert_eq!(live.get_long("only-stored").unwrap(), 7);
    assert_eq!(live.len(), 2);
}
