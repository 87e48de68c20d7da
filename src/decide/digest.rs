//! Unchanged-content detection by content digest

use super::{DecideRule, Decision};
use crate::models::CrawlUri;
use crate::record::keys::{A_CONTENT_DIGEST, A_FETCH_HISTORY};
use crate::record::AttributeRecord;

/// Whether the two most recent history entries carry identical digests
///
/// False when the history is missing, shorter than two entries, or either
/// entry lacks a digest. Comparison is exact and case-sensitive.
pub fn has_identical_digest(record: &AttributeRecord) -> bool {
    let Ok(history) = record.get_record_array(A_FETCH_HISTORY) else {
        return false;
    };
    let digest_at = |i: usize| {
        history
            .get(i)
            .and_then(Option::as_ref)
            .and_then(|entry| entry.get_string(A_CONTENT_DIGEST).ok())
    };
    match (digest_at(0), digest_at(1)) {
        (Some(latest), Some(previous)) => latest == previous,
        _ => false,
    }
}

/// Applies a configured decision to URIs whose latest fetch matches the
/// previous one byte-for-byte (by digest); passes on everything else
#[derive(Debug, Clone, Copy)]
pub struct IdenticalDigestRule {
    decision: Decision,
}

impl IdenticalDigestRule {
    pub fn new(decision: Decision) -> Self {
        Self { decision }
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }
}

impl Default for IdenticalDigestRule {
    fn default() -> Self {
        Self::new(Decision::Reject)
    }
}

impl DecideRule<AttributeRecord> for IdenticalDigestRule {
    fn decision_for(&self, record: &AttributeRecord) -> Decision {
        if has_identical_digest(record) {
            self.decision
        } else {
            Decision::Pass
        }
    }
}

impl DecideRule<CrawlUri> for IdenticalDigestRule {
    fn decision_for(&self, curi: &CrawlUri) -> Decision {
        DecideRule::<AttributeRecord>::decision_for(self, &curi.attributes)
    }
}
