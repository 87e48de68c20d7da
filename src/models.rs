// Core data structures for the recrawl subsystem

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::record::AttributeRecord;

/// URI not yet attempted
pub const S_UNATTEMPTED: i32 = 0;

/// URI withheld from fetching by a mapping processor (diverted elsewhere)
pub const S_BLOCKED_BY_CUSTOM_PROCESSOR: i32 = -5000;

/// HTTP 304, content unchanged since the supplied validators
pub const S_NOT_MODIFIED: i32 = 304;

/// A discovered link not yet scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateUri {
    pub uri: String,
    /// Hop path from the seed, one letter per hop (e.g. "LLE")
    pub path_from_seed: String,
    pub via: Option<String>,
}

impl CandidateUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            path_from_seed: String::new(),
            via: None,
        }
    }

    /// Discovered from `via` by one more hop of kind `hop`
    pub fn discovered(uri: impl Into<String>, via: &CrawlUri, hop: char) -> Self {
        let mut path_from_seed = via.path_from_seed.clone();
        path_from_seed.push(hop);
        Self {
            uri: uri.into(),
            path_from_seed,
            via: Some(via.uri.clone()),
        }
    }

    /// One-line report as written to diversion logs
    pub fn single_line_report(&self) -> String {
        single_line_report("CandidateURI", &self.uri, &self.path_from_seed, self.via.as_deref())
    }
}

/// A URI being processed, with its attribute record and fetch state
#[derive(Debug, Clone, Default)]
pub struct CrawlUri {
    pub uri: String,
    pub path_from_seed: String,
    pub via: Option<String>,
    pub fetch_status: i32,
    pub attributes: AttributeRecord,
    pub annotations: Vec<String>,
    /// Freshly discovered links
    pub outlinks: Vec<CandidateUri>,
    /// Remaining processing should jump to the post-processing stage
    pub skip_to_post_processing: bool,
}

impl CrawlUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            fetch_status: S_UNATTEMPTED,
            ..Default::default()
        }
    }

    pub fn from_candidate(candidate: CandidateUri) -> Self {
        Self {
            uri: candidate.uri,
            path_from_seed: candidate.path_from_seed,
            via: candidate.via,
            fetch_status: S_UNATTEMPTED,
            ..Default::default()
        }
    }

    /// Fetch completed with a response (any positive status, 4xx/5xx included)
    pub fn is_success(&self) -> bool {
        self.fetch_status > 0
    }

    pub fn add_annotation(&mut self, annotation: impl Into<String>) {
        self.annotations.push(annotation.into());
    }

    /// Snapshot of the attributes that survive requeueing and recrawls
    pub fn persistent_record(&self, keys: &PersistentKeys) -> AttributeRecord {
        self.attributes.project(keys.iter())
    }

    pub fn single_line_report(&self) -> String {
        single_line_report("CrawlURI", &self.uri, &self.path_from_seed, self.via.as_deref())
    }
}

fn single_line_report(kind: &str, uri: &str, path_from_seed: &str, via: Option<&str>) -> String {
    let path = if path_from_seed.is_empty() { "-" } else { path_from_seed };
    format!("{kind} {uri} {path} {}", via.unwrap_or("-"))
}

/// Attribute keys that must survive serialization, requeueing and recrawls
///
/// Built once at startup from the processors in use and handed to every
/// persistence boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistentKeys {
    keys: BTreeSet<String>,
}

impl PersistentKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>) -> Self {
        self.keys.insert(key.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn extend<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Completed-fetch descriptor supplied by the fetch engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub status: i32,
    pub fetch_began: DateTime<Utc>,
    pub content_digest: Option<String>,
    /// Present only when the fetch produced a response
    pub response: Option<ResponseMetadata>,
    /// Measured content length
    pub content_length: Option<i64>,
}

impl FetchOutcome {
    pub fn new(status: i32, fetch_began: DateTime<Utc>) -> Self {
        Self {
            status,
            fetch_began,
            content_digest: None,
            response: None,
            content_length: None,
        }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.content_digest = Some(digest.into());
        self
    }

    pub fn with_response(mut self, response: ResponseMetadata) -> Self {
        self.response = Some(response);
        self
    }

    pub fn with_content_length(mut self, length: i64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// Response headers of a completed fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub headers: Vec<(String, String)>,
}

impl ResponseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        let mut curi = CrawlUri::new("http://example.org/");
        assert!(!curi.is_success());
        curi.fetch_status = 200;
        assert!(curi.is_success());
        curi.fetch_status = 304;
        assert!(curi.is_success());
        curi.fetch_status = 404;
        assert!(curi.is_success());
        curi.fetch_status = 503;
        assert!(curi.is_success());
        curi.fetch_status = -1;
        assert!(!curi.is_success());
        curi.fetch_status = S_BLOCKED_BY_CUSTOM_PROCESSOR;
        assert!(!curi.is_success());
    }

    #[test]
    fn test_single_line_report() {
        let mut curi = CrawlUri::new("http://example.org/");
        curi.path_from_seed = "L".to_string();
        let link = CandidateUri::discovered("http://example.org/a", &curi, 'L');

        assert_eq!(
            link.single_line_report(),
            "CandidateURI http://example.org/a LL http://example.org/"
        );
        assert_eq!(curi.single_line_report(), "CrawlURI http://example.org/ L -");
    }

    #[test]
    fn test_persistent_record_projects_keys() {
        let mut curi = CrawlUri::new("http://example.org/");
        curi.attributes.put_int("keep", 1);
        curi.attributes.put_int("drop", 2);

        let keys = PersistentKeys::new().with("keep");
        let snapshot = curi.persistent_record(&keys);
        assert!(snapshot.contains_key("keep"));
        assert!(!snapshot.contains_key("drop"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let meta = ResponseMetadata::new().with_header("ETag", "\"abc\"");
        assert_eq!(meta.header("etag"), Some("\"abc\""));
        assert_eq!(meta.header("last-modified"), None);
    }
}
