//! Interfaces to the surrounding crawl engine
//!
//! The recrawl subsystem does not fetch or schedule anything itself. It
//! consumes a classification key per URI from the frontier, and completed
//! fetch descriptors from the fetch engine (see [`crate::models::FetchOutcome`]).

pub mod url;

/// Supplies the classification key of a URI
///
/// The classification key groups URIs for politeness and is the sharding
/// key of both crawl mapping strategies.
pub trait ClassKeySource: Send + Sync {
    fn class_key(&self, uri: &str) -> String;
}

/// Classification by SURT authority (`com,example,www,`)
///
/// URIs without a host fall back to the raw URI string.
#[derive(Debug, Clone, Copy, Default)]
pub struct SurtAuthorityClassKey;

impl ClassKeySource for SurtAuthorityClassKey {
    fn class_key(&self, uri: &str) -> String {
        url::surt_authority(uri).unwrap_or_else(|| uri.to_string())
    }
}

impl<F> ClassKeySource for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn class_key(&self, uri: &str) -> String {
        self(uri)
    }
}
