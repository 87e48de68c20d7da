//! Well-known attribute keys

/// Rotating array of fetch history entries
pub const A_FETCH_HISTORY: &str = "fetch-history";

/// Fetch status code of one history entry
pub const A_STATUS: &str = "status";

/// Time the fetch started
pub const A_FETCH_BEGAN_TIME: &str = "fetch-began-time";

/// Content digest, scheme-prefixed (e.g. `sha256:...`)
pub const A_CONTENT_DIGEST: &str = "content-digest";

/// ETag response validator
pub const A_ETAG_HEADER: &str = "etag";

/// Last-Modified response validator
pub const A_LAST_MODIFIED_HEADER: &str = "last-modified";

/// Reference content length, real or carried over from a previous fetch
pub const A_REFERENCE_LENGTH: &str = "reference-length";
