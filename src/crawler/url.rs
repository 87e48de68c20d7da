//! SURT forms of URIs
//!
//! A SURT ("Sort-friendly URI Reordering Transform") reverses the host labels
//! so that lexical order groups URIs by registered domain:
//!
//! ```text
//! http://www.example.org:8080/a/b?q=1  →  http://(org,example,www,:8080)/a/b?q=1
//! ```
//!
//! The full SURT is the persistence key of a URI's history record; the
//! authority part alone is the default classification key used for
//! politeness grouping and crawl mapping.

use url::{Host, Url};

/// Reversed, comma-terminated authority: `org,example,www,` (plus `:port`)
fn reversed_authority(url: &Url) -> Option<String> {
    let host = url.host()?;
    let mut out = match host {
        Host::Domain(domain) => {
            let mut labels: Vec<&str> = domain.trim_end_matches('.').split('.').collect();
            labels.reverse();
            let mut joined = labels.join(",");
            joined.push(',');
            joined
        }
        Host::Ipv4(addr) => format!("{addr},"),
        Host::Ipv6(addr) => format!("[{addr}],"),
    };
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    Some(out)
}

/// SURT form of a URI, fragment dropped
///
/// Unparseable input is returned unchanged so that it still sorts and
/// persists deterministically.
///
/// # Examples
///
/// ```
/// use recrawl::crawler::url::to_surt;
///
/// assert_eq!(
///     to_surt("http://www.Example.org/Path?q=1#frag"),
///     "http://(org,example,www,)/Path?q=1"
/// );
/// ```
pub fn to_surt(uri: &str) -> String {
    let url = match Url::parse(uri) {
        Ok(url) => url,
        Err(_) => return uri.to_string(),
    };
    let Some(authority) = reversed_authority(&url) else {
        return uri.to_string();
    };

    let mut out = format!("{}://(", url.scheme());
    out.push_str(&authority);
    if !url.username().is_empty() {
        out.push('@');
        out.push_str(url.username());
    }
    out.push(')');
    out.push_str(url.path());
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}

/// Key under which a URI's fetch history is persisted across crawls
///
/// Whitespace, which only survives in unparseable input, is percent-encoded:
/// journal lines separate the key from the record at the first space.
pub fn persist_key_for(uri: &str) -> String {
    let surt = to_surt(uri);
    if !surt.contains(char::is_whitespace) {
        return surt;
    }
    let mut key = String::with_capacity(surt.len() + 8);
    for c in surt.chars() {
        if c.is_whitespace() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                key.push_str(&format!("%{byte:02X}"));
            }
        } else {
            key.push(c);
        }
    }
    key
}

/// SURT authority of a URI (`org,example,www,`), used as classification key
///
/// Returns `None` for URIs without a host.
pub fn surt_authority(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    reversed_authority(&url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surt_reverses_host() {
        assert_eq!(
            to_surt("http://www.example.org/index.html"),
            "http://(org,example,www,)/index.html"
        );
    }

    #[test]
    fn test_surt_keeps_port_and_query() {
        assert_eq!(
            to_surt("https://example.com:8443/a?b=c"),
            "https://(com,example,:8443)/a?b=c"
        );
    }

    #[test]
    fn test_surt_drops_fragment() {
        assert_eq!(to_surt("http://example.com/x#top"), "http://(com,example,)/x");
    }

    #[test]
    fn test_surt_ip_host_not_reversed() {
        assert_eq!(to_surt("http://127.0.0.1/"), "http://(127.0.0.1,)/");
    }

    #[test]
    fn test_unparseable_passthrough() {
        assert_eq!(to_surt("not a uri"), "not a uri");
    }

    #[test]
    fn test_surt_authority() {
        assert_eq!(
            surt_authority("http://news.bbc.co.uk/story").as_deref(),
            Some("uk,co,bbc,news,")
        );
        assert_eq!(surt_authority("mailto:someone@example.com"), None);
    }

    #[test]
    fn test_persist_key_never_contains_whitespace() {
        assert_eq!(persist_key_for("not a\turi"), "not%20a%09uri");
        assert_eq!(persist_key_for("http://example.org/a b"), "http://(org,example,)/a%20b");
    }

    #[test]
    fn test_persist_key_is_independent_of_fragment() {
        assert_eq!(
            persist_key_for("http://example.org/p#one"),
            persist_key_for("http://example.org/p#two")
        );
    }
}
