//! Hash-modulo crawl mapping
//!
//! Nodes are named `0` through `N-1`. A class key is optionally reduced by a
//! regex (first match kept), fingerprinted, and taken modulo N.

use regex::Regex;

use super::fingerprint::fingerprint64;
use super::public_suffix::PublicSuffixes;
use super::CrawlMapper;
use crate::utils::error::PartitionError;

/// How class keys are reduced before hashing
#[derive(Debug, Clone, Default)]
pub enum KeyReduction {
    /// Keep the registered domain, using the built-in public-suffix rules
    #[default]
    PublicSuffix,
    /// Keep the first match of an explicit pattern
    Pattern(String),
    /// Hash the full class key
    None,
}

/// Maps class keys to one of `bucket_count` numerically named nodes
#[derive(Debug, Clone)]
pub struct HashCrawlMapper {
    bucket_count: u64,
    reduce: Option<Regex>,
}

impl HashCrawlMapper {
    pub fn new(bucket_count: u64, reduction: KeyReduction) -> Result<Self, PartitionError> {
        if bucket_count == 0 {
            return Err(PartitionError::ZeroBuckets);
        }
        let reduce = match reduction {
            KeyReduction::PublicSuffix => Some(PublicSuffixes::builtin().surt_prefix_regex()?),
            KeyReduction::Pattern(p) if p.is_empty() => None,
            KeyReduction::Pattern(p) => Some(Regex::new(&p)?),
            KeyReduction::None => None,
        };
        Ok(Self {
            bucket_count,
            reduce,
        })
    }

    /// Use an already-built reduce regex (e.g. from a custom suffix list)
    pub fn with_regex(bucket_count: u64, reduce: Option<Regex>) -> Result<Self, PartitionError> {
        if bucket_count == 0 {
            return Err(PartitionError::ZeroBuckets);
        }
        Ok(Self {
            bucket_count,
            reduce,
        })
    }

    pub fn bucket_count(&self) -> u64 {
        self.bucket_count
    }
}

impl CrawlMapper for HashCrawlMapper {
    fn target_for(&self, class_key: &str) -> String {
        map_string(class_key, self.reduce.as_ref(), self.bucket_count)
    }
}

/// Bucket name for `key`: `|fp64(reduced key) mod bucket_count|`
///
/// # Examples
///
/// ```
/// use recrawl::partition::hash::map_string;
///
/// let bucket: u64 = map_string("com,example,", None, 4).parse().unwrap();
/// assert!(bucket < 4);
/// ```
pub fn map_string(key: &str, reduce: Option<&Regex>, bucket_count: u64) -> String {
    let reduced = reduce
        .and_then(|re| re.find(key))
        .map_or(key, |m| m.as_str());
    let fp = fingerprint64(reduced);
    // remainder takes the dividend's sign; buckets are its absolute value
    let bucket = i128::from(fp) % i128::from(bucket_count);
    bucket.unsigned_abs().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_buckets_rejected() {
        assert!(matches!(
            HashCrawlMapper::new(0, KeyReduction::None),
            Err(PartitionError::ZeroBuckets)
        ));
    }

    #[test]
    fn test_single_bucket_maps_everything_to_zero() {
        let mapper = HashCrawlMapper::new(1, KeyReduction::None).unwrap();
        assert_eq!(mapper.target_for("com,example,"), "0");
        assert_eq!(mapper.target_for("org,archive,"), "0");
    }

    #[test]
    fn test_same_registered_domain_same_bucket() {
        let mapper = HashCrawlMapper::new(97, KeyReduction::PublicSuffix).unwrap();
        assert_eq!(
            mapper.target_for("uk,co,bbc,news,"),
            mapper.target_for("uk,co,bbc,www,")
        );
    }

    #[test]
    fn test_explicit_pattern_first_match() {
        let mapper =
            HashCrawlMapper::new(1000, KeyReduction::Pattern("^[^,]+,[^,]+,".into())).unwrap();
        assert_eq!(
            mapper.target_for("com,example,a,"),
            map_string("com,example,", None, 1000)
        );
    }

    #[test]
    fn test_empty_pattern_disables_reduction() {
        let mapper = HashCrawlMapper::new(1000, KeyReduction::Pattern(String::new())).unwrap();
        assert_eq!(
            mapper.target_for("com,example,a,"),
            map_string("com,example,a,", None, 1000)
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(
            HashCrawlMapper::new(3, KeyReduction::Pattern("(".into())),
            Err(PartitionError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_non_matching_pattern_uses_full_key() {
        let re = Regex::new("^zzz").unwrap();
        assert_eq!(
            map_string("com,example,", Some(&re), 13),
            map_string("com,example,", None, 13)
        );
    }
}
