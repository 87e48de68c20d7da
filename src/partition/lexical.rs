//! Lexical-range crawl mapping
//!
//! The map file assigns key ranges to nodes. Each line holds a range key and
//! a node name; a class key goes to the node of the smallest range key at or
//! after it, wrapping around to the first entry:
//!
//! ```text
//! # range-key   node
//! d             crawler-a
//! ~             crawler-b
//! ```
//!
//! With that map `com,example,` lands on `crawler-a` and `org,example,` on
//! `crawler-b`.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::CrawlMapper;
use crate::utils::error::PartitionError;

/// Maps class keys to nodes by lexical range
#[derive(Debug, Clone)]
pub struct LexicalCrawlMapper {
    ranges: BTreeMap<String, String>,
    local_name: String,
}

impl LexicalCrawlMapper {
    /// Build from explicit ranges; an empty map sends everything to
    /// `local_name`
    pub fn from_ranges(
        ranges: BTreeMap<String, String>,
        local_name: impl Into<String>,
    ) -> Self {
        Self {
            ranges,
            local_name: local_name.into(),
        }
    }

    /// Parse map file content
    pub fn parse(content: &str, local_name: impl Into<String>) -> Result<Self, PartitionError> {
        Ok(Self::from_ranges(parse_ranges(content)?, local_name))
    }

    /// Load the map from a file path or `http(s)://` URL
    pub fn load(source: &str, local_name: impl Into<String>) -> Result<Self, PartitionError> {
        let content = read_source(source)?;
        let mapper = Self::parse(&content, local_name)?;
        tracing::info!(source, ranges = mapper.len(), "Lexical crawl map loaded");
        Ok(mapper)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl CrawlMapper for LexicalCrawlMapper {
    fn target_for(&self, class_key: &str) -> String {
        self.ranges
            .range::<str, _>((Bound::Included(class_key), Bound::Unbounded))
            .next()
            .or_else(|| self.ranges.iter().next())
            .map_or_else(|| self.local_name.clone(), |(_, node)| node.clone())
    }
}

fn parse_ranges(content: &str) -> Result<BTreeMap<String, String>, PartitionError> {
    let mut ranges = BTreeMap::new();
    for (index, raw) in content.lines().enumerate() {
        let entry = raw.split('#').next().unwrap_or_default().trim();
        if entry.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = entry.split_whitespace().collect();
        let [key, node] = tokens.as_slice() else {
            return Err(PartitionError::MalformedMapLine {
                line_number: index + 1,
                line: raw.to_string(),
            });
        };
        ranges.insert((*key).to_string(), (*node).to_string());
    }
    Ok(ranges)
}

fn read_source(source: &str) -> Result<String, PartitionError> {
    let failed = |reason: String| PartitionError::MapSource {
        source_name: source.to_string(),
        reason,
    };
    if source.starts_with("http://") || source.starts_with("https://") {
        reqwest::blocking::get(source)
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.text())
            .map_err(|e| failed(e.to_string()))
    } else {
        std::fs::read_to_string(source).map_err(|e| failed(e.to_string()))
    }
}
