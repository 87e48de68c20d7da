//! Crawl mapping: partitioning URIs across cooperating crawler nodes
//!
//! A [`CrawlMapper`] names the node responsible for a class key. The
//! [`CrawlMapProcessor`] applies a mapper to a URI about to be fetched and to
//! its discovered outlinks; anything owned by another node is withheld from
//! local processing and written to that node's diversion log.
//!
//! ```text
//!                 ┌───────────────┐ local ┌──────────────────────┐
//!  CrawlUri ─────▶│ CrawlMapper   │──────▶│ normal processing    │
//!  + outlinks     │ (hash/lexical)│       └──────────────────────┘
//!                 └───────┬───────┘
//!                         │ other node
//!                         ▼
//!                 ┌───────────────┐
//!                 │ DiversionLog  │  {gen}-{local}-to-{target}.open
//!                 └───────────────┘
//! ```

pub mod diversion;
pub mod fingerprint;
pub mod hash;
pub mod lexical;
pub mod public_suffix;

pub use diversion::{Clock, DiversionLog, SystemClock};
pub use hash::{HashCrawlMapper, KeyReduction};
pub use lexical::LexicalCrawlMapper;
pub use public_suffix::PublicSuffixes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crawler::{ClassKeySource, SurtAuthorityClassKey};
use crate::decide::{ConstantRule, DecideRule, Decision};
use crate::models::{CandidateUri, CrawlUri, S_BLOCKED_BY_CUSTOM_PROCESSOR};
use crate::storage::checkpoint::Checkpointable;
use crate::utils::error::PartitionError;

/// Names the crawler node responsible for a class key
pub trait CrawlMapper: Send + Sync {
    fn target_for(&self, class_key: &str) -> String;
}

impl<M: CrawlMapper + ?Sized> CrawlMapper for Box<M> {
    fn target_for(&self, class_key: &str) -> String {
        (**self).target_for(class_key)
    }
}

impl<M: CrawlMapper + ?Sized> CrawlMapper for Arc<M> {
    fn target_for(&self, class_key: &str) -> String {
        (**self).target_for(class_key)
    }
}

/// Settings shared by every crawl mapping strategy
#[derive(Debug, Clone)]
pub struct MapperSettings {
    /// Name of this node; URIs mapped here are processed normally
    pub local_name: String,
    /// Directory receiving diversion logs
    pub diversion_dir: PathBuf,
    /// Map the URI being processed (while not yet successfully fetched)
    pub check_uri: bool,
    /// Map discovered outlinks
    pub check_outlinks: bool,
    /// Timestamp digits naming a log generation (10 = hourly)
    pub rotation_digits: usize,
    /// Slots in the recently-diverted fingerprint cache
    pub cache_capacity: usize,
}

impl Default for MapperSettings {
    fn default() -> Self {
        Self {
            local_name: ".".to_string(),
            diversion_dir: PathBuf::from("diversions"),
            check_uri: true,
            check_outlinks: true,
            rotation_digits: 10,
            cache_capacity: fingerprint::DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// What one [`CrawlMapProcessor::process`] call diverted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOutcome {
    /// Target node of the processed URI itself, when diverted
    pub uri_target: Option<String>,
    /// Outlinks removed and diverted
    pub outlinks_diverted: usize,
}

/// Applies a [`CrawlMapper`] to URIs and their outlinks
pub struct CrawlMapProcessor<M> {
    mapper: M,
    local_name: String,
    check_uri: bool,
    check_outlinks: bool,
    outlink_rule: Box<dyn DecideRule<CandidateUri>>,
    class_keys: Box<dyn ClassKeySource>,
    diversions: DiversionLog,
}

impl<M: CrawlMapper> CrawlMapProcessor<M> {
    /// Create the processor, creating the diversion directory
    pub fn new(mapper: M, settings: MapperSettings) -> Result<Self, PartitionError> {
        let diversions = DiversionLog::new(
            settings.diversion_dir,
            settings.local_name.clone(),
            settings.rotation_digits,
            settings.cache_capacity,
        )?;
        Ok(Self {
            mapper,
            local_name: settings.local_name,
            check_uri: settings.check_uri,
            check_outlinks: settings.check_outlinks,
            outlink_rule: Box::new(ConstantRule(Decision::Pass)),
            class_keys: Box::new(SurtAuthorityClassKey),
            diversions,
        })
    }

    /// Only outlinks not rejected by `rule` are mapped
    pub fn with_outlink_rule(mut self, rule: impl DecideRule<CandidateUri> + 'static) -> Self {
        self.outlink_rule = Box::new(rule);
        self
    }

    pub fn with_class_keys(mut self, source: impl ClassKeySource + 'static) -> Self {
        self.class_keys = Box::new(source);
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.diversions = self.diversions.with_clock(clock);
        self
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn diversions(&self) -> &DiversionLog {
        &self.diversions
    }

    /// Node responsible for `uri`
    pub fn target_for_uri(&self, uri: &str) -> String {
        self.mapper.target_for(&self.class_keys.class_key(uri))
    }

    /// Divert `curi` and/or its outlinks when they belong to another node
    ///
    /// A diverted URI is marked blocked, annotated `to:<target>` and sent
    /// straight to post-processing. Diverted outlinks are removed. A URI or
    /// outlink whose diversion could not be logged stays in place.
    pub fn process(&self, curi: &mut CrawlUri) -> Result<MapOutcome, PartitionError> {
        let mut session = self.diversions.session();
        let mut outcome = MapOutcome::default();

        if self.check_uri && curi.fetch_status <= 0 {
            let target = self.target_for_uri(&curi.uri);
            if target != self.local_name {
                // left untouched when the diversion cannot be logged
                session.divert(&curi.uri, &curi.single_line_report(), &target)?;
                curi.fetch_status = S_BLOCKED_BY_CUSTOM_PROCESSOR;
                curi.add_annotation(format!("to:{target}"));
                curi.skip_to_post_processing = true;
                outcome.uri_target = Some(target);
            }
        }

        if self.check_outlinks && !curi.outlinks.is_empty() {
            let mut kept = Vec::with_capacity(curi.outlinks.len());
            let mut failure = None;
            for link in std::mem::take(&mut curi.outlinks) {
                if failure.is_none() && self.outlink_rule.admits(&link) {
                    let target = self.target_for_uri(&link.uri);
                    if target != self.local_name {
                        match session.divert(&link.uri, &link.single_line_report(), &target) {
                            Ok(_) => {
                                outcome.outlinks_diverted += 1;
                                continue;
                            }
                            Err(e) => failure = Some(e),
                        }
                    }
                }
                kept.push(link);
            }
            curi.outlinks = kept;
            if let Some(e) = failure {
                return Err(e);
            }
        }

        Ok(outcome)
    }

    /// Finish all open diversion logs
    pub fn close(&self) {
        self.diversions.close();
    }
}

impl<M: CrawlMapper> Checkpointable for CrawlMapProcessor<M> {
    fn checkpoint_name(&self) -> String {
        self.diversions.checkpoint_name()
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> crate::Result<()> {
        self.diversions.checkpoint(checkpoint_dir)
    }
}
