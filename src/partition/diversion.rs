//! Diversion logs
//!
//! URIs routed to another node are written to one log per target node, named
//! after the current generation (a truncated UTC timestamp):
//!
//! ```text
//! diversions/2024010112-crawler0-to-3.open     live
//! diversions/2024010111-crawler0-to-3.divert   finished generation
//! ```
//!
//! When the generation changes every live log is closed and renamed to
//! `.divert`. A recently-seen fingerprint cache keeps a URI from being logged
//! twice within a generation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::fingerprint::{fingerprint64, RecentlySeenCache};
use crate::metrics;
use crate::storage::checkpoint::Checkpointable;
use crate::utils::error::PartitionError;

/// Suffix of logs still being written
pub const OPEN_SUFFIX: &str = ".open";

/// Suffix of logs from finished generations
pub const DIVERT_SUFFIX: &str = ".divert";

/// Length of the full generation timestamp (`%Y%m%d%H%M%S%3f`)
pub const TIMESTAMP_DIGITS: usize = 17;

/// Source of the current time, replaceable in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Generation label: the first `digits` digits of the 17-digit timestamp
pub fn generation_for(now: DateTime<Utc>, digits: usize) -> String {
    let stamp = now.format("%Y%m%d%H%M%S%3f").to_string();
    stamp[..digits.clamp(1, TIMESTAMP_DIGITS)].to_string()
}

struct DiversionWriter {
    path: PathBuf,
    out: BufWriter<File>,
}

#[derive(Default)]
struct DiversionState {
    generation: String,
    writers: HashMap<String, DiversionWriter>,
}

/// Per-target diversion logs for one local node
pub struct DiversionLog {
    dir: PathBuf,
    local_name: String,
    rotation_digits: usize,
    seen: RecentlySeenCache,
    clock: Box<dyn Clock>,
    state: Mutex<DiversionState>,
}

impl DiversionLog {
    /// Create the diversion directory and an empty log set
    ///
    /// Failing to create the directory is fatal: without it diverted URIs
    /// would be lost.
    pub fn new(
        dir: impl Into<PathBuf>,
        local_name: impl Into<String>,
        rotation_digits: usize,
        cache_capacity: usize,
    ) -> Result<Self, PartitionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PartitionError::DiversionDir {
            path: dir.display().to_string(),
            source,
        })?;

        Ok(Self {
            dir,
            local_name: local_name.into(),
            rotation_digits: rotation_digits.clamp(1, TIMESTAMP_DIGITS),
            seen: RecentlySeenCache::new(cache_capacity),
            clock: Box::new(SystemClock),
            state: Mutex::new(DiversionState::default()),
        })
    }

    /// Replace the clock deciding generations
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lock the logs for one processing step, rotating first if the
    /// generation has changed
    pub fn session(&self) -> DiversionSession<'_> {
        let mut state = self.lock();
        let now_generation = generation_for(self.clock.now(), self.rotation_digits);
        if now_generation != state.generation {
            self.rotate(&mut state, now_generation);
        }
        DiversionSession { log: self, state }
    }

    /// Generation of the currently open logs (empty before first use)
    pub fn generation(&self) -> String {
        self.lock().generation.clone()
    }

    /// Flush every open log
    pub fn flush(&self) -> Result<(), PartitionError> {
        let mut state = self.lock();
        for writer in state.writers.values_mut() {
            writer.out.flush().map_err(|source| PartitionError::DiversionLog {
                path: writer.path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Finish every open log as if the generation had ended
    pub fn close(&self) {
        let mut state = self.lock();
        self.finish_writers(&mut state);
    }

    fn rotate(&self, state: &mut DiversionState, now_generation: String) {
        if !state.writers.is_empty() {
            tracing::info!(
                from = %state.generation,
                to = %now_generation,
                logs = state.writers.len(),
                "Rotating diversion logs"
            );
        }
        self.finish_writers(state);
        self.seen.clear();
        state.generation = now_generation;
    }

    fn finish_writers(&self, state: &mut DiversionState) {
        for (target, writer) in state.writers.drain() {
            let DiversionWriter { path, mut out } = writer;
            if let Err(e) = out.flush() {
                tracing::error!(path = %path.display(), error = %e, "Diversion log flush failed");
            }
            drop(out);

            let finished = finished_path(&path);
            if let Err(e) = fs::rename(&path, &finished) {
                tracing::error!(
                    node = %target,
                    path = %path.display(),
                    error = %e,
                    "Diversion log rename failed"
                );
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, DiversionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Checkpointable for DiversionLog {
    fn checkpoint_name(&self) -> String {
        format!("diversions:{}", self.dir.display())
    }

    fn checkpoint(&self, _checkpoint_dir: &Path) -> crate::Result<()> {
        Ok(self.flush()?)
    }
}

fn finished_path(open: &Path) -> PathBuf {
    let name = open
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = name.strip_suffix(OPEN_SUFFIX).unwrap_or(&name);
    open.with_file_name(format!("{base}{DIVERT_SUFFIX}"))
}

/// Exclusive access to the diversion logs for one processing step
pub struct DiversionSession<'a> {
    log: &'a DiversionLog,
    state: MutexGuard<'a, DiversionState>,
}

impl DiversionSession<'_> {
    pub fn generation(&self) -> &str {
        &self.state.generation
    }

    /// Log `report` for `uri` to the log of `target`
    ///
    /// Returns `Ok(false)` when the URI was already diverted recently. The
    /// fingerprint is only remembered once the report has been written, so a
    /// failed write can be retried.
    pub fn divert(&mut self, uri: &str, report: &str, target: &str) -> Result<bool, PartitionError> {
        let fp = fingerprint64(uri);
        if self.log.seen.contains(fp) {
            metrics::record_diversion_suppressed();
            return Ok(false);
        }

        let writer = self.writer_for(target)?;
        let written = writeln!(writer.out, "{report}").and_then(|()| writeln!(writer.out));
        written.map_err(|source| PartitionError::DiversionLog {
            path: writer.path.display().to_string(),
            source,
        })?;

        // the session holds the state lock, so no other divert ran in between
        self.log.seen.add(fp);
        metrics::record_diversion(target);
        tracing::debug!(uri, node = target, "URI diverted");
        Ok(true)
    }

    fn writer_for(&mut self, target: &str) -> Result<&mut DiversionWriter, PartitionError> {
        let state = &mut *self.state;
        if !state.writers.contains_key(target) {
            let log = self.log;
            fs::create_dir_all(&log.dir).map_err(|source| PartitionError::DiversionDir {
                path: log.dir.display().to_string(),
                source,
            })?;
            let path = log.dir.join(format!(
                "{}-{}-to-{}{}",
                state.generation, log.local_name, target, OPEN_SUFFIX
            ));
            let file = File::create(&path).map_err(|source| PartitionError::DiversionLog {
                path: path.display().to_string(),
                source,
            })?;
            tracing::debug!(path = %path.display(), "Diversion log opened");
            state.writers.insert(
                target.to_string(),
                DiversionWriter {
                    path,
                    out: BufWriter::new(file),
                },
            );
        }
        state
            .writers
            .get_mut(target)
            .ok_or_else(|| PartitionError::DiversionLog {
                path: target.to_string(),
                source: std::io::Error::other("diversion writer missing"),
            })
    }
}
