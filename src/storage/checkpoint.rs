//! Checkpointing of stateful components
//!
//! Components with on-disk state (journals, diversion logs) implement
//! [`Checkpointable`]. A [`CheckpointCoordinator`] fans a checkpoint out to
//! every registered component, keeps going past individual failures, and
//! leaves a JSON report in the checkpoint directory.
//!
//! # Example
//!
//! ```no_run
//! use recrawl::storage::checkpoint::CheckpointCoordinator;
//! use recrawl::storage::journal::CrawlerJournal;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn example() -> anyhow::Result<()> {
//! let journal = Arc::new(CrawlerJournal::create("logs/persistlog.txt.gz", 0)?);
//!
//! let mut coordinator = CheckpointCoordinator::new();
//! coordinator.register(journal);
//!
//! let report = coordinator.run(Path::new("checkpoints/cp00001-20240101"))?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File name of the report left in each checkpoint directory
pub const REPORT_FILE_NAME: &str = "checkpoint-report.json";

/// A component whose state must be rotated or saved at checkpoint time
pub trait Checkpointable: Send + Sync {
    /// Name used in logs and reports
    fn checkpoint_name(&self) -> String;

    /// Save or rotate state for the checkpoint stored in `checkpoint_dir`
    fn checkpoint(&self, checkpoint_dir: &Path) -> Result<()>;
}

impl<T: Checkpointable + ?Sized> Checkpointable for Arc<T> {
    fn checkpoint_name(&self) -> String {
        (**self).checkpoint_name()
    }

    fn checkpoint(&self, checkpoint_dir: &Path) -> Result<()> {
        (**self).checkpoint(checkpoint_dir)
    }
}

// ============================================================================
// Checkpoint Report
// ============================================================================

/// Outcome of one component's checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentOutcome {
    pub component: String,
    /// Failure description, `None` on success
    pub error: Option<String>,
}

/// Outcome of a checkpoint across all components
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointReport {
    /// Checkpoint identifier (the directory name)
    pub checkpoint_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub components: Vec<ComponentOutcome>,
}

impl CheckpointReport {
    pub fn is_clean(&self) -> bool {
        self.components.iter().all(|c| c.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.components.iter().filter(|c| c.error.is_some())
    }

    /// Load the report left in `checkpoint_dir`, if any
    pub fn load(checkpoint_dir: &Path) -> Result<Option<Self>> {
        let path = checkpoint_dir.join(REPORT_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(&path)?;
        Ok(Some(serde_json::from_reader(std::io::BufReader::new(file))?))
    }

    fn save(&self, checkpoint_dir: &Path) -> Result<PathBuf> {
        let path = checkpoint_dir.join(REPORT_FILE_NAME);
        let temp_path = checkpoint_dir.join(format!("{REPORT_FILE_NAME}.tmp"));

        let mut out = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.flush()?;
        fs::rename(&temp_path, &path)?;

        tracing::debug!(path = %path.display(), "Checkpoint report saved");
        Ok(path)
    }
}

// ============================================================================
// Checkpoint Coordinator
// ============================================================================

/// Drives checkpoints across registered components
#[derive(Default)]
pub struct CheckpointCoordinator {
    components: Vec<Arc<dyn Checkpointable>>,
}

impl CheckpointCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, component: Arc<dyn Checkpointable>) {
        self.components.push(component);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Checkpoint every component into `checkpoint_dir`
    ///
    /// Only failure to create the directory or write the report is an
    /// error; component failures are logged and collected in the report.
    pub fn run(&self, checkpoint_dir: &Path) -> Result<CheckpointReport> {
        fs::create_dir_all(checkpoint_dir)?;
        let checkpoint_id = checkpoint_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        tracing::info!(
            checkpoint = %checkpoint_id,
            components = self.components.len(),
            "Checkpoint started"
        );
        let started_at = Utc::now();

        let components = self
            .components
            .iter()
            .map(|component| {
                let name = component.checkpoint_name();
                let error = match component.checkpoint(checkpoint_dir) {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!(
                            checkpoint = %checkpoint_id,
                            component = %name,
                            error = %e,
                            "Component checkpoint failed"
                        );
                        Some(e.to_string())
                    }
                };
                ComponentOutcome {
                    component: name,
                    error,
                }
            })
            .collect();

        let report = CheckpointReport {
            checkpoint_id,
            started_at,
            finished_at: Utc::now(),
            components,
        };
        report.save(checkpoint_dir)?;

        tracing::info!(
            checkpoint = %report.checkpoint_id,
            failures = report.failures().count(),
            "Checkpoint finished"
        );
        Ok(report)
    }
}
