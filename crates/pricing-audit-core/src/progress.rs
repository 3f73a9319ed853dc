//! Resumable checkpoint for hierarchical scans.
//!
//! A single record lives on disk at a time. It is created when a scan starts,
//! rewritten after every completed cluster, and removed once the scope is
//! fully traversed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuditError, Result};
use crate::persist;
use crate::pfid::{Pfid, ScanMode};
use crate::report::StationOutcome;

pub const PROGRESS_VERSION: u32 = 1;

fn current_version() -> u32 {
    PROGRESS_VERSION
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnitProgress {
    pub cluster: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanProgress {
    #[serde(default = "current_version")]
    pub version: u32,
    pub mode: ScanMode,
    pub scope: Pfid,
    pub units: Vec<UnitProgress>,
    #[serde(default)]
    pub outcomes: Vec<StationOutcome>,
    #[serde(default)]
    pub skipped_models: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
}

impl ScanProgress {
    pub fn new(scope: Pfid, clusters: Vec<String>) -> Self {
        Self {
            version: PROGRESS_VERSION,
            mode: scope.mode(),
            scope,
            units: clusters
                .into_iter()
                .map(|cluster| UnitProgress {
                    cluster,
                    completed: false,
                })
                .collect(),
            outcomes: Vec::new(),
            skipped_models: BTreeMap::new(),
            started_at: Utc::now(),
        }
    }

    /// Same scope and mode, so resuming is meaningful.
    pub fn matches(&self, scope: &Pfid) -> bool {
        self.scope == *scope && self.mode == scope.mode()
    }

    pub fn completed_units(&self) -> usize {
        self.units.iter().filter(|u| u.completed).count()
    }

    pub fn is_complete(&self) -> bool {
        self.units.iter().all(|u| u.completed)
    }

    pub fn pending_units(&self) -> impl Iterator<Item = (usize, &UnitProgress)> {
        self.units.iter().enumerate().filter(|(_, u)| !u.completed)
    }

    /// Folds a finished cluster into the checkpoint.
    pub fn complete_unit(
        &mut self,
        index: usize,
        outcomes: Vec<StationOutcome>,
        skipped: BTreeMap<String, usize>,
    ) {
        if let Some(unit) = self.units.get_mut(index) {
            unit.completed = true;
        }
        self.outcomes.extend(outcomes);
        for (model, count) in skipped {
            *self.skipped_models.entry(model).or_default() += count;
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A corrupt checkpoint only costs a re-scan, so it is logged and ignored.
    pub fn load(&self) -> Result<Option<ScanProgress>> {
        match persist::read_json(&self.path) {
            Ok(progress) => Ok(progress),
            Err(AuditError::Corrupt { path, reason }) => {
                warn!(path = %path.display(), %reason, "ignoring unreadable scan checkpoint");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn save(&self, progress: &ScanProgress) -> Result<()> {
        persist::write_json_atomic(&self.path, progress)
    }

    pub fn clear(&self) -> Result<()> {
        persist::remove_if_exists(&self.path)
    }
}
