//! Cross-run ledger of stations whose schedule needs remediation.
//!
//! Entries are grouped by site key (the dash-joined scope of the scan that
//! found them). Each entry keeps the reference schedule it was judged against
//! so a later retry applies the same definition of "correct".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::persist;
use crate::pfid::{Pfid, ScanMode};
use crate::report::StationOutcome;
use crate::schedule::{Mismatch, Schedule};

pub const LEDGER_VERSION: u32 = 1;

fn current_version() -> u32 {
    LEDGER_VERSION
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    Pending,
    Accepted,
    Rejected,
    Error,
}

impl StationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationStatus::Pending => "pending",
            StationStatus::Accepted => "accepted",
            StationStatus::Rejected => "rejected",
            StationStatus::Error => "error",
        }
    }

    pub fn needs_work(&self) -> bool {
        !matches!(self, StationStatus::Accepted)
    }
}

/// Result of one remediation call, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected(String),
    Error(String),
}

impl AttemptOutcome {
    fn status(&self) -> StationStatus {
        match self {
            AttemptOutcome::Accepted => StationStatus::Accepted,
            AttemptOutcome::Rejected(_) => StationStatus::Rejected,
            AttemptOutcome::Error(_) => StationStatus::Error,
        }
    }

    fn reason(&self) -> Option<String> {
        match self {
            AttemptOutcome::Accepted => None,
            AttemptOutcome::Rejected(reason) | AttemptOutcome::Error(reason) => {
                Some(reason.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationRecord {
    pub status: StationStatus,
    /// Present only for rejected or errored attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_schedule: Option<Schedule>,
    #[serde(default)]
    pub mismatches: Vec<Mismatch>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub rejected: usize,
    pub error: usize,
    pub accepted: usize,
}

impl StatusCounts {
    pub fn outstanding(&self) -> usize {
        self.pending + self.rejected + self.error
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteEntry {
    pub mode: ScanMode,
    pub scope: Pfid,
    pub reference_schedule: Schedule,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub stations: BTreeMap<Pfid, StationRecord>,
}

impl SiteEntry {
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for record in self.stations.values() {
            match record.status {
                StationStatus::Pending => counts.pending += 1,
                StationStatus::Rejected => counts.rejected += 1,
                StationStatus::Error => counts.error += 1,
                StationStatus::Accepted => counts.accepted += 1,
            }
        }
        counts
    }

    pub fn needs_work(&self) -> bool {
        self.stations.values().any(|r| r.status.needs_work())
    }

    /// Stations a retry should attempt, in identifier order.
    pub fn outstanding(&self) -> Vec<(&Pfid, &StationRecord)> {
        self.stations
            .iter()
            .filter(|(_, record)| record.status.needs_work())
            .collect()
    }
}

/// Summary row for the retry menu.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSite {
    pub key: String,
    pub mode: ScanMode,
    pub counts: StatusCounts,
    pub first_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerDocument {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub sites: BTreeMap<String, SiteEntry>,
}

impl Default for LedgerDocument {
    fn default() -> Self {
        Self {
            version: LEDGER_VERSION,
            sites: BTreeMap::new(),
        }
    }
}

impl LedgerDocument {
    pub fn site(&self, key: &str) -> Option<&SiteEntry> {
        self.sites.get(key)
    }

    /// Records a station found incorrect by a scan of `scope`.
    ///
    /// A station already tracked under the same site key is merged into its
    /// existing record. An open rejection keeps its status and reason; a
    /// previously accepted station goes back to pending.
    pub fn upsert_incorrect(
        &mut self,
        scope: &Pfid,
        reference: &Schedule,
        outcome: &StationOutcome,
        now: DateTime<Utc>,
    ) {
        let next_sequence = self.next_sequence();
        let entry = self
            .sites
            .entry(scope.site_key())
            .or_insert_with(|| SiteEntry {
                mode: scope.mode(),
                scope: scope.clone(),
                reference_schedule: reference.clone(),
                first_seen: now,
                last_updated: now,
                sequence: next_sequence,
                stations: BTreeMap::new(),
            });

        let record = entry
            .stations
            .entry(outcome.station.clone())
            .or_insert_with(|| StationRecord {
                status: StationStatus::Pending,
                reason: None,
                last_attempt: None,
                current_schedule: None,
                mismatches: Vec::new(),
            });
        if record.status == StationStatus::Accepted {
            record.status = StationStatus::Pending;
            record.reason = None;
        }
        record.current_schedule = outcome.schedule.clone();
        record.mismatches = outcome.classification.mismatches().to_vec();
        entry.last_updated = now;
    }

    /// Applies a remediation result. Returns false when the station is not
    /// tracked under `site_key`.
    pub fn record_attempt(
        &mut self,
        site_key: &str,
        station: &Pfid,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(entry) = self.sites.get_mut(site_key) else {
            return false;
        };
        let Some(record) = entry.stations.get_mut(station) else {
            return false;
        };
        record.status = outcome.status();
        record.reason = outcome.reason();
        record.last_attempt = Some(now);
        entry.last_updated = now;
        true
    }

    /// Sites with outstanding stations, oldest entry first.
    pub fn pending_sites(&self) -> Vec<PendingSite> {
        let mut sites: Vec<(u64, PendingSite)> = self
            .sites
            .iter()
            .filter(|(_, entry)| entry.needs_work())
            .map(|(key, entry)| {
                (
                    entry.sequence,
                    PendingSite {
                        key: key.clone(),
                        mode: entry.mode,
                        counts: entry.counts(),
                        first_seen: entry.first_seen,
                        last_updated: entry.last_updated,
                    },
                )
            })
            .collect();
        sites.sort_by(|(a_seq, a), (b_seq, b)| {
            a_seq
                .cmp(b_seq)
                .then(a.first_seen.cmp(&b.first_seen))
                .then(a.key.cmp(&b.key))
        });
        sites.into_iter().map(|(_, site)| site).collect()
    }

    /// Drops a site entry once nothing in it needs work.
    pub fn prune_if_resolved(&mut self, site_key: &str) -> bool {
        let resolved = self
            .sites
            .get(site_key)
            .is_some_and(|entry| !entry.needs_work());
        if resolved {
            self.sites.remove(site_key);
        }
        resolved
    }

    fn next_sequence(&self) -> u64 {
        self.sites
            .values()
            .map(|entry| entry.sequence)
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// File-backed handle to the ledger. Holds no cached state: every read
/// goes to disk so scan and retry paths always merge into the latest file.
#[derive(Debug, Clone)]
pub struct RejectionLedger {
    path: PathBuf,
}

impl RejectionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<LedgerDocument> {
        Ok(persist::read_json(&self.path)?.unwrap_or_default())
    }

    pub fn save(&self, document: &LedgerDocument) -> Result<()> {
        persist::write_json_atomic(&self.path, document)
    }

    /// Reloads the ledger, applies `change`, and writes it back atomically.
    pub fn update<R>(&self, change: impl FnOnce(&mut LedgerDocument) -> R) -> Result<R> {
        let mut document = self.load()?;
        let result = change(&mut document);
        self.save(&document)?;
        debug!(path = %self.path.display(), "ledger flushed");
        Ok(result)
    }

    pub fn upsert_incorrect(
        &self,
        scope: &Pfid,
        reference: &Schedule,
        outcome: &StationOutcome,
    ) -> Result<()> {
        self.update(|doc| doc.upsert_incorrect(scope, reference, outcome, Utc::now()))
    }

    pub fn record_attempt(
        &self,
        site_key: &str,
        station: &Pfid,
        outcome: &AttemptOutcome,
    ) -> Result<bool> {
        self.update(|doc| doc.record_attempt(site_key, station, outcome, Utc::now()))
    }

    pub fn prune_if_resolved(&self, site_key: &str) -> Result<bool> {
        let pruned = self.update(|doc| doc.prune_if_resolved(site_key))?;
        if pruned {
            info!(site = site_key, "all stations accepted; site removed from tracking");
        }
        Ok(pruned)
    }
}
