//! Decisions that need a human at the terminal.

use crate::ledger::{PendingSite, SiteEntry};
use crate::pfid::Pfid;
use crate::progress::ScanProgress;
use crate::report::StationOutcome;
use crate::schedule::Schedule;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteSelection {
    One(String),
    All,
    Quit,
}

pub trait Operator {
    /// A checkpoint for the requested scope exists. `true` resumes it,
    /// `false` discards it and starts over.
    fn resume_scan(&self, progress: &ScanProgress) -> bool;

    /// A checkpoint for a different scope exists. `true` discards it.
    fn overwrite_checkpoint(&self, existing: &ScanProgress, requested: &Pfid) -> bool;

    fn remediate(&self, incorrect: &[&StationOutcome], reference: &Schedule) -> bool;

    fn select_site(&self, sites: &[PendingSite]) -> SiteSelection;

    fn retry_site(&self, site_key: &str, entry: &SiteEntry) -> bool;
}
