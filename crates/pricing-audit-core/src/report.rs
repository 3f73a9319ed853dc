use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pfid::Pfid;
use crate::schedule::{Classification, Schedule};

/// What a scan learned about one eligible station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationOutcome {
    pub station: Pfid,
    pub model: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
    pub classification: Classification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub correct: usize,
    pub incorrect: usize,
    pub unknown: usize,
    pub skipped: usize,
}

impl Totals {
    pub fn checked(&self) -> usize {
        self.correct + self.incorrect + self.unknown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub scope: Pfid,
    pub outcomes: Vec<StationOutcome>,
    /// Non-eligible stations seen during the scan, counted per model.
    pub skipped_models: BTreeMap<String, usize>,
    /// Clusters whose station listing failed. They stay pending in the
    /// checkpoint so the next run resumes only these.
    pub unavailable_clusters: Vec<String>,
}

impl ScanReport {
    pub fn totals(&self) -> Totals {
        let mut totals = Totals {
            skipped: self.skipped_models.values().sum(),
            ..Totals::default()
        };
        for outcome in &self.outcomes {
            match outcome.classification {
                Classification::Correct => totals.correct += 1,
                Classification::Incorrect { .. } => totals.incorrect += 1,
                Classification::Unknown { .. } => totals.unknown += 1,
            }
        }
        totals
    }

    pub fn is_partial(&self) -> bool {
        !self.unavailable_clusters.is_empty()
    }

    pub fn incorrect(&self) -> Vec<&StationOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.classification.is_incorrect())
            .collect()
    }
}
