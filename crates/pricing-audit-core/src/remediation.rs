use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::device::{StationConfigurator, UpdateOutcome};
use crate::error::Result;
use crate::ledger::{AttemptOutcome, RejectionLedger};
use crate::pfid::Pfid;
use crate::schedule::Schedule;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemediationSummary {
    pub attempts: Vec<(Pfid, AttemptOutcome)>,
    pub interrupted: bool,
}

impl RemediationSummary {
    pub fn accepted(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Accepted))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Rejected(_)))
    }

    pub fn errored(&self) -> usize {
        self.count(|o| matches!(o, AttemptOutcome::Error(_)))
    }

    fn count(&self, pred: impl Fn(&AttemptOutcome) -> bool) -> usize {
        self.attempts.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Pushes the reference schedule to stations and records each outcome
/// under `site_key` before moving to the next station.
pub struct Remediator<'a> {
    configurator: &'a dyn StationConfigurator,
    ledger: &'a RejectionLedger,
    cancel: &'a CancelFlag,
}

impl<'a> Remediator<'a> {
    pub fn new(
        configurator: &'a dyn StationConfigurator,
        ledger: &'a RejectionLedger,
        cancel: &'a CancelFlag,
    ) -> Self {
        Self {
            configurator,
            ledger,
            cancel,
        }
    }

    pub async fn apply(
        &self,
        site_key: &str,
        stations: &[Pfid],
        reference: &Schedule,
    ) -> Result<RemediationSummary> {
        let mut summary = RemediationSummary::default();
        let total = stations.len();

        for (index, station) in stations.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(
                    site = site_key,
                    remaining = total - index,
                    "remediation interrupted; remaining stations stay pending"
                );
                summary.interrupted = true;
                break;
            }

            let outcome = match self.configurator.update_schedule(station, reference).await {
                Ok(UpdateOutcome::Accepted) => AttemptOutcome::Accepted,
                Ok(UpdateOutcome::Rejected(reason)) => AttemptOutcome::Rejected(reason),
                Err(err) => AttemptOutcome::Error(err.to_string()),
            };
            match &outcome {
                AttemptOutcome::Accepted => {
                    info!(
                        station = %station,
                        progress = format!("{}/{}", index + 1, total),
                        "update accepted"
                    )
                }
                AttemptOutcome::Rejected(reason) => {
                    warn!(station = %station, %reason, "update rejected")
                }
                AttemptOutcome::Error(message) => {
                    warn!(station = %station, error = %message, "update failed")
                }
            }

            if !self.ledger.record_attempt(site_key, station, &outcome)? {
                warn!(station = %station, site = site_key, "station is not tracked in the ledger");
            }
            summary.attempts.push((station.clone(), outcome));
        }

        Ok(summary)
    }
}
