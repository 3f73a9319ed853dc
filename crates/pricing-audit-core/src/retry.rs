//! Re-attempts remediation for stations left pending in the ledger.

use tracing::{info, warn};

use crate::cancel::CancelFlag;
use crate::device::StationConfigurator;
use crate::error::Result;
use crate::ledger::{PendingSite, RejectionLedger};
use crate::operator::{Operator, SiteSelection};
use crate::pfid::Pfid;
use crate::remediation::{RemediationSummary, Remediator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteRetry {
    /// Nothing outstanding; the entry was pruned without contacting stations.
    AlreadyResolved,
    /// No entry exists under this key.
    Missing,
    Declined,
    Attempted {
        summary: RemediationSummary,
        pruned: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    NothingPending,
    Quit,
    Retried(Vec<(String, SiteRetry)>),
}

pub struct RetryOrchestrator<'a> {
    configurator: &'a dyn StationConfigurator,
    operator: &'a dyn Operator,
    ledger: &'a RejectionLedger,
    cancel: CancelFlag,
}

impl<'a> RetryOrchestrator<'a> {
    pub fn new(
        configurator: &'a dyn StationConfigurator,
        operator: &'a dyn Operator,
        ledger: &'a RejectionLedger,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            configurator,
            operator,
            ledger,
            cancel,
        }
    }

    pub fn pending_sites(&self) -> Result<Vec<PendingSite>> {
        Ok(self.ledger.load()?.pending_sites())
    }

    pub async fn run(&self) -> Result<RetryOutcome> {
        let sites = self.pending_sites()?;
        if sites.is_empty() {
            info!(path = %self.ledger.path().display(), "no sites with pending updates");
            return Ok(RetryOutcome::NothingPending);
        }

        let keys: Vec<String> = match self.operator.select_site(&sites) {
            SiteSelection::Quit => return Ok(RetryOutcome::Quit),
            SiteSelection::All => sites.into_iter().map(|site| site.key).collect(),
            SiteSelection::One(key) => vec![key],
        };

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            if self.cancel.is_cancelled() {
                warn!(site = %key, "interrupted; remaining sites left for the next retry");
                break;
            }
            let result = self.retry_site(&key).await?;
            results.push((key, result));
        }
        Ok(RetryOutcome::Retried(results))
    }

    /// Retries one site's outstanding stations against the reference
    /// schedule stored with the site entry.
    pub async fn retry_site(&self, site_key: &str) -> Result<SiteRetry> {
        let document = self.ledger.load()?;
        let Some(entry) = document.site(site_key) else {
            warn!(site = site_key, "no ledger entry for site");
            return Ok(SiteRetry::Missing);
        };

        let targets: Vec<Pfid> = entry
            .outstanding()
            .into_iter()
            .map(|(id, _)| id.clone())
            .collect();
        if targets.is_empty() {
            info!(site = site_key, "all stations for this site have been updated");
            self.ledger.prune_if_resolved(site_key)?;
            return Ok(SiteRetry::AlreadyResolved);
        }

        if !self.operator.retry_site(site_key, entry) {
            info!(site = site_key, "no changes made");
            return Ok(SiteRetry::Declined);
        }

        info!(site = site_key, stations = targets.len(), "retrying updates");
        let reference = entry.reference_schedule.clone();
        let summary = Remediator::new(self.configurator, self.ledger, &self.cancel)
            .apply(site_key, &targets, &reference)
            .await?;
        let pruned = self.ledger.prune_if_resolved(site_key)?;
        if !pruned {
            info!(
                site = site_key,
                path = %self.ledger.path().display(),
                "still-failing stations remain; run with --retry again"
            );
        }

        Ok(SiteRetry::Attempted { summary, pruned })
    }
}
