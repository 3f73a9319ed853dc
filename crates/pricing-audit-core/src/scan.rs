//! Hierarchical scan: traverse a scope cluster by cluster, classify every
//! eligible station, checkpoint after each cluster, and offer remediation.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::device::{clusters_for, StationConfigurator, StationDirectory, StationSummary};
use crate::error::{AuditError, RemoteError, Result};
use crate::operator::Operator;
use crate::pfid::Pfid;
use crate::progress::ScanProgress;
use crate::remediation::{RemediationSummary, Remediator};
use crate::report::{ScanReport, StationOutcome};
use crate::schedule::{classify_read, Classification, Schedule};
use crate::state::Stores;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Ignore the site-metadata cache when resolving clusters.
    pub refresh_sites: bool,
    /// Remediate incorrect stations without asking.
    pub assume_yes: bool,
}

#[derive(Debug)]
pub enum ScanOutcome {
    Completed {
        report: ScanReport,
        remediation: Option<RemediationSummary>,
    },
    Interrupted {
        scope: Pfid,
        completed_units: usize,
        total_units: usize,
    },
}

enum UnitScan {
    Finished {
        outcomes: Vec<StationOutcome>,
        skipped: BTreeMap<String, usize>,
    },
    /// The station listing failed; the cluster stays pending.
    Unavailable(RemoteError),
    Interrupted,
}

pub struct ScanOrchestrator<'a> {
    directory: &'a dyn StationDirectory,
    configurator: &'a dyn StationConfigurator,
    operator: &'a dyn Operator,
    stores: &'a Stores,
    cancel: CancelFlag,
    reference: Schedule,
    options: ScanOptions,
}

impl<'a> ScanOrchestrator<'a> {
    pub fn new(
        directory: &'a dyn StationDirectory,
        configurator: &'a dyn StationConfigurator,
        operator: &'a dyn Operator,
        stores: &'a Stores,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            directory,
            configurator,
            operator,
            stores,
            cancel,
            reference: Schedule::reference(),
            options: ScanOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_reference(mut self, reference: Schedule) -> Self {
        self.reference = reference;
        self
    }

    pub async fn run(&self, scope: &Pfid) -> Result<ScanOutcome> {
        info!(scope = %scope, mode = %scope.mode(), "starting pricing schedule check");

        let mut progress = self.begin(scope).await?;
        let total = progress.units.len();
        if total == 0 {
            warn!(scope = %scope, "no clusters to check");
        }

        for (index, unit) in progress.units.iter().enumerate().filter(|(_, u)| u.completed) {
            debug!(
                cluster = %unit.cluster,
                unit = index + 1,
                "skipping cluster (already completed)"
            );
        }

        let pending: Vec<(usize, String)> = progress
            .pending_units()
            .map(|(index, unit)| (index, unit.cluster.clone()))
            .collect();

        let mut unavailable = Vec::new();
        for (index, cluster) in pending {
            info!(
                cluster = %cluster,
                unit = format!("{}/{}", index + 1, total),
                "processing cluster"
            );
            match self.scan_unit(scope, &cluster).await? {
                UnitScan::Finished { outcomes, skipped } => {
                    progress.complete_unit(index, outcomes, skipped);
                    self.stores.progress.save(&progress)?;
                }
                UnitScan::Unavailable(err) => {
                    warn!(
                        cluster = %cluster,
                        error = %err,
                        "could not list stations; cluster left pending"
                    );
                    unavailable.push(cluster);
                }
                UnitScan::Interrupted => {
                    self.stores.progress.save(&progress)?;
                    info!(
                        completed = progress.completed_units(),
                        total,
                        path = %self.stores.progress.path().display(),
                        "interrupted; progress saved, run again to resume"
                    );
                    return Ok(ScanOutcome::Interrupted {
                        scope: scope.clone(),
                        completed_units: progress.completed_units(),
                        total_units: total,
                    });
                }
            }
        }

        if unavailable.is_empty() {
            self.stores.progress.clear()?;
        } else {
            warn!(
                clusters = %unavailable.join(", "),
                path = %self.stores.progress.path().display(),
                "some clusters could not be listed; progress kept, run again to resume them"
            );
        }

        let report = ScanReport {
            scope: scope.clone(),
            outcomes: progress.outcomes,
            skipped_models: progress.skipped_models,
            unavailable_clusters: unavailable,
        };
        let totals = report.totals();
        info!(
            correct = totals.correct,
            incorrect = totals.incorrect,
            unknown = totals.unknown,
            skipped = totals.skipped,
            "scan complete"
        );

        let remediation = self.offer_remediation(&report).await?;
        Ok(ScanOutcome::Completed {
            report,
            remediation,
        })
    }

    /// Loads or creates the checkpoint for `scope`.
    async fn begin(&self, scope: &Pfid) -> Result<ScanProgress> {
        if let Some(existing) = self.stores.progress.load()? {
            if existing.matches(scope) {
                if self.operator.resume_scan(&existing) {
                    info!(
                        completed = existing.completed_units(),
                        total = existing.units.len(),
                        "resuming previous run"
                    );
                    return Ok(existing);
                }
                info!(scope = %existing.scope, "discarding previous checkpoint");
                self.stores.progress.clear()?;
            } else if self.operator.overwrite_checkpoint(&existing, scope) {
                info!(scope = %existing.scope, "overwriting checkpoint for a different scope");
                self.stores.progress.clear()?;
            } else {
                return Err(AuditError::ScopeConflict {
                    existing: existing.scope.to_string(),
                    requested: scope.to_string(),
                });
            }
        }

        let clusters = self.resolve_clusters(scope).await?;
        let progress = ScanProgress::new(scope.clone(), clusters);
        self.stores.progress.save(&progress)?;
        Ok(progress)
    }

    async fn resolve_clusters(&self, scope: &Pfid) -> Result<Vec<String>> {
        if let Some(cluster) = scope.cluster() {
            return Ok(vec![cluster.to_string()]);
        }

        let cached = if self.options.refresh_sites {
            None
        } else {
            self.stores.sites.load_fresh()
        };
        let sites = match cached {
            Some(sites) => sites,
            None => {
                info!("fetching site data from device manager");
                self.directory.list_sites().await?
            }
        };

        let clusters = clusters_for(&sites, scope.network());
        if clusters.is_empty() {
            warn!(network = scope.network(), "no clusters found for network");
        } else {
            info!(
                network = scope.network(),
                count = clusters.len(),
                clusters = %clusters.join(", "),
                "resolved clusters"
            );
        }
        Ok(clusters)
    }

    async fn scan_unit(&self, scope: &Pfid, cluster: &str) -> Result<UnitScan> {
        let listing = match self.directory.list_stations(scope.network(), cluster).await {
            Ok(listing) => listing,
            Err(err) => return Ok(UnitScan::Unavailable(err)),
        };
        if listing.is_empty() {
            warn!(cluster, "no stations found for cluster");
        }

        let mut skipped: BTreeMap<String, usize> = BTreeMap::new();
        let mut eligible = Vec::new();
        let mut out_of_scope = 0usize;
        for summary in listing {
            if !scope.contains(&summary.id) {
                out_of_scope += 1;
            } else if summary.is_eligible() {
                eligible.push(summary);
            } else {
                *skipped.entry(summary.model.clone()).or_default() += 1;
            }
        }
        info!(
            cluster,
            eligible = eligible.len(),
            filtered_out = out_of_scope,
            other_models = skipped.values().sum::<usize>(),
            "stations listed"
        );

        let mut outcomes = Vec::with_capacity(eligible.len());
        for (index, summary) in eligible.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Ok(UnitScan::Interrupted);
            }

            let outcome = self.check_station(summary).await;
            let marker = match &outcome.classification {
                Classification::Correct => "correct",
                Classification::Incorrect { .. } => "incorrect",
                Classification::Unknown { .. } => "unknown",
            };
            info!(
                station = %summary.id,
                progress = format!("{}/{}", index + 1, eligible.len()),
                result = marker,
                "checked"
            );

            if outcome.classification.is_incorrect() {
                self.stores
                    .ledger
                    .upsert_incorrect(scope, &self.reference, &outcome)?;
            }
            outcomes.push(outcome);
        }

        Ok(UnitScan::Finished { outcomes, skipped })
    }

    /// enable -> read -> classify for one station. Remote failures only make
    /// the station unknown.
    async fn check_station(&self, summary: &StationSummary) -> StationOutcome {
        let id = &summary.id;
        let enabled = match summary.schedule_enabled {
            Some(flag) => Some(flag),
            None => match self.configurator.schedule_enabled(id).await {
                Ok(flag) => flag,
                Err(err) => {
                    debug!(station = %id, error = %err, "could not read PricingScheduleEnable");
                    None
                }
            },
        };

        let confirmed = if enabled == Some(true) {
            true
        } else {
            info!(station = %id, "enabling PricingScheduleEnable");
            match self.configurator.enable_schedule(id).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(station = %id, error = %err, "failed to enable pricing schedule");
                    false
                }
            }
        };

        let (schedule, classification) = if confirmed {
            match self.configurator.get_schedule(id).await {
                Ok(schedule) => {
                    let classification = classify_read(schedule.as_ref(), true, &self.reference);
                    (schedule, classification)
                }
                Err(err) => {
                    warn!(station = %id, error = %err, "failed to read pricing schedule");
                    (
                        None,
                        Classification::unknown(format!("PricingSchedule read failed: {err}")),
                    )
                }
            }
        } else {
            (None, classify_read(None, false, &self.reference))
        };

        StationOutcome {
            station: id.clone(),
            model: summary.model.clone(),
            enabled: Some(confirmed),
            schedule,
            classification,
        }
    }

    async fn offer_remediation(&self, report: &ScanReport) -> Result<Option<RemediationSummary>> {
        let incorrect = report.incorrect();
        if incorrect.is_empty() {
            return Ok(None);
        }

        let site_key = report.scope.site_key();
        let reference = self
            .stores
            .ledger
            .load()?
            .site(&site_key)
            .map(|entry| entry.reference_schedule.clone())
            .unwrap_or_else(|| self.reference.clone());

        if self.cancel.is_cancelled() {
            info!(
                site = %site_key,
                "interrupted before remediation; odd ones out remain in the ledger"
            );
            return Ok(None);
        }
        if !self.options.assume_yes && !self.operator.remediate(&incorrect, &reference) {
            info!(
                site = %site_key,
                path = %self.stores.ledger.path().display(),
                "no changes made; odd ones out saved for --retry"
            );
            return Ok(None);
        }

        let stations: Vec<Pfid> = incorrect.iter().map(|o| o.station.clone()).collect();
        let summary = Remediator::new(self.configurator, &self.stores.ledger, &self.cancel)
            .apply(&site_key, &stations, &reference)
            .await?;
        self.stores.ledger.prune_if_resolved(&site_key)?;

        info!(
            accepted = summary.accepted(),
            rejected = summary.rejected(),
            errored = summary.errored(),
            "update complete"
        );
        Ok(Some(summary))
    }
}
