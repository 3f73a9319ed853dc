use chrono::Utc;
use dialoguer::console::Term;
use dialoguer::{Confirm, Select};
use pricing_audit_core::ledger::{PendingSite, SiteEntry};
use pricing_audit_core::operator::{Operator, SiteSelection};
use pricing_audit_core::pfid::Pfid;
use pricing_audit_core::progress::ScanProgress;
use pricing_audit_core::report::StationOutcome;
use pricing_audit_core::schedule::Schedule;
use tracing::warn;

use crate::report::{describe_mismatches, format_age, table};

/// Answers prompts on stderr so stdout stays a clean report.
pub struct TerminalOperator {
    term: Term,
}

impl TerminalOperator {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    /// A failed prompt (no TTY, closed input) counts as "no".
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact_on(&self.term)
            .unwrap_or_else(|err| {
                warn!(error = %err, "prompt failed; treating as no");
                false
            })
    }

    fn show(&self, text: impl std::fmt::Display) {
        if let Err(err) = self.term.write_line(&text.to_string()) {
            warn!(error = %err, "could not write to terminal");
        }
    }
}

impl Operator for TerminalOperator {
    fn resume_scan(&self, progress: &ScanProgress) -> bool {
        self.show(format!(
            "Found a saved run for {} started {}: {}/{} clusters done.",
            progress.scope,
            progress.started_at.format("%Y-%m-%d %H:%M UTC"),
            progress.completed_units(),
            progress.units.len()
        ));
        self.confirm("Resume it? (no starts over)", true)
    }

    fn overwrite_checkpoint(&self, existing: &ScanProgress, requested: &Pfid) -> bool {
        self.show(format!(
            "A saved run for {} ({}/{} clusters done) would be replaced by a run for {}.",
            existing.scope,
            existing.completed_units(),
            existing.units.len(),
            requested
        ));
        self.confirm("Discard the saved run?", false)
    }

    fn remediate(&self, incorrect: &[&StationOutcome], reference: &Schedule) -> bool {
        let mut stations = table(&["Station", "Current schedule", "Differences"]);
        for outcome in incorrect {
            let current = outcome
                .schedule
                .as_ref()
                .map_or_else(|| "N/A".to_string(), Schedule::to_string);
            stations.add_row(vec![
                outcome.station.to_string(),
                current,
                describe_mismatches(outcome.classification.mismatches()),
            ]);
        }
        self.show(stations);
        self.show(format!("Reference schedule: {reference}"));
        self.confirm(
            &format!("Update {} station(s) to the reference schedule?", incorrect.len()),
            false,
        )
    }

    fn select_site(&self, sites: &[PendingSite]) -> SiteSelection {
        let now = Utc::now();
        let mut overview = table(&[
            "#", "Site", "Mode", "Pending", "Rejected", "Error", "Accepted", "Updated",
        ]);
        for (index, site) in sites.iter().enumerate() {
            overview.add_row(vec![
                (index + 1).to_string(),
                site.key.clone(),
                site.mode.to_string(),
                site.counts.pending.to_string(),
                site.counts.rejected.to_string(),
                site.counts.error.to_string(),
                site.counts.accepted.to_string(),
                format_age(site.last_updated, now),
            ]);
        }
        self.show(overview);

        let mut labels: Vec<String> = sites
            .iter()
            .map(|site| format!("{} ({} outstanding)", site.key, site.counts.outstanding()))
            .collect();
        labels.push("All sites".to_string());
        labels.push("Quit".to_string());

        let choice = Select::new()
            .with_prompt("Retry which site?")
            .items(&labels)
            .default(0)
            .interact_on(&self.term);
        match choice {
            Ok(index) if index < sites.len() => SiteSelection::One(sites[index].key.clone()),
            Ok(index) if index == sites.len() => SiteSelection::All,
            Ok(_) => SiteSelection::Quit,
            Err(err) => {
                warn!(error = %err, "prompt failed; quitting");
                SiteSelection::Quit
            }
        }
    }

    fn retry_site(&self, site_key: &str, entry: &SiteEntry) -> bool {
        let mut stations = table(&["Station", "Status", "Reason", "Last attempt"]);
        let outstanding = entry.outstanding();
        for (id, record) in &outstanding {
            stations.add_row(vec![
                id.to_string(),
                record.status.as_str().to_string(),
                record.reason.clone().unwrap_or_default(),
                record
                    .last_attempt
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ]);
        }
        self.show(format!("Site {site_key} ({})", entry.scope.labelled()));
        self.show(stations);
        self.show(format!("Reference schedule: {}", entry.reference_schedule));
        self.confirm(
            &format!("Retry {} station(s) for {site_key}?", outstanding.len()),
            true,
        )
    }
}
