//! Terminal rendering of scan, remediation and retry results.

use chrono::{DateTime, Utc};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use pricing_audit_core::ledger::{AttemptOutcome, RejectionLedger};
use pricing_audit_core::remediation::RemediationSummary;
use pricing_audit_core::report::{ScanReport, StationOutcome};
use pricing_audit_core::retry::{RetryOutcome, SiteRetry};
use pricing_audit_core::schedule::{Classification, Mismatch};

pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

pub fn describe_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("t={}: {} (expected {})", m.offset, m.actual, m.expected))
        .collect::<Vec<_>>()
        .join(", ")
}

/// "3d 4h ago", "5h 12m ago", "12m ago" or "just now".
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - since).num_minutes().max(0);
    let (days, hours, mins) = (minutes / 1440, (minutes % 1440) / 60, minutes % 60);
    match (days, hours, mins) {
        (0, 0, 0) => "just now".to_string(),
        (0, 0, m) => format!("{m}m ago"),
        (0, h, m) => format!("{h}h {m}m ago"),
        (d, h, _) => format!("{d}d {h}h ago"),
    }
}

fn classification_cells(outcome: &StationOutcome) -> (&'static str, String) {
    match &outcome.classification {
        Classification::Correct => ("correct", String::new()),
        Classification::Incorrect { mismatches } => ("INCORRECT", describe_mismatches(mismatches)),
        Classification::Unknown { reason } => ("unknown", reason.clone()),
    }
}

pub fn print_scan(report: &ScanReport) {
    let flagged: Vec<&StationOutcome> = report
        .outcomes
        .iter()
        .filter(|o| !o.classification.is_correct())
        .collect();
    if !flagged.is_empty() {
        let mut stations = table(&["Station", "Model", "Result", "Detail"]);
        for outcome in flagged {
            let (result, detail) = classification_cells(outcome);
            stations.add_row(vec![
                outcome.station.to_string(),
                outcome.model.clone(),
                result.to_string(),
                detail,
            ]);
        }
        println!("{stations}");
    }

    let totals = report.totals();
    let mut summary = table(&["Correct", "Incorrect", "Unknown", "Skipped"]);
    summary.add_row(vec![
        totals.correct.to_string(),
        totals.incorrect.to_string(),
        totals.unknown.to_string(),
        totals.skipped.to_string(),
    ]);
    println!("Results for {}", report.scope.labelled());
    println!("{summary}");

    if !report.skipped_models.is_empty() {
        let models: Vec<String> = report
            .skipped_models
            .iter()
            .map(|(model, count)| format!("{model} ({count})"))
            .collect();
        println!("Skipped (not LiteON): {}", models.join(", "));
    }

    if report.is_partial() {
        println!(
            "Could not list stations for cluster(s) {}. \
             Run `pricing-audit {}` again to check them.",
            report.unavailable_clusters.join(", "),
            report.scope
        );
    }
}

pub fn print_remediation(summary: &RemediationSummary, ledger: &RejectionLedger) {
    let mut attempts = table(&["Station", "Result", "Detail"]);
    for (station, outcome) in &summary.attempts {
        let (result, detail) = match outcome {
            AttemptOutcome::Accepted => ("accepted", ""),
            AttemptOutcome::Rejected(reason) => ("rejected", reason.as_str()),
            AttemptOutcome::Error(message) => ("error", message.as_str()),
        };
        attempts.add_row(vec![station.to_string(), result.to_string(), detail.to_string()]);
    }
    println!("{attempts}");
    println!(
        "Accepted: {}  Rejected: {}  Failed: {}",
        summary.accepted(),
        summary.rejected(),
        summary.errored()
    );

    if summary.interrupted {
        println!("Interrupted before every station was updated.");
    }
    if summary.interrupted || summary.rejected() + summary.errored() > 0 {
        println!(
            "Outstanding stations are recorded in {}. Run `pricing-audit --retry` to try again.",
            ledger.path().display()
        );
    }
}

pub fn print_retry(outcome: &RetryOutcome) {
    let results = match outcome {
        RetryOutcome::NothingPending => {
            println!("No sites with pending updates.");
            return;
        }
        RetryOutcome::Quit => {
            println!("No changes made.");
            return;
        }
        RetryOutcome::Retried(results) => results,
    };

    let mut sites = table(&["Site", "Result", "Accepted", "Rejected", "Failed"]);
    for (key, result) in results {
        let row = match result {
            SiteRetry::AlreadyResolved => vec![key.clone(), "already resolved".into()],
            SiteRetry::Missing => vec![key.clone(), "not in ledger".into()],
            SiteRetry::Declined => vec![key.clone(), "skipped".into()],
            SiteRetry::Attempted { summary, pruned } => vec![
                key.clone(),
                if *pruned { "resolved" } else { "still pending" }.to_string(),
                summary.accepted().to_string(),
                summary.rejected().to_string(),
                summary.errored().to_string(),
            ],
        };
        sites.add_row(row);
    }
    println!("{sites}");
}
