mod common;

use common::{off_schedule, pfid, schedule, FakeDevices, ScriptedOperator};
use pricing_audit_core::cancel::CancelFlag;
use pricing_audit_core::device::UpdateOutcome;
use pricing_audit_core::ledger::{AttemptOutcome, RejectionLedger, StationStatus};
use pricing_audit_core::operator::SiteSelection;
use pricing_audit_core::report::StationOutcome;
use pricing_audit_core::retry::{RetryOrchestrator, RetryOutcome, SiteRetry};
use pricing_audit_core::schedule::{classify, Schedule};
use tempfile::tempdir;

fn incorrect(id: &str) -> StationOutcome {
    let schedule = off_schedule();
    StationOutcome {
        station: pfid(id),
        model: "LiteON".into(),
        enabled: Some(true),
        classification: classify(&schedule, &Schedule::reference()),
        schedule: Some(schedule),
    }
}

fn seeded_ledger(path: &std::path::Path) -> anyhow::Result<RejectionLedger> {
    let ledger = RejectionLedger::new(path);
    ledger.upsert_incorrect(&pfid("0051-09"), &Schedule::reference(), &incorrect("0051-09-02-01"))?;
    ledger.upsert_incorrect(&pfid("0051-09"), &Schedule::reference(), &incorrect("0051-09-02-02"))?;
    ledger.record_attempt(
        "0051-09",
        &pfid("0051-09-02-01"),
        &AttemptOutcome::Rejected("Station is offline".into()),
    )?;
    ledger.record_attempt("0051-09", &pfid("0051-09-02-02"), &AttemptOutcome::Accepted)?;
    Ok(ledger)
}

#[tokio::test]
async fn empty_ledger_makes_no_calls() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = RejectionLedger::new(dir.path().join("ledger.json"));
    let devices = FakeDevices::new();
    let operator = ScriptedOperator::default();

    let outcome = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new())
        .run()
        .await?;

    assert_eq!(outcome, RetryOutcome::NothingPending);
    assert!(devices.calls().is_empty());
    assert!(operator.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn resolved_site_is_pruned_without_contacting_stations() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = RejectionLedger::new(dir.path().join("ledger.json"));
    ledger.upsert_incorrect(&pfid("0051-09"), &Schedule::reference(), &incorrect("0051-09-02-01"))?;
    ledger.record_attempt("0051-09", &pfid("0051-09-02-01"), &AttemptOutcome::Accepted)?;
    let devices = FakeDevices::new();
    let operator = ScriptedOperator::default();

    let retry = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new());
    assert!(retry.pending_sites()?.is_empty());
    assert_eq!(retry.retry_site("0051-09").await?, SiteRetry::AlreadyResolved);

    assert!(devices.calls().is_empty());
    assert!(ledger.load()?.sites.is_empty());
    assert_eq!(retry.retry_site("0051-09").await?, SiteRetry::Missing);
    Ok(())
}

#[tokio::test]
async fn retry_sends_only_outstanding_stations_with_stored_reference() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = RejectionLedger::new(dir.path().join("ledger.json"));
    let stored = schedule(&[(0, 0.5), (12, 0.4)]);
    ledger.upsert_incorrect(&pfid("0051-09"), &stored, &incorrect("0051-09-02-01"))?;
    ledger.upsert_incorrect(&pfid("0051-09"), &stored, &incorrect("0051-09-02-02"))?;
    ledger.record_attempt(
        "0051-09",
        &pfid("0051-09-02-01"),
        &AttemptOutcome::Error("timed out".into()),
    )?;
    ledger.record_attempt("0051-09", &pfid("0051-09-02-02"), &AttemptOutcome::Accepted)?;

    let devices = FakeDevices::new();
    let operator = ScriptedOperator::default();
    let outcome = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new())
        .run()
        .await?;

    let RetryOutcome::Retried(results) = outcome else {
        panic!("expected a retry, got {outcome:?}");
    };
    assert_eq!(results.len(), 1);
    let (key, SiteRetry::Attempted { summary, pruned }) = &results[0] else {
        panic!("expected an attempt, got {:?}", results[0]);
    };
    assert_eq!(key, "0051-09");
    assert!(*pruned);
    assert_eq!(summary.accepted(), 1);

    assert_eq!(devices.calls(), vec!["update_schedule 0051-09-02-01"]);
    assert_eq!(devices.current_schedule("0051-09-02-01"), Some(stored));
    assert_eq!(operator.prompts(), vec!["select 1", "retry 0051-09"]);
    Ok(())
}

#[tokio::test]
async fn repeated_rejection_keeps_site_until_accepted() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = seeded_ledger(&dir.path().join("ledger.json"))?;
    let devices = FakeDevices::new();
    devices.queue_update(
        "0051-09-02-01",
        Ok(UpdateOutcome::Rejected("Charging session active".into())),
    );
    let operator = ScriptedOperator::default();
    let retry = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new());

    match retry.retry_site("0051-09").await? {
        SiteRetry::Attempted { summary, pruned } => {
            assert_eq!(summary.rejected(), 1);
            assert!(!pruned);
        }
        other => panic!("expected an attempt, got {other:?}"),
    }
    let doc = ledger.load()?;
    let record = &doc.site("0051-09").unwrap().stations[&pfid("0051-09-02-01")];
    assert_eq!(record.status, StationStatus::Rejected);
    assert_eq!(record.reason.as_deref(), Some("Charging session active"));
    assert_eq!(retry.pending_sites()?.len(), 1);

    match retry.retry_site("0051-09").await? {
        SiteRetry::Attempted { summary, pruned } => {
            assert_eq!(summary.accepted(), 1);
            assert!(pruned);
        }
        other => panic!("expected an attempt, got {other:?}"),
    }
    assert!(retry.pending_sites()?.is_empty());
    assert!(ledger.load()?.site("0051-09").is_none());
    Ok(())
}

#[tokio::test]
async fn quitting_leaves_ledger_untouched() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = seeded_ledger(&dir.path().join("ledger.json"))?;
    let before = ledger.load()?;
    let devices = FakeDevices::new();
    let operator = ScriptedOperator {
        selection: SiteSelection::Quit,
        ..ScriptedOperator::default()
    };

    let outcome = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new())
        .run()
        .await?;

    assert_eq!(outcome, RetryOutcome::Quit);
    assert!(devices.calls().is_empty());
    assert_eq!(ledger.load()?, before);
    Ok(())
}

#[tokio::test]
async fn declined_site_is_not_contacted() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = seeded_ledger(&dir.path().join("ledger.json"))?;
    let devices = FakeDevices::new();
    let operator = ScriptedOperator {
        selection: SiteSelection::One("0051-09".into()),
        retry: false,
        ..ScriptedOperator::default()
    };

    let outcome = RetryOrchestrator::new(&devices, &operator, &ledger, CancelFlag::new())
        .run()
        .await?;

    assert_eq!(
        outcome,
        RetryOutcome::Retried(vec![("0051-09".into(), SiteRetry::Declined)])
    );
    assert!(devices.calls().is_empty());
    assert_eq!(ledger.load()?.pending_sites().len(), 1);
    Ok(())
}

#[tokio::test]
async fn cancelled_retry_stops_before_the_next_station() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let ledger = RejectionLedger::new(dir.path().join("ledger.json"));
    ledger.upsert_incorrect(&pfid("0051-09"), &Schedule::reference(), &incorrect("0051-09-02-01"))?;
    let devices = FakeDevices::new();
    let operator = ScriptedOperator::default();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let outcome = RetryOrchestrator::new(&devices, &operator, &ledger, cancel)
        .run()
        .await?;

    assert_eq!(outcome, RetryOutcome::Retried(Vec::new()));
    assert!(devices.calls().is_empty());
    let doc = ledger.load()?;
    let record = &doc.site("0051-09").unwrap().stations[&pfid("0051-09-02-01")];
    assert_eq!(record.status, StationStatus::Pending);
    Ok(())
}
