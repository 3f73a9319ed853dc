#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use pricing_audit_core::cancel::CancelFlag;
use pricing_audit_core::device::{
    SiteRecord, StationConfigurator, StationDirectory, StationSummary, UpdateOutcome,
};
use pricing_audit_core::error::RemoteError;
use pricing_audit_core::ledger::{PendingSite, SiteEntry};
use pricing_audit_core::operator::{Operator, SiteSelection};
use pricing_audit_core::pfid::Pfid;
use pricing_audit_core::progress::ScanProgress;
use pricing_audit_core::report::StationOutcome;
use pricing_audit_core::schedule::{Schedule, ScheduleEntry};

pub fn pfid(raw: &str) -> Pfid {
    Pfid::parse(raw).expect("valid pfid")
}

pub fn schedule(pairs: &[(u32, f64)]) -> Schedule {
    Schedule(pairs.iter().map(|&(t, f)| ScheduleEntry { t, f }).collect())
}

pub fn off_schedule() -> Schedule {
    schedule(&[(0, 0.3), (4, 0.5), (8, 0.5), (16, 0.5), (20, 0.5)])
}

#[derive(Default)]
struct FakeState {
    sites: Vec<SiteRecord>,
    stations: Vec<(String, StationSummary)>,
    failing_listings: HashSet<String>,
    enabled: HashMap<Pfid, bool>,
    schedules: HashMap<Pfid, Result<Option<Schedule>, RemoteError>>,
    updates: HashMap<Pfid, VecDeque<Result<UpdateOutcome, RemoteError>>>,
    calls: Vec<String>,
    reads: usize,
    cancel_after_reads: Option<(usize, CancelFlag)>,
}

/// In-memory device manager that records every call it receives.
#[derive(Default)]
pub struct FakeDevices {
    state: Mutex<FakeState>,
}

impl FakeDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site(&self, acn: &str, acc: &str) {
        self.state.lock().unwrap().sites.push(SiteRecord {
            acn_id: acn.into(),
            acc_id: Some(acc.into()),
        });
    }

    pub fn station(&self, id: &str, model: &str, enabled: bool, schedule: Schedule) {
        let id = pfid(id);
        let cluster = id.cluster().expect("full pfid").to_string();
        let mut state = self.state.lock().unwrap();
        state.stations.push((
            cluster,
            StationSummary {
                id: id.clone(),
                model: model.into(),
                schedule_enabled: None,
            },
        ));
        state.enabled.insert(id.clone(), enabled);
        state.schedules.insert(id, Ok(Some(schedule)));
    }

    pub fn fail_read(&self, id: &str) {
        self.state
            .lock()
            .unwrap()
            .schedules
            .insert(pfid(id), Err(RemoteError::Transport("timed out".into())));
    }

    /// Makes `list_stations` fail for `network-cluster` until restored.
    pub fn fail_listing(&self, network: &str, cluster: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .insert(format!("{network}-{cluster}"));
    }

    pub fn restore_listing(&self, network: &str, cluster: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_listings
            .remove(&format!("{network}-{cluster}"));
    }

    pub fn queue_update(&self, id: &str, outcome: Result<UpdateOutcome, RemoteError>) {
        self.state
            .lock()
            .unwrap()
            .updates
            .entry(pfid(id))
            .or_default()
            .push_back(outcome);
    }

    pub fn cancel_after_reads(&self, reads: usize, flag: CancelFlag) {
        self.state.lock().unwrap().cancel_after_reads = Some((reads, flag));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn current_schedule(&self, id: &str) -> Option<Schedule> {
        match self.state.lock().unwrap().schedules.get(&pfid(id)) {
            Some(Ok(schedule)) => schedule.clone(),
            _ => None,
        }
    }
}

#[async_trait]
impl StationDirectory for FakeDevices {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("list_sites".into());
        Ok(state.sites.clone())
    }

    async fn list_stations(
        &self,
        network: &str,
        cluster: &str,
    ) -> Result<Vec<StationSummary>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("list_stations {network}-{cluster}"));
        if state.failing_listings.contains(&format!("{network}-{cluster}")) {
            return Err(RemoteError::Transport("timed out".into()));
        }
        Ok(state
            .stations
            .iter()
            .filter(|(c, s)| c == cluster && s.id.network() == network)
            .map(|(_, s)| s.clone())
            .collect())
    }
}

#[async_trait]
impl StationConfigurator for FakeDevices {
    async fn schedule_enabled(&self, id: &Pfid) -> Result<Option<bool>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("schedule_enabled {id}"));
        Ok(state.enabled.get(id).copied())
    }

    async fn enable_schedule(&self, id: &Pfid) -> Result<(), RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("enable_schedule {id}"));
        state.enabled.insert(id.clone(), true);
        Ok(())
    }

    async fn get_schedule(&self, id: &Pfid) -> Result<Option<Schedule>, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get_schedule {id}"));
        state.reads += 1;
        if let Some((after, flag)) = &state.cancel_after_reads {
            if state.reads >= *after {
                flag.cancel();
            }
        }
        state
            .schedules
            .get(id)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn update_schedule(
        &self,
        id: &Pfid,
        schedule: &Schedule,
    ) -> Result<UpdateOutcome, RemoteError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("update_schedule {id}"));
        let outcome = state
            .updates
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Ok(UpdateOutcome::Accepted));
        if matches!(outcome, Ok(UpdateOutcome::Accepted)) {
            state.schedules.insert(id.clone(), Ok(Some(schedule.clone())));
        }
        outcome
    }
}

/// Operator with fixed answers that remembers which prompts it saw.
pub struct ScriptedOperator {
    pub resume: bool,
    pub overwrite: bool,
    pub remediate: bool,
    pub selection: SiteSelection,
    pub retry: bool,
    pub prompts: RefCell<Vec<String>>,
}

impl Default for ScriptedOperator {
    fn default() -> Self {
        Self {
            resume: true,
            overwrite: true,
            remediate: false,
            selection: SiteSelection::All,
            retry: true,
            prompts: RefCell::new(Vec::new()),
        }
    }
}

impl ScriptedOperator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Operator for ScriptedOperator {
    fn resume_scan(&self, progress: &ScanProgress) -> bool {
        self.prompts
            .borrow_mut()
            .push(format!("resume {}", progress.scope));
        self.resume
    }

    fn overwrite_checkpoint(&self, existing: &ScanProgress, requested: &Pfid) -> bool {
        self.prompts
            .borrow_mut()
            .push(format!("overwrite {} with {requested}", existing.scope));
        self.overwrite
    }

    fn remediate(&self, incorrect: &[&StationOutcome], _reference: &Schedule) -> bool {
        self.prompts
            .borrow_mut()
            .push(format!("remediate {}", incorrect.len()));
        self.remediate
    }

    fn select_site(&self, sites: &[PendingSite]) -> SiteSelection {
        self.prompts
            .borrow_mut()
            .push(format!("select {}", sites.len()));
        self.selection.clone()
    }

    fn retry_site(&self, site_key: &str, _entry: &SiteEntry) -> bool {
        self.prompts.borrow_mut().push(format!("retry {site_key}"));
        self.retry
    }
}
