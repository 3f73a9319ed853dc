//! Seams to the remote device manager.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::pfid::Pfid;
use crate::schedule::Schedule;

const ELIGIBLE_MODEL: &str = "liteon";

/// One row of the site-metadata listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteRecord {
    #[serde(default)]
    pub acn_id: String,
    #[serde(default)]
    pub acc_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSummary {
    pub id: Pfid,
    pub model: String,
    /// `None` when the listing does not report the flag.
    pub schedule_enabled: Option<bool>,
}

impl StationSummary {
    pub fn is_eligible(&self) -> bool {
        self.model.to_lowercase().contains(ELIGIBLE_MODEL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Accepted,
    Rejected(String),
}

#[async_trait]
pub trait StationDirectory: Send + Sync {
    async fn list_sites(&self) -> Result<Vec<SiteRecord>, RemoteError>;

    /// Stations under one cluster, in the order the remote returns them.
    async fn list_stations(
        &self,
        network: &str,
        cluster: &str,
    ) -> Result<Vec<StationSummary>, RemoteError>;
}

#[async_trait]
pub trait StationConfigurator: Send + Sync {
    async fn schedule_enabled(&self, id: &Pfid) -> Result<Option<bool>, RemoteError>;
    async fn enable_schedule(&self, id: &Pfid) -> Result<(), RemoteError>;
    async fn get_schedule(&self, id: &Pfid) -> Result<Option<Schedule>, RemoteError>;
    async fn update_schedule(
        &self,
        id: &Pfid,
        schedule: &Schedule,
    ) -> Result<UpdateOutcome, RemoteError>;
}

/// Distinct cluster ids under `network`, sorted.
pub fn clusters_for(sites: &[SiteRecord], network: &str) -> Vec<String> {
    let mut clusters: Vec<String> = sites
        .iter()
        .filter(|site| site.acn_id == network)
        .filter_map(|site| site.acc_id.clone())
        .filter(|acc| !acc.is_empty())
        .collect();
    clusters.sort();
    clusters.dedup();
    clusters
}
