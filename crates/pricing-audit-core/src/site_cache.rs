//! Read-only view of the shared site-metadata cache.
//!
//! Another tool maintains `sites_cache.json`; this crate only consumes it and
//! falls back to the listing endpoint when it is missing, stale, or unreadable.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use crate::device::SiteRecord;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SiteCache {
    path: PathBuf,
    max_age: Duration,
}

impl SiteCache {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).and_then(|m| m.modified()).ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Cached site rows when the file is younger than the freshness window.
    pub fn load_fresh(&self) -> Option<Vec<SiteRecord>> {
        let age = self.age()?;
        if age >= self.max_age {
            info!(
                age_days = age.as_secs() / 86_400,
                max_days = self.max_age.as_secs() / 86_400,
                "site cache is stale"
            );
            return None;
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read site cache");
                return None;
            }
        };
        match serde_json::from_str::<Vec<SiteRecord>>(&raw) {
            Ok(sites) if !sites.is_empty() => {
                info!(path = %self.path.display(), sites = sites.len(), "using cached site data");
                Some(sites)
            }
            Ok(_) => None,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to parse site cache");
                None
            }
        }
    }
}
