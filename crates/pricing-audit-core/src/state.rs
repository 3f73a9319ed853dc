use std::path::Path;
use std::time::Duration;

use crate::ledger::RejectionLedger;
use crate::progress::ProgressStore;
use crate::site_cache::SiteCache;

pub const PROGRESS_FILE: &str = "pricing_check_progress.json";
pub const LEDGER_FILE: &str = "pricing_odd_ones_out.json";
pub const SITE_CACHE_FILE: &str = "sites_cache.json";

/// The persisted state a run works against, all rooted in one directory.
#[derive(Debug, Clone)]
pub struct Stores {
    pub progress: ProgressStore,
    pub ledger: RejectionLedger,
    pub sites: SiteCache,
}

impl Stores {
    pub fn in_dir(dir: &Path, site_cache_max_age: Duration) -> Self {
        Self {
            progress: ProgressStore::new(dir.join(PROGRESS_FILE)),
            ledger: RejectionLedger::new(dir.join(LEDGER_FILE)),
            sites: SiteCache::new(dir.join(SITE_CACHE_FILE), site_cache_max_age),
        }
    }
}
