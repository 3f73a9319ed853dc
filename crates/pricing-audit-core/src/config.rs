//! Runtime settings, read from the environment (and `.env` via dotenvy in
//! the binary).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_REFRESH_INTERVAL;
use crate::remote::{DEFAULT_API_BASE, DEFAULT_DEVICE_COMMAND};
use crate::site_cache::DEFAULT_MAX_AGE;
use crate::state::Stores;

pub const DEFAULT_JWT_COMMAND: &str = "powerflex_get_jwt_pass.sh";
pub const DEFAULT_JWT_ENV: &str = "prd";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub cache_dir: PathBuf,
    pub api_base: String,
    pub device_command: String,
    pub jwt_command: String,
    pub jwt_environment: String,
    pub token_refresh_interval: Duration,
    pub site_cache_max_age: Duration,
    pub log_json: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; unset or unparseable
    /// values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cache_dir = lookup("PRICING_AUDIT_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_cache_dir(lookup("HOME")));
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        let days = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|d| Duration::from_secs(d * 24 * 60 * 60))
                .unwrap_or(default)
        };

        Self {
            cache_dir,
            api_base: lookup("PRICING_AUDIT_API_BASE")
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            device_command: lookup("PRICING_AUDIT_DEVICE_COMMAND")
                .unwrap_or_else(|| DEFAULT_DEVICE_COMMAND.to_string()),
            jwt_command: lookup("PRICING_AUDIT_JWT_COMMAND")
                .unwrap_or_else(|| DEFAULT_JWT_COMMAND.to_string()),
            jwt_environment: lookup("PRICING_AUDIT_JWT_ENV")
                .unwrap_or_else(|| DEFAULT_JWT_ENV.to_string()),
            token_refresh_interval: secs(
                "PRICING_AUDIT_TOKEN_REFRESH_SECS",
                DEFAULT_REFRESH_INTERVAL,
            ),
            site_cache_max_age: days("PRICING_AUDIT_SITE_CACHE_MAX_AGE_DAYS", DEFAULT_MAX_AGE),
            log_json: lookup("PRICING_AUDIT_LOG_FORMAT")
                .is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores::in_dir(&self.cache_dir, self.site_cache_max_age)
    }
}

/// `~/.cache/site_lookup`, shared with the site lookup tool.
fn default_cache_dir(home: Option<String>) -> PathBuf {
    home.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("site_lookup")
}
