pub mod auth;
pub mod cancel;
mod child;
pub mod config;
pub mod device;
pub mod error;
pub mod ledger;
pub mod operator;
pub mod persist;
pub mod pfid;
pub mod progress;
pub mod remediation;
pub mod remote;
pub mod report;
pub mod retry;
pub mod scan;
pub mod schedule;
pub mod site_cache;
pub mod state;
