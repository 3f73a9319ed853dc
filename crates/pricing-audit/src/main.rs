use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use pricing_audit_core::auth::{ScriptCredentialSource, TokenKeeper};
use pricing_audit_core::cancel::CancelFlag;
use pricing_audit_core::config::Settings;
use pricing_audit_core::pfid::Pfid;
use pricing_audit_core::remote::CurlDeviceManager;
use pricing_audit_core::retry::RetryOrchestrator;
use pricing_audit_core::scan::{ScanOptions, ScanOrchestrator, ScanOutcome};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod operator;
mod report;

use operator::TerminalOperator;

/// Check LiteON charger pricing schedules across a network, cluster, group
/// or single station, and push the reference schedule to the odd ones out.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Station identifier: ACN [ACC [ACG [ACS]]], as separate arguments or
    /// dash-joined (0051-09-02).
    #[arg(value_name = "SEGMENT", required_unless_present = "retry", conflicts_with = "retry")]
    segments: Vec<String>,

    /// Re-attempt updates for stations recorded as pending, rejected or failed.
    #[arg(long)]
    retry: bool,

    /// Apply the reference schedule without asking for confirmation.
    #[arg(short, long)]
    yes: bool,

    /// Ignore the cached site list and fetch it from the device manager.
    #[arg(long)]
    refresh_sites: bool,

    /// Directory holding the progress checkpoint, ledger and site cache.
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

enum Mode {
    Scan(Pfid),
    Retry,
}

impl Cli {
    fn mode(&self) -> std::result::Result<Mode, clap::Error> {
        if self.retry {
            return Ok(Mode::Retry);
        }
        Pfid::parse_args(&self.segments)
            .map(Mode::Scan)
            .map_err(|err| Cli::command().error(ErrorKind::ValueValidation, err))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mode = cli.mode().unwrap_or_else(|err| err.exit());

    let mut settings = Settings::from_env();
    if let Some(dir) = cli.cache_dir.clone() {
        settings.cache_dir = dir;
    }
    init_tracing(settings.log_json);

    let stores = settings.stores();
    let tokens = Arc::new(TokenKeeper::new(
        Box::new(ScriptCredentialSource::new(
            settings.jwt_command.clone(),
            settings.jwt_environment.clone(),
        )),
        settings.token_refresh_interval,
    ));
    let devices = CurlDeviceManager::new(
        settings.device_command.clone(),
        settings.api_base.clone(),
        Arc::clone(&tokens),
    );
    let operator = TerminalOperator::new();
    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    match mode {
        Mode::Retry => {
            let retry = RetryOrchestrator::new(&devices, &operator, &stores.ledger, cancel.clone());
            if retry.pending_sites()?.is_empty() {
                println!("No sites with pending updates.");
                return Ok(());
            }
            tokens
                .bearer()
                .await
                .context("could not acquire a device manager credential")?;
            let outcome = retry.run().await?;
            report::print_retry(&outcome);
        }
        Mode::Scan(scope) => {
            println!("Checking {} ({})", scope.labelled(), scope.mode());
            tokens
                .bearer()
                .await
                .context("could not acquire a device manager credential")?;

            let options = ScanOptions {
                refresh_sites: cli.refresh_sites,
                assume_yes: cli.yes,
            };
            let outcome =
                ScanOrchestrator::new(&devices, &devices, &operator, &stores, cancel.clone())
                    .with_options(options)
                    .run(&scope)
                    .await?;

            match outcome {
                ScanOutcome::Completed { report, remediation } => {
                    report::print_scan(&report);
                    if let Some(summary) = remediation {
                        report::print_remediation(&summary, &stores.ledger);
                    }
                }
                ScanOutcome::Interrupted {
                    scope,
                    completed_units,
                    total_units,
                } => {
                    println!(
                        "Interrupted after {completed_units}/{total_units} clusters. \
                         Progress saved to {}.",
                        stores.progress.path().display()
                    );
                    println!("Run `pricing-audit {scope}` again to resume.");
                }
            }
        }
    }

    info!("done");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// First Ctrl-C asks the running scan or retry to stop after the current
/// station; a second one exits immediately.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received; finishing the current station (Ctrl-C again to abort)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("aborted");
            std::process::exit(130);
        }
    });
}
