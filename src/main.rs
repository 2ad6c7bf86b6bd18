use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use billharvest::config::{default_config_path, ResolvedConfig};
use billharvest::credentials::{AccountVault, SessionCache, SessionData, StoreVault};
use billharvest::portal::{self, ChromeDriver, HarvestSettings, PageDriver, RunSummary};
use billharvest::storage::{DocumentSink, HttpFileFetcher, JsonFileStorage};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Session cache entry holding the portal cookies.
const SESSION_KEY: &str = "portal";

/// Cached cookies older than this are not replayed.
const SESSION_MAX_AGE_HOURS: i64 = 12;

#[derive(Parser)]
#[command(name = "billharvest")]
#[command(about = "Harvest bills, payment schedules and contracts from an energy supplier's portal")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and harvest every contract's documents
    Sync {
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "billharvest=info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
            )
        }))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ResolvedConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load billharvest config: {}", cli.config.display()))?;

    match cli.command {
        Some(Command::Config) => {
            println!("Config file: {}", cli.config.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Browser profile: {}", config.profile_dir.display());
            println!("Portal: {} ({})", config.portal.base_url, config.portal.vendor);
            println!(
                "Credentials: {}",
                if config.credentials.is_some() { "configured" } else { "none (manual login)" }
            );
        }
        Some(Command::Sync { headless }) => {
            config.portal.headless |= headless;
            let summary = sync(&config).await?;
            print_summary(&summary, cli.json)?;
        }
        None => {
            println!("billharvest - energy supplier document harvester");
            println!("=================================================\n");
            println!("Config: {}", cli.config.display());
            println!("Data directory: {}\n", config.data_dir.display());
            println!("Commands:");
            println!("  sync      Log in and harvest documents");
            println!("  config    Show current configuration\n");
            println!("Run 'billharvest --help' for more options.");
        }
    }

    Ok(())
}

async fn sync(config: &ResolvedConfig) -> Result<RunSummary> {
    let sessions = SessionCache::new()?;
    let cached = sessions.get(SESSION_KEY)?.filter(|session| {
        !session.is_older_than(chrono::Utc::now(), chrono::Duration::hours(SESSION_MAX_AGE_HOURS))
    });

    let store = config.credentials.as_ref().map(|c| c.build());
    let vault: Arc<dyn AccountVault> = Arc::new(StoreVault::new(store, config.identity_file()));

    let mut fetcher = HttpFileFetcher::new()?;
    if let Some(session) = cached.clone() {
        fetcher = fetcher.with_session(session);
    }
    let sink: Arc<dyn DocumentSink> =
        Arc::new(JsonFileStorage::new(config.documents_dir()).with_fetcher(Arc::new(fetcher)));

    let chrome = Arc::new(
        ChromeDriver::launch(
            &config.profile_dir,
            config.portal.headless,
            &config.portal.base_url,
            cached.as_ref(),
        )
        .await?,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping harvest");
            on_signal.cancel();
        }
    });

    let driver: Arc<dyn PageDriver> = chrome.clone();
    let outcome = portal::harvest(
        driver,
        vault,
        sink,
        HarvestSettings::from_config(config),
        cancel,
    )
    .await;

    if let Ok(chrome) = Arc::try_unwrap(chrome) {
        chrome.close().await;
    }

    let summary = outcome.context("Harvest failed")?;
    if !summary.cookies.is_empty() {
        let session = SessionData::new(summary.cookies.clone(), chrono::Utc::now());
        if let Err(err) = sessions.set(SESSION_KEY, &session) {
            warn!(error = %err, "Failed to cache portal session");
        }
    }
    info!(
        account = %summary.source_account_identifier,
        contracts = summary.contracts.len(),
        "Harvest complete"
    );
    Ok(summary)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let output = serde_json::json!({
            "source_account_identifier": summary.source_account_identifier,
            "contracts": summary.contracts,
            "recovered": summary.recovered,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Account: {}", summary.source_account_identifier);
    for report in &summary.contracts {
        println!(
            "  {}: {} priced, {} other, {} contract documents",
            report.contract.folder(),
            report.priced,
            report.companion,
            report.contract_documents
        );
    }
    if !summary.recovered.is_empty() {
        println!("Recovered from {} page errors", summary.recovered.len());
    }
    Ok(())
}
