//! token-snapshot - Multi-chain Token Metadata Aggregator
//!
//! Refreshes the static token snapshot from CoinGecko and Alchemy.

use std::collections::BTreeSet;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use token_snapshot::adapters::cli::{self, ChainsCmd, Command, RunCmd};
use token_snapshot::adapters::{AlchemyClient, AlchemyConfig, CoinGeckoClient, CoinGeckoConfig, FsSnapshotStore};
use token_snapshot::application::{CoordinatorConfig, RunCoordinator};
use token_snapshot::config::{load_config, read_config, Config};
use token_snapshot::domain::{RunOutcome, RunReport};
use token_snapshot::ports::TokenProvider;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if it exists (API keys go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = cli::init();

    match app.command {
        Command::Run(cmd) => run_command(cmd, app.verbose, app.debug).await,
        Command::Chains(cmd) => chains_command(cmd, app.verbose, app.debug),
    }
}

/// CLI flags win, then RUST_LOG, then the config's logging.level
fn init_logging(verbose: bool, debug: bool, configured: &str) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    };

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_command(cmd: RunCmd, verbose: bool, debug: bool) -> Result<ExitCode> {
    let mut config = load_config(&cmd.config)
        .with_context(|| format!("Failed to load configuration from {}", cmd.config.display()))?;
    init_logging(verbose, debug, &config.logging.level);

    if let Some(name) = &cmd.chain {
        config.only_chain(name)?;
        tracing::info!("Restricting run to chain '{}'", name);
    }

    let output = cmd.output.clone().unwrap_or_else(|| config.output.dir_path());
    tracing::info!("Starting token snapshot refresh into {}", output.display());

    let coordinator = Arc::new(build_coordinator(&config, &output, cmd.chain.is_some())?);

    // Setup Ctrl+C handler
    let coord = Arc::clone(&coordinator);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
        coord.stop().await;
    });

    let report = coordinator.run().await;
    print_summary(&report);

    if let Some(path) = &cmd.report {
        write_report(&report, path)?;
    }

    Ok(match report.outcome {
        RunOutcome::Failed => ExitCode::FAILURE,
        RunOutcome::Succeeded | RunOutcome::SucceededWithWarnings => ExitCode::SUCCESS,
    })
}

fn build_coordinator(config: &Config, output: &Path, filtered: bool) -> Result<RunCoordinator> {
    // Keys were checked by Config::validate
    let coingecko_key = config.coingecko.get_api_key().unwrap_or_default();
    let alchemy_key = config.alchemy.get_api_key().unwrap_or_default();

    let coingecko = CoinGeckoClient::with_config(CoinGeckoConfig::from_section(
        &config.coingecko,
        coingecko_key,
        &config.chains,
    ))
    .context("Failed to create CoinGecko client")?;

    let alchemy = AlchemyClient::with_config(AlchemyConfig::from_section(
        &config.alchemy,
        alchemy_key,
        &config.chains,
    ))
    .context("Failed to create Alchemy client")?;

    // Logo downloads share CoinGecko's rate limiter
    let coingecko = Arc::new(coingecko);
    let providers: Vec<Arc<dyn TokenProvider>> = vec![coingecko.clone(), Arc::new(alchemy)];
    let store = Arc::new(FsSnapshotStore::new(output));

    let chain_filter = filtered.then(|| config.chains.iter().map(|c| c.chain_id).collect::<BTreeSet<u64>>());
    let coordinator_config = CoordinatorConfig {
        max_tokens_per_chain: config.output.max_tokens_per_chain,
        chain_filter,
    };

    let coordinator = RunCoordinator::new(providers, store, coordinator_config);
    Ok(if config.output.download_logos {
        coordinator.with_logo_source(coingecko)
    } else {
        coordinator
    })
}

fn print_summary(report: &RunReport) {
    println!("Token snapshot: {:?}", report.outcome);
    println!("  Reconciled: {}", report.reconciled());
    println!("  Created:    {}", report.created);
    println!("  Updated:    {}", report.updated);
    println!("  Unchanged:  {}", report.unchanged);
    println!("  Skipped:    {}", report.skipped);
    println!("  Failed:     {}", report.failed);
    println!("  Malformed:  {}", report.malformed);
    if report.lookup_failures > 0 {
        println!("  Failed lookups: {}", report.lookup_failures);
    }
    if report.logos_written + report.logo_failures > 0 {
        println!("  Logos:      {} written, {} failed", report.logos_written, report.logo_failures);
    }

    for failure in &report.provider_failures {
        println!("  Provider {} failed ({}): {}", failure.provider, failure.kind, failure.message);
    }
    for failure in &report.write_failures {
        println!("  Write {} failed: {}", failure.token, failure.message);
    }
    if let Some(error) = &report.error {
        println!("  Error: {}", error);
    }
    println!("  Changes to publish: {}", if report.has_changes() { "yes" } else { "no" });
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let mut content = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    content.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("Failed to write report to {}", path.display()))?;
    tracing::info!("Run report written to {}", path.display());
    Ok(())
}

fn chains_command(cmd: ChainsCmd, verbose: bool, debug: bool) -> Result<ExitCode> {
    let config = read_config(&cmd.config)
        .with_context(|| format!("Failed to read configuration from {}", cmd.config.display()))?;
    init_logging(verbose, debug, &config.logging.level);

    println!("{:<22} {:>8}  {:<24} {}", "NAME", "CHAIN ID", "COINGECKO PLATFORM", "ALCHEMY NETWORK");
    for chain in &config.chains {
        println!(
            "{:<22} {:>8}  {:<24} {}",
            chain.name,
            chain.chain_id,
            chain.coingecko_platform,
            chain.alchemy_network.as_deref().unwrap_or("-")
        );
    }
    Ok(ExitCode::SUCCESS)
}
