//! zerocert - Main entry point
//!
//! Issues certificates for every configured entry, or renews the persisted
//! ones with `--renew`.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tracing::info;

use zerocert::{metrics_server, Orchestrator, ProcessHookRunner, RunReport, ZeroSslConnector};
use zerocert_common::{init_tracing, CertMetrics};
use zerocert_config::Config;

/// zerocert - ZeroSSL IP certificate issuer
#[derive(Parser, Debug)]
#[command(name = "zerocert")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "ZEROCERT_CONFIG")]
    config: Option<String>,

    /// Renew persisted certificates instead of issuing new ones
    #[arg(long = "renew")]
    renew: bool,

    /// Test configuration and exit
    #[arg(short = 't', long = "test")]
    test: bool,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let Some(config_path) = cli.config.as_deref() else {
        eprintln!("zerocert: no configuration file given");
        // Help output is best effort
        let _ = Cli::command().print_help();
        return Ok(ExitCode::FAILURE);
    };

    let log_level = if cli.verbose { "debug" } else { "info" };

    if cli.test {
        return test_config(config_path, log_level);
    }

    run(config_path, cli.renew, log_level)
}

/// Load and validate the configuration, then exit
fn test_config(config_path: &str, log_level: &str) -> Result<ExitCode> {
    init_tracing(log_level).context("Failed to initialize logging")?;

    info!(config = %config_path, "Testing configuration file");
    let config = Config::from_file(config_path).context("Failed to load configuration file")?;
    let findings = config.check();

    println!("zerocert: configuration file {} test is successful", config_path);
    println!("  - data directory: {}", config.data_dir.display());
    println!("  - {} certificate(s)", config.cert_configs.len());
    for warning in findings.warnings() {
        println!("  - warning: {}", warning);
    }

    Ok(ExitCode::SUCCESS)
}

/// Run one issue or renew pass
fn run(config_path: &str, renew: bool, log_level: &str) -> Result<ExitCode> {
    // Installed first so that configuration warnings are visible
    let logging = init_tracing(log_level).context("Failed to initialize logging")?;

    let config = Config::from_file(config_path).context("Failed to load configuration file")?;

    fs::create_dir_all(&config.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.data_dir.display()
        )
    })?;

    if let Some(log_file) = config.log_file.as_deref() {
        logging
            .redirect_to_file(log_file)
            .context("Failed to open log file")?;
    }

    info!(
        config = %config_path,
        data_dir = %config.data_dir.display(),
        certs = config.cert_configs.len(),
        mode = if renew { "renew" } else { "issue" },
        "Starting zerocert"
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let report = runtime.block_on(async {
        let metrics = Arc::new(CertMetrics::new().context("Failed to register metrics")?);
        let _metrics_server = metrics_server::spawn(config.metrics_port, metrics.clone());

        let connector = Arc::new(
            ZeroSslConnector::new(&config.ca_api_url).context("Failed to create CA client")?,
        );
        let mut orchestrator =
            Orchestrator::new(&config, connector, Arc::new(ProcessHookRunner), metrics);

        let report = if renew {
            orchestrator.renew_all().await
        } else {
            orchestrator.issue_all().await
        };
        Ok::<RunReport, anyhow::Error>(report)
    })?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
