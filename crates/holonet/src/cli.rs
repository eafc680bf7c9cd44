//! Exposes the command line application.
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use holonet_service::config::Config;
use holonet_service::metrics;
use holonet_service::services::SharedServices;

use crate::healthcheck;
use crate::logging;
use crate::server;

/// Holonet commands.
#[derive(Subcommand)]
enum Command {
    /// Run the web server.
    Run,

    /// Run the vehicle ETL once and print the result as JSON.
    Etl,

    /// Check the health of a running web server.
    Healthcheck {
        /// Address of the server, defaults to the configured `bind` address.
        #[arg(long)]
        addr: Option<SocketAddr>,

        /// Request timeout in seconds.
        #[arg(long, default_value_t = 5)]
        timeout: u64,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "holonet", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No other threads have been started yet.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure metrics")?;
    }

    match cli.command {
        Command::Run => server::run(config).context("failed to start the server")?,
        Command::Etl => run_etl(&config).context("failed to run the ETL")?,
        Command::Healthcheck { addr, timeout } => {
            healthcheck::healthcheck(&config, addr, timeout)?
        }
    }

    Ok(())
}

fn run_etl(config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("holonet-etl")
        .enable_all()
        .build()?;

    let services = SharedServices::new(config)?;
    let vehicles = runtime.block_on(services.etl.run())?;

    println!("{}", serde_json::to_string_pretty(&vehicles)?);
    Ok(())
}
