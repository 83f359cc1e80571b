//! cloudgauged — the cloudgauge exporter daemon.
//!
//! Single binary that assembles the exporter:
//! - Snapshot cache (in memory)
//! - Endpoint catalog + prober
//! - Collector loop
//! - TTL reaper (when `cache_ttl` is set)
//! - HTTP scrape API
//!
//! # Usage
//!
//! ```text
//! cloudgauged serve --config /etc/cloudgauge/cloudgauge.toml
//! cloudgauged check-config --config cloudgauge.toml
//! ```

mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cloudgauge_core::ExporterConfig;

#[derive(Parser)]
#[command(name = "cloudgauged", about = "cloudgauge multi-cloud metrics exporter")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the exporter.
    Serve {
        /// Path to cloudgauge.toml.
        #[arg(long, default_value = "cloudgauge.toml")]
        config: PathBuf,

        /// Listen address, overrides `server.listen`.
        #[arg(long)]
        listen: Option<String>,

        /// Collect only this cloud, overrides `collection.default_cloud`.
        #[arg(long)]
        cloud: Option<String>,

        /// Do not poll this service. Repeatable.
        #[arg(long = "disable-service")]
        disable_service: Vec<String>,
    },

    /// Validate a config file and print what would be collected.
    CheckConfig {
        #[arg(long, default_value = "cloudgauge.toml")]
        config: PathBuf,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cloudgauged=debug,cloudgauge=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            config,
            listen,
            cloud,
            disable_service,
        } => {
            serve::run(serve::ServeOptions {
                config,
                listen,
                cloud,
                disabled_services: disable_service,
            })
            .await
        }
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn check_config(path: &std::path::Path) -> anyhow::Result<()> {
    let config = ExporterConfig::from_file(path)?;

    println!("config {} is valid", path.display());
    println!("listen:        {}", config.server.listen);
    println!("interval:      {:?}", config.collection.interval()?);
    match config.collection.cache_ttl()? {
        Some(ttl) => println!(
            "cache ttl:     {ttl:?} (reaped every {:?})",
            config.collection.reap_interval()?
        ),
        None => println!("cache ttl:     none"),
    }
    match &config.collection.default_cloud {
        Some(cloud) => println!("mode:          single cloud ({cloud})"),
        None => println!("mode:          discovery"),
    }

    let enabled = config.enabled_services();
    println!("services:      {}", enabled.iter().collect::<Vec<_>>().join(", "));
    for cloud in &config.clouds {
        println!("cloud {}", cloud.name);
        for svc in &cloud.services {
            let state = if enabled.contains(&svc.name) { "" } else { " (disabled)" };
            println!("  {} http://{}{}{state}", svc.name, svc.address, svc.path);
        }
    }
    Ok(())
}
