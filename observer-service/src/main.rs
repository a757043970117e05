use std::path::PathBuf;

use clap::Parser;

mod config;
mod logging;
mod notify;
mod sensor;
mod service;

use crate::config::{Config, RawConfig};

#[derive(Parser, Debug)]
#[command(about, author = "Danilo Bargen", version)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Post a single test alert and exit
    #[arg(long)]
    test_alert: bool,

    /// Print an example config file and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.example_config {
        print!("{}", toml::to_string(&RawConfig::example())?);
        return Ok(());
    }

    // Parse config
    let raw_config = match RawConfig::load(&args.config) {
        Ok(val) => val,
        Err(e) => {
            println!("Error: Failed to load config: {:#}", e);
            println!();
            println!(
                "Example config:\n\n{}",
                toml::to_string(&RawConfig::example())?
            );
            return Ok(());
        }
    };
    let config: Config = raw_config.try_into()?;

    logging::init_logging(&config.logging)?;
    tracing::info!(
        dark = config.monitor.thresholds.dark(),
        bright = config.monitor.thresholds.bright(),
        slot = config.monitor.alert.slot().0,
        "Starting light observer"
    );

    if args.test_alert {
        service::send_test_alert(config).await
    } else {
        service::run(config).await
    }
}
