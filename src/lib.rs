pub mod app;
pub mod camera;
pub mod dispatch;
pub mod error;
pub mod extraction;
pub mod metrics;
pub mod models;
pub mod sensing;
pub mod settings;
pub mod store;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};

use settings::AppConfig;

fn cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("JSON configuration file.")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value("config.json"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Verify output directories and the model backend, then exit.")
                .action(ArgAction::SetTrue),
        )
}

pub fn run() -> Result<()> {
    let matches = cli().get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let check_only = matches.get_flag("check");

    let config = AppConfig::load(&config_path)?;
    utils::logging::init(&config.output.log_file)?;

    log::info!(
        "docucam {} starting with {}",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("docucam-rt")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        if check_only {
            let status = app::check(&config).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !status.model_loaded {
                anyhow::bail!("model {} is not served", status.model_name);
            }
            return Ok::<(), anyhow::Error>(());
        }

        let summary = app::run(config).await?;
        log::info!("docucam stopped - {}", summary.stats);
        Ok::<(), anyhow::Error>(())
    })
}
