//! `stagectl` - command-line control of OptoSigma stage controllers.
//!
//! Each invocation loads the controller configuration, opens one session, runs a single
//! command and closes the session again.
//!
//! # Usage
//!
//! ```bash
//! stagectl --family shrc203 --resource ASRL3::INSTR move 10000 --axis X --speed 500,5000,200
//! stagectl --config stage.toml position --axis Y
//! STAGECTL_RESOURCE=/dev/ttyUSB0 stagectl --config stage.toml stop --all
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use stage_core::{ControllerConfig, MotionController};
use stage_driver_optosigma::ControllerFactory;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = cli.load_config()?;
    let command = cli.command;
    let output = tokio::task::spawn_blocking(move || run(&config, &command))
        .await
        .context("Controller worker failed")??;

    println!("{output}");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &ControllerConfig, command: &Command) -> Result<String> {
    let mut controller = ControllerFactory::serial()
        .build(config)
        .with_context(|| format!("Failed to connect to {} on {}", config.family, config.resource))?;
    let result = cli::execute(&mut controller, command);
    controller.close();
    result
}
