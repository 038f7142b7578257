use clap::Parser;
use tracing_subscriber::EnvFilter;

use edgeflow_pipeline::{priority, PipelineConfig};

mod cli;

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    tracing::info!("edgeflow v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(device) = cli.device {
        config.device_id = device;
    }
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }

    match cli.command {
        Command::Run { input, format } => {
            if let Err(e) = priority::apply(&config.priority) {
                tracing::warn!(error = %e, "could not raise process priority");
            }
            cli::run_inputs(&config, &input, format)?;
        }
        Command::Inspect { model } => {
            cli::inspect_model(&config, &model)?;
        }
        Command::SimModel {
            path,
            outputs,
            width,
            height,
        } => {
            cli::write_sim_model(&path, width, height, &outputs)?;
        }
    }

    Ok(())
}
