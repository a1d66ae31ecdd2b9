use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use elon_runtime::{DirectFactory, LifecycleController, Registry};
use tracing_subscriber::{EnvFilter, fmt};

mod signals;

use signals::ShutdownSignals;

#[derive(Parser)]
#[command(name = "elon", about = "elon -- runs one routing engine instance until signalled")]
struct Cli {
    /// Base64 encoded configuration
    #[arg(short = 'c', value_name = "BASE64", env = "ELON_CONFIG", hide_env_values = true)]
    config: Option<String>,

    /// Show version information
    #[arg(long)]
    version: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only the status lines.
    fmt()
        .with_env_filter(EnvFilter::from_env("ELON_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let controller = LifecycleController::new(Arc::new(Registry::new()), Arc::new(DirectFactory));

    if cli.version {
        println!("elon version: {}\n", controller.version_info().version);
        return ExitCode::SUCCESS;
    }

    let Some(config) = cli.config else {
        eprintln!("Error: -c with base64 configuration is required");
        eprintln!("{}", Cli::command().render_usage());
        return ExitCode::FAILURE;
    };

    match run(&controller, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(controller: &LifecycleController, config: &str) -> Result<()> {
    let mut signals = ShutdownSignals::install().context("failed to install signal handlers")?;

    let handle = controller.start_base64(config).await?;
    println!("elon instance started with ID: {handle}");

    let signal = signals.recv().await;
    tracing::info!(signal, handle, "Termination signal received");
    println!("Shutting down...");

    controller
        .stop(handle)
        .await
        .context("error stopping instance")?;

    println!("Gracefully stopped");
    Ok(())
}
