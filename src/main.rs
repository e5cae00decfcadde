//! habitat - hermetic build pipeline and session runtime
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use habitat::cli::args::{Cli, Commands};
use habitat::error::HabitatResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> HabitatResult<()> {
    let cli = Cli::parse();

    // Verbosity: 0 = warn (progress lines only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("habitat=warn"),
        1 => EnvFilter::new("habitat=info"),
        _ => EnvFilter::new("habitat=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let system_config = cli.system_config.as_deref();
    let shared_config = cli.shared_config.as_deref();

    match cli.command {
        Commands::Start(args) => habitat::cli::commands::start(&args, system_config, shared_config).await,
        Commands::Test(args) => habitat::cli::commands::test(&args, system_config, shared_config).await,
        Commands::List(args) => habitat::cli::commands::list(&args).await,
        Commands::CleanImages(args) => habitat::cli::commands::clean_images(&args).await,
        Commands::Status => habitat::cli::commands::status().await,
        Commands::Stop(args) => habitat::cli::commands::stop(&args).await,
        Commands::Validate(args) => habitat::cli::commands::validate(&args, system_config, shared_config).await,
    }
}
