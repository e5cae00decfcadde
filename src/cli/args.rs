//! CLI argument definitions using clap derive

use crate::hash::Phase;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// habitat - hermetic build pipeline and session runtime for autonomous
/// coding agent containers.
#[derive(Parser, Debug)]
#[command(name = "habitat")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// System config layer path
    #[arg(long, global = true, env = "HABITAT_SYSTEM_CONFIG")]
    pub system_config: Option<PathBuf>,

    /// Shared config layer path
    #[arg(long, global = true, env = "HABITAT_SHARED_CONFIG")]
    pub shared_config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (if needed) and launch an ephemeral session for a habitat
    Start(StartArgs),

    /// Build a habitat and run its declared tests, without launching a
    /// session
    Test(TestArgs),

    /// List known habitats and their snapshot state
    List(ListArgs),

    /// Remove stale and orphaned habitat image snapshots
    CleanImages(CleanImagesArgs),

    /// Check engine availability and host state directories
    Status,

    /// Stop a running session
    Stop(StopArgs),

    /// Validate a habitat's merged configuration without building it
    Validate(ValidateArgs),
}

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Habitat config file path
    pub habitat_config: PathBuf,

    /// Force a rebuild starting from this phase onward, even if a later
    /// snapshot would otherwise resume cleanly
    #[arg(long, value_parser = parse_phase)]
    pub rebuild_from: Option<Phase>,

    /// Command to run in place of the habitat's declared entry command
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct TestArgs {
    /// Habitat config file path
    pub habitat_config: PathBuf,

    #[arg(long, value_parser = parse_phase)]
    pub rebuild_from: Option<Phase>,
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Habitat config file path
    pub habitat_config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,
}

#[derive(Parser, Debug)]
pub struct CleanImagesArgs {
    /// Show what would be removed without removing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct StopArgs {
    /// Session ID
    pub session: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Plain,
}

/// Parse a phase name (e.g. "repos") into its `Phase` variant.
fn parse_phase(s: &str) -> Result<Phase, String> {
    Phase::ALL
        .iter()
        .find(|p| p.name() == s)
        .copied()
        .ok_or_else(|| {
            let names: Vec<&str> = Phase::ALL.iter().map(|p| p.name()).collect();
            format!("unknown phase '{s}', expected one of: {}", names.join(", "))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_phase_accepts_known_name() {
        assert_eq!(parse_phase("repos"), Ok(Phase::Repos));
    }

    #[test]
    fn parse_phase_rejects_unknown_name() {
        assert!(parse_phase("bogus").is_err());
    }

    #[test]
    fn cli_parses_start_with_rebuild_from() {
        let cli = Cli::parse_from(["habitat", "start", "habitat.yaml", "--rebuild-from", "setup"]);
        match cli.command {
            Commands::Start(args) => {
                assert_eq!(args.rebuild_from, Some(Phase::Setup));
                assert_eq!(args.habitat_config, PathBuf::from("habitat.yaml"));
            }
            _ => panic!("expected Start command"),
        }
    }

    #[test]
    fn cli_parses_status() {
        let cli = Cli::parse_from(["habitat", "status"]);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn cli_parses_clean_images_dry_run() {
        let cli = Cli::parse_from(["habitat", "clean-images", "--dry-run"]);
        match cli.command {
            Commands::CleanImages(args) => assert!(args.dry_run),
            _ => panic!("expected CleanImages command"),
        }
    }

    #[test]
    fn cli_verbose_levels() {
        let cli = Cli::parse_from(["habitat", "status"]);
        assert_eq!(cli.verbose, 0);
        let cli = Cli::parse_from(["habitat", "-vv", "status"]);
        assert_eq!(cli.verbose, 2);
    }
}
