//! `habitat validate` -- load and validate a config without building it.

use crate::cli::args::ValidateArgs;
use crate::cli::load_habitat_config;
use crate::error::HabitatResult;
use console::style;

pub async fn execute(
    args: &ValidateArgs,
    system_config: Option<&std::path::Path>,
    shared_config: Option<&std::path::Path>,
) -> HabitatResult<()> {
    let config = load_habitat_config(system_config, shared_config, &args.habitat_config).await?;
    println!("{} habitat '{}' is valid", style("✓").green(), config.name);
    println!("  workdir: {}", config.workdir().unwrap_or("<unset>"));
    println!("  user: {}", config.user().unwrap_or("<unset>"));
    println!("  repos: {}", config.repos.len());
    println!("  required files: {}", config.verify_fs.required_files.len());
    Ok(())
}
