//! `habitat test` -- build a habitat and run its declared tests, without
//! launching a session.

use crate::cli::args::TestArgs;
use crate::cli::{layer_tools_dir, load_habitat_config, resolve_layer_paths};
use crate::engine::docker::DockerEngine;
use crate::engine::ContainerEngine;
use crate::error::HabitatResult;
use crate::pipeline::{self, PipelineOptions};
use crate::preflight::{self, NoRemedy};
use crate::progress::Reporter;
use console::style;
use std::path::Path;
use std::sync::Arc;

pub async fn execute(
    args: &TestArgs,
    system_config: Option<&Path>,
    shared_config: Option<&Path>,
) -> HabitatResult<()> {
    let mut config = load_habitat_config(system_config, shared_config, &args.habitat_config).await?;
    let engine: Arc<dyn ContainerEngine> = Arc::new(DockerEngine::new());

    preflight::probe_all(&mut config.repos, &NoRemedy).await?;

    let dockerfile_dir = args
        .habitat_config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(".").to_path_buf());

    let (system_path, shared_path) = resolve_layer_paths(system_config, shared_config);
    let system_tools_dir = layer_tools_dir(&system_path);
    let shared_tools_dir = layer_tools_dir(&shared_path);

    let reporter = Reporter::new();
    let options = PipelineOptions {
        habitat_name: config.name.clone(),
        config: &config,
        dockerfile_dir: &dockerfile_dir,
        files_base_dir: &dockerfile_dir,
        system_tools_dir: system_tools_dir.as_deref(),
        shared_tools_dir: shared_tools_dir.as_deref(),
        forced_floor: args.rebuild_from,
    };
    pipeline::run(engine, options, &reporter).await?;
    drop(reporter);

    println!(
        "{} habitat '{}' built and all declared tests passed",
        style("✓").green(),
        config.name
    );
    Ok(())
}
