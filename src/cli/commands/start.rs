//! `habitat start` -- build (if needed) and launch an ephemeral session.

use crate::cli::args::StartArgs;
use crate::cli::{layer_tools_dir, load_habitat_config, resolve_layer_paths};
use crate::engine::docker::DockerEngine;
use crate::engine::{ContainerEngine, VolumeSpec};
use crate::error::HabitatResult;
use crate::paths::final_tag;
use crate::pipeline::{self, PipelineOptions};
use crate::preflight::{self, NoRemedy};
use crate::progress::Reporter;
use crate::session::{self, LaunchSpec};
use crate::state::record_last_used;
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(
    args: &StartArgs,
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
    let tag = pipeline::run(engine.clone(), options, &reporter).await?;
    drop(reporter);

    crate::janitor::spawn_background(engine.clone(), [config.name.clone()].into_iter().collect());
    record_last_used(&config.name).await?;

    let workdir = config.workdir().unwrap_or("/workspace").to_string();
    let command = if args.command.is_empty() {
        config.entry.command.clone()
    } else {
        args.command.clone()
    };
    let volumes = config
        .volumes
        .iter()
        .map(|v| VolumeSpec {
            host_path: v.source.clone(),
            container_path: v.dest.clone(),
            readonly: v.readonly,
        })
        .collect();

    let spec = LaunchSpec {
        habitat_name: config.name.clone(),
        image_tag: tag,
        workdir,
        user: config.user().map(str::to_string),
        env: config.env.clone(),
        volumes,
        init_command: config.entry.init_command.clone(),
        startup_delay: Duration::from_secs(config.entry.startup_delay),
        command,
    };

    let mut guard = session::launch(engine, spec).await?;
    println!(
        "{} session {} ready for habitat '{}'",
        style("✓").green(),
        guard.session().id,
        config.name
    );

    let result = tokio::select! {
        attach_result = guard.attach() => attach_result,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{} interrupted, cleaning up session", style("!").yellow());
            Ok(130)
        }
    };

    guard.cleanup().await?;

    match result {
        Ok(code) if code != 0 => std::process::exit(code),
        Ok(_) => Ok(()),
        Err(err) => Err(err),
    }
}
