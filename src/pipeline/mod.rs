//! The 12-phase build pipeline (C8).
//!
//! Phases run in a single working container, threaded from whatever
//! snapshot the resume algorithm lands on through to `final`. Each
//! completed phase is committed to its own tag before the next phase
//! starts, so a later `rebuild-from` or config edit can resume from any
//! earlier point without redoing finished work.

pub mod executor;
pub mod materialize;
pub mod repo;

use crate::config::schema::BaseSpec;
use crate::config::HabitatConfig;
use crate::engine::snapshot::{find_resume_point, SnapshotStore};
use crate::engine::{ContainerEngine, ContainerSpec};
use crate::error::{HabitatError, HabitatResult, PhaseErrorKind};
use crate::hash::Phase;
use crate::paths::final_tag;
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bound on concurrent repo clones within phase 8, matching the
/// worker-pool pattern the teacher uses for parallel cloud-credential
/// fetches.
const MAX_PARALLEL_CLONES: usize = 4;

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Start { phase: Phase },
    Reuse { phase: Phase },
    Run { phase: Phase },
    Done { phase: Phase, duration: Duration },
    Fail { phase: Phase, error: String },
}

/// Receives pipeline events synchronously as they happen. Implementations
/// must not block for long -- this is called inline on the pipeline's own
/// async task.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// An `EventSink` that drops every event, for callers (tests, `habitat
/// config validate`) that don't want progress output.
pub struct NullSink;
impl EventSink for NullSink {
    fn emit(&self, _event: PipelineEvent) {}
}

pub struct PipelineOptions<'a> {
    pub habitat_name: String,
    pub config: &'a HabitatConfig,
    pub dockerfile_dir: &'a Path,
    pub files_base_dir: &'a Path,
    /// Directory holding the `system` layer's `tools/` subdirectory, if
    /// that layer's config file exists.
    pub system_tools_dir: Option<&'a Path>,
    /// Directory holding the `shared` layer's `tools/` subdirectory, if
    /// that layer's config file exists.
    pub shared_tools_dir: Option<&'a Path>,
    pub forced_floor: Option<Phase>,
}

/// Resolves a tool name's `source_layer` provenance to the host directory
/// its install script lives under.
struct ToolDirs<'a> {
    system: Option<&'a Path>,
    shared: Option<&'a Path>,
    habitat: &'a Path,
}

impl<'a> ToolDirs<'a> {
    fn for_layer(&self, layer: crate::error::SourceLayer) -> Option<&'a Path> {
        match layer {
            crate::error::SourceLayer::System => self.system,
            crate::error::SourceLayer::Shared => self.shared,
            crate::error::SourceLayer::Habitat => Some(self.habitat),
        }
    }
}

/// Run the pipeline end to end, returning the final image tag.
pub async fn run(
    engine: Arc<dyn ContainerEngine>,
    options: PipelineOptions<'_>,
    sink: &dyn EventSink,
) -> HabitatResult<String> {
    let (hashes, resume) = find_resume_point(
        engine.clone(),
        &options.habitat_name,
        options.config,
        options.forced_floor,
    )
    .await?;
    let store = SnapshotStore::new(engine.clone());

    if let Some((Phase::Final, tag)) = &resume {
        for (phase, _) in hashes.iter() {
            sink.emit(PipelineEvent::Reuse { phase: *phase });
        }
        return Ok(tag.clone());
    }

    let (start_index, container_id) = match &resume {
        Some((phase, tag)) => {
            for (p, _) in hashes.iter().take(phase.id() as usize + 1) {
                sink.emit(PipelineEvent::Reuse { phase: *p });
            }
            let spec = ContainerSpec {
                image: tag.clone(),
                workdir: None,
                user: None,
                env: vec![],
                volumes: vec![],
                tty: false,
                command: vec![],
            };
            let id = engine.create(&spec).await?;
            engine.start(&id).await?;
            (phase.id() as usize + 1, id)
        }
        None => {
            let tag = format!("habitat-build-{}", &options.habitat_name);
            let id = build_base(engine.as_ref(), options.config, options.dockerfile_dir, &tag).await?;
            (0, id)
        }
    };

    let tool_dirs = ToolDirs {
        system: options.system_tools_dir,
        shared: options.shared_tools_dir,
        habitat: options.files_base_dir,
    };

    let mut container_id = container_id;
    for phase in Phase::ALL.iter().skip(start_index) {
        let phase = *phase;
        sink.emit(PipelineEvent::Start { phase });
        let started = Instant::now();
        sink.emit(PipelineEvent::Run { phase });

        if let Err(err) = run_phase(
            engine.as_ref(),
            &container_id,
            options.config,
            options.files_base_dir,
            &tool_dirs,
            phase,
        )
        .await
        {
            sink.emit(PipelineEvent::Fail {
                phase,
                error: err.to_string(),
            });
            return Err(err);
        }

        let tag = store
            .commit_phase(&options.habitat_name, &container_id, phase, &hashes)
            .await?;
        sink.emit(PipelineEvent::Done {
            phase,
            duration: started.elapsed(),
        });

        if phase != Phase::Final {
            engine.remove_container(&container_id).await?;
            let spec = ContainerSpec {
                image: tag,
                workdir: None,
                user: None,
                env: vec![],
                volumes: vec![],
                tty: false,
                command: vec![],
            };
            container_id = engine.create(&spec).await?;
            engine.start(&container_id).await?;
        }
    }

    engine.remove_container(&container_id).await?;
    Ok(final_tag(&options.habitat_name))
}

async fn build_base(
    engine: &dyn ContainerEngine,
    config: &HabitatConfig,
    dockerfile_dir: &Path,
    tag: &str,
) -> HabitatResult<String> {
    let image = match &config.base {
        BaseSpec::Image(image) => {
            engine.ensure_image(image).await?;
            image.clone()
        }
        BaseSpec::Dockerfile(path) => {
            let dockerfile_path = dockerfile_dir.join(path);
            engine.build_from_dockerfile(&dockerfile_path, tag).await?;
            tag.to_string()
        }
    };
    let spec = ContainerSpec {
        image,
        workdir: None,
        user: None,
        env: vec![],
        volumes: vec![],
        tty: false,
        command: vec![],
    };
    let id = engine.create(&spec).await?;
    engine.start(&id).await?;
    Ok(id)
}

async fn run_phase(
    engine: &dyn ContainerEngine,
    container_id: &str,
    config: &HabitatConfig,
    files_base_dir: &Path,
    tool_dirs: &ToolDirs<'_>,
    phase: Phase,
) -> HabitatResult<()> {
    match phase {
        Phase::Base => Ok(()),
        Phase::Users => run_users(engine, container_id, config).await,
        Phase::Env => executor::write_env_profile(engine, container_id, &config.env).await,
        Phase::Workdir => run_workdir(engine, container_id, config).await,
        Phase::Habitat => run_habitat_marker(engine, container_id, config).await,
        Phase::Files => run_files(engine, container_id, files_base_dir, config).await,
        Phase::Setup => run_setup(engine, container_id, config).await,
        Phase::Repos => run_repos(engine, container_id, config).await,
        Phase::Tools => run_tools(engine, container_id, tool_dirs, config).await,
        Phase::Verify => run_verify(engine, container_id, config).await,
        Phase::Test => run_tests(engine, container_id, config).await,
        Phase::Final => Ok(()),
    }
}

async fn run_users(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    let Some(user) = config.user() else {
        return Ok(());
    };
    let command = format!("id -u {user} >/dev/null 2>&1 || useradd -m -s /bin/bash {user}");
    executor::run_phase_command(engine, container_id, &command, None, Phase::Users, PhaseErrorKind::Exec).await
}

async fn run_workdir(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    let Some(workdir) = config.workdir() else {
        return Ok(());
    };
    let owner = config.user().unwrap_or("root");
    let command = format!("mkdir -p {workdir} && chown {owner} {workdir}");
    executor::run_phase_command(engine, container_id, &command, None, Phase::Workdir, PhaseErrorKind::Exec).await
}

async fn run_habitat_marker(
    engine: &dyn ContainerEngine,
    container_id: &str,
    config: &HabitatConfig,
) -> HabitatResult<()> {
    let command = format!("mkdir -p /etc/habitat && echo {} > /etc/habitat/name", config.name);
    executor::run_phase_command(engine, container_id, &command, None, Phase::Habitat, PhaseErrorKind::Exec).await
}

async fn run_files(
    engine: &dyn ContainerEngine,
    container_id: &str,
    files_base_dir: &Path,
    config: &HabitatConfig,
) -> HabitatResult<()> {
    for op in &config.files {
        materialize::materialize_file(engine, container_id, files_base_dir, op).await?;
    }
    for volume in &config.volumes {
        let command = format!("mkdir -p {}", volume.dest);
        executor::run_phase_command(engine, container_id, &command, None, Phase::Files, PhaseErrorKind::Fileop).await?;
    }
    Ok(())
}

async fn run_setup(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    for script in &config.scripts {
        executor::run_script(engine, container_id, script, Phase::Setup).await?;
    }
    Ok(())
}

async fn run_repos(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    let results: Vec<HabitatResult<()>> = stream::iter(config.repos.iter())
        .map(|repo| async move { repo::clone_repo(engine, container_id, repo).await })
        .buffer_unordered(MAX_PARALLEL_CLONES)
        .collect()
        .await;
    for result in results {
        result?;
    }
    Ok(())
}

/// Install every `tools[]` entry: each name resolves via its declared
/// `source_layer` to a host `tools/<name>.sh` script, copied into the
/// container and run as the habitat's user.
async fn run_tools(
    engine: &dyn ContainerEngine,
    container_id: &str,
    tool_dirs: &ToolDirs<'_>,
    config: &HabitatConfig,
) -> HabitatResult<()> {
    for tool in &config.tools {
        install_tool(engine, container_id, tool_dirs, config, tool).await?;
    }
    Ok(())
}

async fn install_tool(
    engine: &dyn ContainerEngine,
    container_id: &str,
    tool_dirs: &ToolDirs<'_>,
    config: &HabitatConfig,
    tool: &crate::config::schema::ToolEntry,
) -> HabitatResult<()> {
    let Some(dir) = tool_dirs.for_layer(tool.source_layer) else {
        return Err(HabitatError::PhaseFailed {
            phase_id: Phase::Tools.id(),
            phase_name: "tools".to_string(),
            kind: PhaseErrorKind::Fileop,
            message: format!(
                "tool '{}' declared in {} layer but that layer's tools directory isn't configured",
                tool.name, tool.source_layer
            ),
            stdout: String::new(),
            stderr: String::new(),
        });
    };
    let host_path = dir.join("tools").join(format!("{}.sh", tool.name));
    let content = tokio::fs::read(&host_path)
        .await
        .map_err(|e| HabitatError::io(format!("reading tool script {}", host_path.display()), e))?;

    let dest = format!("/tmp/habitat-tool-{}.sh", tool.name);
    let encoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&content)
    };
    let write_command = format!("echo {encoded} | base64 -d > {dest} && chmod 755 {dest}");
    executor::run_phase_command(engine, container_id, &write_command, None, Phase::Tools, PhaseErrorKind::Fileop)
        .await?;

    executor::run_phase_command(engine, container_id, &dest, config.user(), Phase::Tools, PhaseErrorKind::Exec).await?;

    let cleanup_command = format!("rm -f {dest}");
    executor::run_phase_command(engine, container_id, &cleanup_command, None, Phase::Tools, PhaseErrorKind::Fileop).await
}

async fn run_verify(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    for required in &config.verify_fs.required_files {
        let result = engine
            .exec(container_id, &["test".into(), "-e".into(), required.clone()], None, None)
            .await?;
        if !result.success() {
            return Err(HabitatError::VerifyFailed(required.clone()));
        }
    }
    Ok(())
}

async fn run_tests(engine: &dyn ContainerEngine, container_id: &str, config: &HabitatConfig) -> HabitatResult<()> {
    let user = config.user();
    for test in &config.tests {
        executor::run_phase_command(engine, container_id, test, user, Phase::Test, PhaseErrorKind::Test).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EntryPoint, VerifyFs};
    use crate::engine::ExecResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every command it was asked to run; `test -e` succeeds only
    /// for paths in `existing_paths`, everything else succeeds.
    struct MockEngine {
        existing_paths: Vec<String>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ContainerEngine for MockEngine {
        async fn is_available(&self) -> HabitatResult<bool> {
            Ok(true)
        }
        async fn build_from_dockerfile(&self, _: &Path, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        async fn ensure_image(&self, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        async fn create(&self, _: &ContainerSpec) -> HabitatResult<String> {
            Ok("mock-container".to_string())
        }
        async fn start(&self, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        async fn exec(
            &self,
            _container_id: &str,
            command: &[String],
            _user: Option<&str>,
            _workdir: Option<&str>,
        ) -> HabitatResult<ExecResult> {
            self.calls.lock().unwrap().push(command.to_vec());
            if command.first().map(String::as_str) == Some("test") {
                let path = command.get(2).cloned().unwrap_or_default();
                return Ok(ExecResult {
                    exit_code: if self.existing_paths.contains(&path) { 0 } else { 1 },
                    stdout: String::new(),
                    stderr: String::new(),
                });
            }
            Ok(ExecResult {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
        async fn commit(&self, _: &str, _: &str, _: &HashMap<String, String>) -> HabitatResult<()> {
            Ok(())
        }
        async fn stop(&self, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        async fn remove_container(&self, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        async fn attach(&self, _: &str, _: &[String], _: Option<&str>, _: Option<&str>, _: bool) -> HabitatResult<i32> {
            Ok(0)
        }
        async fn is_running(&self, _: &str) -> HabitatResult<bool> {
            Ok(true)
        }
        async fn image_exists(&self, _: &str) -> HabitatResult<bool> {
            Ok(false)
        }
        async fn image_labels(&self, _: &str) -> HabitatResult<Option<HashMap<String, String>>> {
            Ok(None)
        }
        async fn image_list_prefixed(&self, _: &str) -> HabitatResult<Vec<String>> {
            Ok(vec![])
        }
        async fn image_remove(&self, _: &str) -> HabitatResult<()> {
            Ok(())
        }
        fn engine_name(&self) -> &'static str {
            "mock"
        }
    }

    fn sample_config(required_files: Vec<&str>) -> HabitatConfig {
        HabitatConfig {
            name: "demo".into(),
            base: BaseSpec::Image("fedora:41".into()),
            env: vec![("WORKDIR".into(), "/workspace".into()), ("USER".into(), "agent".into())],
            files: vec![],
            volumes: vec![],
            scripts: vec![],
            repos: vec![],
            verify_fs: VerifyFs {
                required_files: required_files.into_iter().map(String::from).collect(),
            },
            tools: vec![],
            tests: vec![],
            entry: EntryPoint::default(),
        }
    }

    #[tokio::test]
    async fn run_verify_passes_when_all_required_files_exist() {
        let engine = MockEngine {
            existing_paths: vec!["/usr/bin/git".to_string()],
            calls: Mutex::new(vec![]),
        };
        let config = sample_config(vec!["/usr/bin/git"]);
        assert!(run_verify(&engine, "c", &config).await.is_ok());
    }

    #[tokio::test]
    async fn run_verify_fails_when_a_required_file_is_missing() {
        let engine = MockEngine {
            existing_paths: vec![],
            calls: Mutex::new(vec![]),
        };
        let config = sample_config(vec!["/usr/bin/git"]);
        let err = run_verify(&engine, "c", &config).await.unwrap_err();
        assert!(matches!(err, HabitatError::VerifyFailed(_)));
    }

    #[tokio::test]
    async fn run_users_creates_declared_user() {
        let engine = MockEngine {
            existing_paths: vec![],
            calls: Mutex::new(vec![]),
        };
        let config = sample_config(vec![]);
        run_users(&engine, "c", &config).await.unwrap();
        let calls = engine.calls.lock().unwrap();
        assert!(calls.iter().any(|c| c.join(" ").contains("useradd")));
    }
}
