//! Container engine abstraction (C4).
//!
//! `ContainerEngine` is the seam between the build pipeline / session
//! runtime and the actual container tool. `docker` ships the only
//! implementation, shelling out to the `docker` CLI the way the teacher's
//! native runtime shells out to `podman`.

pub mod docker;
pub mod snapshot;

use crate::error::HabitatResult;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Options for creating a working container a phase will run commands in.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub workdir: Option<String>,
    pub user: Option<String>,
    pub env: Vec<(String, String)>,
    pub volumes: Vec<VolumeSpec>,
    pub tty: bool,
    /// The foreground command this container is ultimately meant to run.
    /// `create()` always starts the container on a `sleep infinity`
    /// keep-alive process regardless of this field -- it's consulted by
    /// `attach()` (via the session runtime, which retains its own copy) to
    /// exec the real command once the container is up.
    pub command: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

/// A completed `exec` invocation's result.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstract container engine interface (spec §5's "Engine abstraction").
///
/// Everything the build pipeline and session runtime need from a
/// container tool lives behind this trait: creating scratch containers to
/// run phase work in, committing them to tagged snapshots, inspecting
/// snapshot labels for the resume algorithm, and the ephemeral-session
/// lifecycle (run/attach/stop/remove).
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Whether the engine's CLI is reachable at all.
    async fn is_available(&self) -> HabitatResult<bool>;

    /// Build an image from a Dockerfile at `dockerfile_path`, tagging it
    /// `tag`. Used only for phase 0 when a habitat supplies its own
    /// Dockerfile instead of a `base_image` reference.
    async fn build_from_dockerfile(&self, dockerfile_path: &Path, tag: &str) -> HabitatResult<()>;

    /// Pull `image` if not already present locally.
    async fn ensure_image(&self, image: &str) -> HabitatResult<()>;

    /// Create (but do not start) a container from `spec`, returning its ID.
    async fn create(&self, spec: &ContainerSpec) -> HabitatResult<String>;

    /// Start a created container in the background.
    async fn start(&self, container_id: &str) -> HabitatResult<()>;

    /// Run `command` inside `container_id` as `user`, returning its output.
    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        user: Option<&str>,
        workdir: Option<&str>,
    ) -> HabitatResult<ExecResult>;

    /// Commit a container's filesystem to a tagged image with the given
    /// labels (phase hash labels, per snapshot.rs).
    async fn commit(
        &self,
        container_id: &str,
        tag: &str,
        labels: &HashMap<String, String>,
    ) -> HabitatResult<()>;

    /// Stop a running container.
    async fn stop(&self, container_id: &str) -> HabitatResult<()>;

    /// Remove a container, ignoring "not found".
    async fn remove_container(&self, container_id: &str) -> HabitatResult<()>;

    /// Exec `command` inside `container_id` as `user`, attaching the
    /// invoking process's own stdio, returning the agent's exit code once
    /// it ends. An empty `command` falls back to an interactive login
    /// shell. This is how the session runtime actually starts the agent --
    /// the container's own PID 1 stays a `sleep infinity` keep-alive.
    async fn attach(
        &self,
        container_id: &str,
        command: &[String],
        user: Option<&str>,
        workdir: Option<&str>,
        tty: bool,
    ) -> HabitatResult<i32>;

    /// Inspect whether a container is currently running.
    async fn is_running(&self, container_id: &str) -> HabitatResult<bool>;

    /// Whether an image/tag exists locally.
    async fn image_exists(&self, tag: &str) -> HabitatResult<bool>;

    /// The labels attached to an image, if it exists.
    async fn image_labels(&self, tag: &str) -> HabitatResult<Option<HashMap<String, String>>>;

    /// List every image tag with the given name prefix.
    async fn image_list_prefixed(&self, prefix: &str) -> HabitatResult<Vec<String>>;

    /// Remove an image tag.
    async fn image_remove(&self, tag: &str) -> HabitatResult<()>;

    /// Human-readable engine name for display and audit logs.
    fn engine_name(&self) -> &'static str;
}
