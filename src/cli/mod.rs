//! CLI surface: argument parsing and command dispatch.

pub mod args;
pub mod commands;

use crate::config::HabitatConfig;
use crate::error::HabitatResult;
use std::path::{Path, PathBuf};

/// Default path for a layer file that hasn't been overridden on the CLI.
fn default_layer_path(name: &str) -> PathBuf {
    PathBuf::from("/etc/habitat").join(name).join("config.yaml")
}

/// Load, merge, expand, and validate a habitat's full config from the
/// three layer paths a CLI invocation resolved (system/shared from global
/// flags or defaults, habitat from the positional argument).
pub async fn load_habitat_config(
    system_config: Option<&Path>,
    shared_config: Option<&Path>,
    habitat_config: &Path,
) -> HabitatResult<HabitatConfig> {
    let (system_path, shared_path) = resolve_layer_paths(system_config, shared_config);
    crate::config::load(&system_path, &shared_path, habitat_config).await
}

/// Resolve the system/shared layer config paths an invocation will use,
/// applying the same defaulting `load_habitat_config` does.
pub fn resolve_layer_paths(system_config: Option<&Path>, shared_config: Option<&Path>) -> (PathBuf, PathBuf) {
    let system = system_config.map(Path::to_path_buf).unwrap_or_else(|| default_layer_path("system"));
    let shared = shared_config.map(Path::to_path_buf).unwrap_or_else(|| default_layer_path("shared"));
    (system, shared)
}

/// The host directory holding a layer's `tools/` subdirectory, if that
/// layer's config file actually exists. `layer_config_path` is whatever
/// `resolve_layer_paths` returned for that layer.
pub fn layer_tools_dir(layer_config_path: &Path) -> Option<PathBuf> {
    if !layer_config_path.exists() {
        return None;
    }
    layer_config_path.parent().map(Path::to_path_buf)
}
