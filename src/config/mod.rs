//! Configuration loading, merging, expansion, and validation (C2).
//!
//! A habitat's configuration is assembled from three YAML layers --
//! system, shared, habitat -- merged with the rules in `loader`, expanded
//! against its own `env` block with `env_expand`, and checked with
//! `validate` before the phase hasher or pipeline ever see it.

pub mod env_expand;
pub mod loader;
pub mod schema;
pub mod validate;

pub use schema::{BaseSpec, HabitatConfig, MergedConfig};

use crate::error::HabitatResult;
use std::path::Path;

/// Load, merge, expand, and validate a habitat's full configuration.
pub async fn load(
    system_path: &Path,
    shared_path: &Path,
    habitat_path: &Path,
) -> HabitatResult<HabitatConfig> {
    let merged = loader::load_layers(system_path, shared_path, habitat_path).await?;
    expand_and_validate(merged)
}

/// Expand a merged config's env references and validate the result. Split
/// out from `load` so callers that already have a `MergedConfig` (tests,
/// `habitat config` subcommands) don't need to touch disk.
pub fn expand_and_validate(merged: MergedConfig) -> HabitatResult<HabitatConfig> {
    let env = env_expand::resolve_env(&merged.env)?;

    let mut files = merged.files;
    for file in &mut files {
        file.dest = env_expand::expand(&file.dest, &env, file.source_layer)?;
    }

    let mut volumes = merged.volumes;
    for volume in &mut volumes {
        volume.dest = env_expand::expand(&volume.dest, &env, volume.source_layer)?;
    }

    let mut scripts = merged.scripts;
    for script in &mut scripts {
        let layer = script.source_layer;
        script.commands = script
            .commands
            .iter()
            .map(|c| env_expand::expand(c, &env, layer))
            .collect::<HabitatResult<Vec<_>>>()?;
    }

    let mut entry = merged.entry;
    entry.init_command = entry
        .init_command
        .iter()
        .map(|c| env_expand::expand(c, &env, crate::error::SourceLayer::Habitat))
        .collect::<HabitatResult<Vec<_>>>()?;
    entry.command = entry
        .command
        .iter()
        .map(|c| env_expand::expand(c, &env, crate::error::SourceLayer::Habitat))
        .collect::<HabitatResult<Vec<_>>>()?;

    let config = HabitatConfig {
        name: merged.name,
        base: merged.base,
        env,
        files,
        volumes,
        scripts,
        repos: merged.repos,
        verify_fs: merged.verify_fs,
        tools: merged.tools,
        tests: merged.tests,
        entry,
    };

    validate::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EntryPoint, EnvBinding, VerifyFs};
    use crate::error::SourceLayer;

    #[test]
    fn expand_and_validate_resolves_file_destinations() {
        let merged = MergedConfig {
            name: "demo".into(),
            base: BaseSpec::Image("fedora:41".into()),
            env: vec![
                EnvBinding {
                    key: "WORKDIR".into(),
                    raw_value: "/workspace".into(),
                    source_layer: SourceLayer::Habitat,
                },
                EnvBinding {
                    key: "USER".into(),
                    raw_value: "agent".into(),
                    source_layer: SourceLayer::Habitat,
                },
            ],
            files: vec![schema::FileOp {
                src: "id_rsa".into(),
                dest: "${WORKDIR}/.ssh/id_rsa".into(),
                mode: Some("600".into()),
                owner: None,
                before: None,
                after: None,
                source_layer: SourceLayer::Habitat,
            }],
            volumes: vec![],
            scripts: vec![],
            repos: vec![],
            verify_fs: VerifyFs::default(),
            tools: vec![],
            tests: vec![],
            entry: EntryPoint::default(),
        };
        let config = expand_and_validate(merged).unwrap();
        assert_eq!(config.files[0].dest, "/workspace/.ssh/id_rsa");
    }
}
