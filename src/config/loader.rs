//! Three-layer config loader: system -> shared -> habitat (C2).
//!
//! Each layer is an independent YAML file. Layers are read in a fixed
//! order and merged field-by-field per spec §4.2: scalars overwrite
//! (later layer wins), lists concatenate in layer order, and
//! `verify-fs.required_files` is a set union (deduplicated, sorted).
//! `env` is concatenated like any other list — duplicate-key resolution
//! happens later in `env_expand::resolve_env`, which lets a later
//! binding shadow an earlier one while preserving first-declaration
//! position for everything else.

use crate::config::schema::{
    BaseSpec, EnvBinding, FileOp, MergedConfig, RawLayer, RepoEntry, ScriptEntry, ToolEntry,
    VerifyFs, VolumeMount,
};
use crate::error::{ConfigErrorKind, HabitatError, HabitatResult, SourceLayer};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Parse one layer file's raw YAML. Returns `RawLayer::default()` if the
/// file does not exist (a layer is optional except `habitat`).
async fn read_layer(path: &Path, layer: SourceLayer) -> HabitatResult<RawLayer> {
    if !path.exists() {
        debug!(layer = %layer, path = %path.display(), "layer file absent, using empty layer");
        return Ok(RawLayer::default());
    }
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| HabitatError::io(format!("reading {layer} config at {}", path.display()), e))?;
    serde_yaml::from_str(&content).map_err(|e| HabitatError::ConfigInvalid {
        kind: ConfigErrorKind::Syntax,
        layer,
        field: "<root>".to_string(),
        reason: e.to_string(),
        suggestion: Some(format!("check YAML syntax in {}", path.display())),
    })
}

/// Parse a single `KEY=VALUE` env line into a binding.
fn parse_env_line(line: &str, layer: SourceLayer) -> HabitatResult<EnvBinding> {
    match line.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(EnvBinding {
            key: key.to_string(),
            raw_value: value.to_string(),
            source_layer: layer,
        }),
        _ => Err(HabitatError::ConfigInvalid {
            kind: ConfigErrorKind::Syntax,
            layer,
            field: "env".to_string(),
            reason: format!("expected KEY=VALUE, got '{line}'"),
            suggestion: Some("env entries must be of the form KEY=VALUE".to_string()),
        }),
    }
}

/// Resolve the base image/dockerfile declared across layers: the last
/// layer to declare either wins outright (no mixing base_image from one
/// layer with dockerfile from another).
fn resolve_base(layers: &[(SourceLayer, &RawLayer)]) -> HabitatResult<BaseSpec> {
    let mut chosen: Option<(SourceLayer, BaseSpec)> = None;
    for (layer, raw) in layers {
        match (&raw.base_image, &raw.dockerfile) {
            (Some(_), Some(_)) => return Err(HabitatError::AmbiguousBaseImage),
            (Some(image), None) => chosen = Some((*layer, BaseSpec::Image(image.clone()))),
            (None, Some(path)) => chosen = Some((*layer, BaseSpec::Dockerfile(path.clone()))),
            (None, None) => {}
        }
    }
    chosen.map(|(_, base)| base).ok_or(HabitatError::MissingBaseImage)
}

/// Merge three already-parsed layers into a `MergedConfig`, per spec §4.2.
pub fn merge(system: RawLayer, shared: RawLayer, habitat: RawLayer) -> HabitatResult<MergedConfig> {
    let name = habitat
        .name
        .clone()
        .ok_or_else(|| HabitatError::ConfigInvalid {
            kind: ConfigErrorKind::Schema,
            layer: SourceLayer::Habitat,
            field: "name".to_string(),
            reason: "habitat layer must declare a name".to_string(),
            suggestion: Some("add `name: <habitat-name>` to the habitat config".to_string()),
        })?;

    let layered = [
        (SourceLayer::System, &system),
        (SourceLayer::Shared, &shared),
        (SourceLayer::Habitat, &habitat),
    ];

    let base = resolve_base(&layered)?;

    let mut env = Vec::new();
    let mut files = Vec::new();
    let mut volumes = Vec::new();
    let mut scripts = Vec::new();
    let mut repos = Vec::new();
    let mut required_files = Vec::new();
    let mut tools = Vec::new();
    let mut tests = Vec::new();
    let mut entry = None;

    for (layer, raw) in layered {
        for line in &raw.env {
            env.push(parse_env_line(line, layer)?);
        }
        for f in &raw.files {
            files.push(FileOp {
                src: f.src.clone(),
                dest: f.dest.clone(),
                mode: f.mode.clone(),
                owner: f.owner.clone(),
                before: f.before.clone(),
                after: f.after.clone(),
                source_layer: layer,
            });
        }
        for v in &raw.volumes {
            volumes.push(VolumeMount {
                source: v.source.clone(),
                dest: v.dest.clone(),
                readonly: v.readonly,
                source_layer: layer,
            });
        }
        for s in &raw.scripts {
            scripts.push(ScriptEntry {
                run_as: s.run_as.clone(),
                commands: s.commands.clone(),
                before: s.before.clone(),
                after: s.after.clone(),
                source_layer: layer,
            });
        }
        for r in &raw.repos {
            repos.push(RepoEntry {
                url: r.url.clone(),
                path: r.path.clone(),
                branch: r.branch.clone(),
                access: r.access,
                owner: r.owner.clone(),
                source_layer: layer,
            });
        }
        if let Some(vfs) = &raw.verify_fs {
            required_files.extend(vfs.required_files.iter().cloned());
        }
        for name in &raw.tools {
            tools.push(ToolEntry {
                name: name.clone(),
                source_layer: layer,
            });
        }
        tests.extend(raw.tests.iter().cloned());
        if raw.entry.is_some() {
            entry = raw.entry.clone();
        }
    }

    required_files.sort();
    required_files.dedup();

    let entry = entry
        .map(|e| crate::config::schema::EntryPoint {
            init_command: e.init_command,
            startup_delay: e.startup_delay,
            command: e.command,
        })
        .unwrap_or_default();

    Ok(MergedConfig {
        name,
        base,
        env,
        files,
        volumes,
        scripts,
        repos,
        verify_fs: VerifyFs { required_files },
        tools,
        tests,
        entry,
    })
}

/// Load and merge the three config layers from disk.
pub async fn load_layers(
    system_path: &Path,
    shared_path: &Path,
    habitat_path: &Path,
) -> HabitatResult<MergedConfig> {
    let system = read_layer(system_path, SourceLayer::System).await?;
    let shared = read_layer(shared_path, SourceLayer::Shared).await?;
    let habitat = read_layer(habitat_path, SourceLayer::Habitat).await?;
    if habitat.name.is_none() {
        return Err(HabitatError::ConfigNotFound(habitat_path.to_path_buf()));
    }
    merge(system, shared, habitat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RawEntry, RawFileOp, RawVerifyFs};

    fn empty() -> RawLayer {
        RawLayer::default()
    }

    #[test]
    fn missing_base_image_is_rejected() {
        let habitat = RawLayer {
            name: Some("demo".into()),
            ..empty()
        };
        let err = merge(empty(), empty(), habitat).unwrap_err();
        assert!(matches!(err, HabitatError::MissingBaseImage));
    }

    #[test]
    fn ambiguous_base_image_is_rejected() {
        let habitat = RawLayer {
            name: Some("demo".into()),
            base_image: Some("fedora:41".into()),
            dockerfile: Some("Dockerfile".into()),
            ..empty()
        };
        let err = merge(empty(), empty(), habitat).unwrap_err();
        assert!(matches!(err, HabitatError::AmbiguousBaseImage));
    }

    #[test]
    fn scalar_base_image_overwritten_by_later_layer() {
        let system = RawLayer {
            base_image: Some("fedora:40".into()),
            ..empty()
        };
        let habitat = RawLayer {
            name: Some("demo".into()),
            base_image: Some("fedora:41".into()),
            ..empty()
        };
        let merged = merge(system, empty(), habitat).unwrap();
        match merged.base {
            BaseSpec::Image(img) => assert_eq!(img, "fedora:41"),
            _ => panic!("expected image base"),
        }
    }

    #[test]
    fn lists_concatenate_across_layers() {
        let system = RawLayer {
            files: vec![RawFileOp {
                src: "a".into(),
                dest: "/a".into(),
                mode: None,
                owner: None,
                before: None,
                after: None,
            }],
            base_image: Some("fedora:41".into()),
            ..empty()
        };
        let habitat = RawLayer {
            name: Some("demo".into()),
            files: vec![RawFileOp {
                src: "b".into(),
                dest: "/b".into(),
                mode: None,
                owner: None,
                before: None,
                after: None,
            }],
            ..empty()
        };
        let merged = merge(system, empty(), habitat).unwrap();
        assert_eq!(merged.files.len(), 2);
        assert_eq!(merged.files[0].source_layer, SourceLayer::System);
        assert_eq!(merged.files[1].source_layer, SourceLayer::Habitat);
    }

    #[test]
    fn verify_fs_required_files_is_deduped_set_union() {
        let system = RawLayer {
            base_image: Some("fedora:41".into()),
            verify_fs: Some(RawVerifyFs {
                required_files: vec!["/etc/passwd".into(), "/usr/bin/git".into()],
            }),
            ..empty()
        };
        let habitat = RawLayer {
            name: Some("demo".into()),
            verify_fs: Some(RawVerifyFs {
                required_files: vec!["/usr/bin/git".into(), "/usr/bin/curl".into()],
            }),
            ..empty()
        };
        let merged = merge(system, empty(), habitat).unwrap();
        assert_eq!(
            merged.verify_fs.required_files,
            vec!["/etc/passwd", "/usr/bin/curl", "/usr/bin/git"]
        );
    }

    #[test]
    fn entry_is_overwritten_wholesale_by_later_layer() {
        let shared = RawLayer {
            entry: Some(RawEntry {
                init_command: vec!["shared-init".into()],
                startup_delay: 1,
                command: vec!["bash".into()],
            }),
            ..empty()
        };
        let habitat = RawLayer {
            name: Some("demo".into()),
            base_image: Some("fedora:41".into()),
            entry: Some(RawEntry {
                init_command: vec!["habitat-init".into()],
                startup_delay: 5,
                command: vec!["zsh".into()],
            }),
            ..empty()
        };
        let merged = merge(empty(), shared, habitat).unwrap();
        assert_eq!(merged.entry.init_command, vec!["habitat-init".to_string()]);
        assert_eq!(merged.entry.startup_delay, 5);
    }

    #[test]
    fn parse_env_line_rejects_missing_equals() {
        let err = parse_env_line("NOEQUALS", SourceLayer::Habitat).unwrap_err();
        assert!(matches!(err, HabitatError::ConfigInvalid { .. }));
    }
}
