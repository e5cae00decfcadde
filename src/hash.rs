//! Phase content hashing (C3)
//!
//! Each of the 12 build phases hashes a projection of the habitat's
//! resolved config: only the fields that phase's work actually depends
//! on, plus every ancestor phase's hash (so a change to phase 2 forces a
//! rebuild of phases 3..12 even though their own projections are
//! unchanged). Hashing is canonical JSON (sorted keys, no insignificant
//! whitespace) through SHA-256, truncated to 16 hex characters -- long
//! enough to make collisions a non-concern for a single habitat's
//! snapshot history, short enough to read in a tag or label value.

use crate::config::schema::HabitatConfig;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The 12 build phases, in pipeline order. `Final` is not itself hashed as
/// a phase step; its snapshot is just the last completed phase's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Base,
    Users,
    Env,
    Workdir,
    Habitat,
    Files,
    Setup,
    Repos,
    Tools,
    Verify,
    Test,
    Final,
}

impl Phase {
    pub const ALL: [Phase; 12] = [
        Phase::Base,
        Phase::Users,
        Phase::Env,
        Phase::Workdir,
        Phase::Habitat,
        Phase::Files,
        Phase::Setup,
        Phase::Repos,
        Phase::Tools,
        Phase::Verify,
        Phase::Test,
        Phase::Final,
    ];

    pub fn id(self) -> u8 {
        Self::ALL.iter().position(|p| *p == self).unwrap() as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Base => "base",
            Phase::Users => "users",
            Phase::Env => "env",
            Phase::Workdir => "workdir",
            Phase::Habitat => "habitat",
            Phase::Files => "files",
            Phase::Setup => "setup",
            Phase::Repos => "repos",
            Phase::Tools => "tools",
            Phase::Verify => "verify",
            Phase::Test => "test",
            Phase::Final => "final",
        }
    }

    /// Phases strictly before this one, in pipeline order.
    pub fn ancestors(self) -> &'static [Phase] {
        let idx = self.id() as usize;
        &Self::ALL[..idx]
    }
}

/// Recursively sort a `serde_json::Value`'s object keys so that two
/// logically equal values always serialize identically.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), canonicalize(v))).collect();
            serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serialize `value` to canonical JSON (sorted keys, no whitespace).
fn canonical_json<T: Serialize>(value: &T) -> String {
    let raw = serde_json::to_value(value).expect("phase projections are always representable as JSON");
    let sorted = canonicalize(&raw);
    serde_json::to_string(&sorted).expect("canonicalized value always serializes")
}

/// SHA-256 over `input`, hex-encoded and truncated to 16 characters.
fn digest16(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)[..16].to_string()
}

/// The config fields a given phase's work depends on, projected out as a
/// JSON value so unrelated config changes never perturb that phase's
/// hash. See SPEC_FULL.md §C3 for the phase/field mapping.
fn project(config: &HabitatConfig, phase: Phase) -> Value {
    match phase {
        Phase::Base => serde_json::json!({ "base": base_spec_json(config) }),
        Phase::Users => serde_json::json!({ "user": config.user() }),
        Phase::Env => serde_json::json!({ "env": config.env }),
        Phase::Workdir => serde_json::json!({ "workdir": config.workdir() }),
        Phase::Habitat => serde_json::json!({ "name": config.name }),
        Phase::Files => serde_json::json!({
            "files": config.files.iter().map(file_op_json).collect::<Vec<_>>(),
            "volumes": config.volumes.iter().map(volume_json).collect::<Vec<_>>(),
        }),
        Phase::Setup => serde_json::json!({
            "scripts": config.scripts.iter().map(script_json).collect::<Vec<_>>(),
        }),
        Phase::Repos => serde_json::json!({
            "repos": config.repos.iter().map(repo_json).collect::<Vec<_>>(),
        }),
        Phase::Tools => serde_json::json!({
            "tools": config.tools.iter().map(tool_json).collect::<Vec<_>>(),
        }),
        Phase::Verify => serde_json::json!({
            "required_files": config.verify_fs.required_files,
        }),
        Phase::Test => serde_json::json!({ "tests": config.tests }),
        Phase::Final => serde_json::json!({ "entry": entry_json(config) }),
    }
}

fn base_spec_json(config: &HabitatConfig) -> Value {
    match &config.base {
        crate::config::schema::BaseSpec::Image(image) => serde_json::json!({ "image": image }),
        crate::config::schema::BaseSpec::Dockerfile(path) => serde_json::json!({ "dockerfile": path }),
    }
}

fn file_op_json(f: &crate::config::schema::FileOp) -> Value {
    serde_json::json!({
        "src": f.src, "dest": f.dest, "mode": f.mode, "owner": f.owner,
    })
}

fn volume_json(v: &crate::config::schema::VolumeMount) -> Value {
    serde_json::json!({ "source": v.source, "dest": v.dest, "readonly": v.readonly })
}

fn script_json(s: &crate::config::schema::ScriptEntry) -> Value {
    serde_json::json!({ "run_as": s.run_as, "commands": s.commands })
}

fn tool_json(t: &crate::config::schema::ToolEntry) -> Value {
    serde_json::json!({ "name": t.name, "source_layer": t.source_layer.to_string() })
}

fn repo_json(r: &crate::config::schema::RepoEntry) -> Value {
    serde_json::json!({
        "url": r.url, "path": r.path, "branch": r.branch,
        "access": r.access.to_string(), "owner": r.owner,
    })
}

fn entry_json(config: &HabitatConfig) -> Value {
    serde_json::json!({
        "init_command": config.entry.init_command,
        "startup_delay": config.entry.startup_delay,
        "command": config.entry.command,
    })
}

/// Compute the content hash for `phase`, chaining in every ancestor
/// phase's hash so changes upstream always invalidate downstream
/// snapshots.
pub fn phase_hash(config: &HabitatConfig, phase: Phase) -> String {
    let mut ancestor_hashes = Vec::new();
    for ancestor in phase.ancestors() {
        ancestor_hashes.push(phase_hash(config, *ancestor));
    }
    let envelope = serde_json::json!({
        "phase": phase.name(),
        "ancestors": ancestor_hashes,
        "self": project(config, phase),
    });
    digest16(&canonical_json(&envelope))
}

/// Compute hashes for every phase in order, for convenience callers that
/// want the full vector (resume algorithm, snapshot labeling).
pub fn all_phase_hashes(config: &HabitatConfig) -> Vec<(Phase, String)> {
    Phase::ALL.iter().map(|p| (*p, phase_hash(config, *p))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BaseSpec, EntryPoint, VerifyFs};

    fn sample() -> HabitatConfig {
        HabitatConfig {
            name: "demo".into(),
            base: BaseSpec::Image("fedora:41".into()),
            env: vec![
                ("WORKDIR".into(), "/workspace".into()),
                ("USER".into(), "agent".into()),
            ],
            files: vec![],
            volumes: vec![],
            scripts: vec![],
            repos: vec![],
            verify_fs: VerifyFs::default(),
            tools: vec![],
            tests: vec![],
            entry: EntryPoint::default(),
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let config = sample();
        assert_eq!(
            phase_hash(&config, Phase::Base),
            phase_hash(&config, Phase::Base)
        );
    }

    #[test]
    fn hash_is_16_hex_chars() {
        let config = sample();
        let hash = phase_hash(&config, Phase::Final);
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn downstream_phase_changes_when_ancestor_changes() {
        let mut config = sample();
        let before = phase_hash(&config, Phase::Files);
        config.env[0].1 = "/different".into();
        let after = phase_hash(&config, Phase::Files);
        assert_ne!(before, after);
    }

    #[test]
    fn unrelated_phase_is_unaffected_by_sibling_field_change() {
        let mut config = sample();
        let before = phase_hash(&config, Phase::Base);
        config.tests.push("pytest".into());
        let after = phase_hash(&config, Phase::Base);
        assert_eq!(before, after);
    }

    #[test]
    fn ancestors_are_correct_for_repos_phase() {
        let ancestors: Vec<&str> = Phase::Repos.ancestors().iter().map(|p| p.name()).collect();
        assert_eq!(
            ancestors,
            vec!["base", "users", "env", "workdir", "habitat", "files", "setup"]
        );
    }
}
