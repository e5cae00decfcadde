//! Configuration schema (C2)
//!
//! Two families of types live here: `RawLayer`, the direct YAML
//! deserialization target for one `config.yaml` file (fields optional,
//! unresolved `${KEY}` references, unknown keys rejected), and the merged
//! semantic view (`HabitatConfig` and friends) produced by `loader::merge`.

use crate::error::SourceLayer;
use serde::{Deserialize, Serialize};

/// Raw `env` / `files` / `scripts` / `repos` entries as they appear in one
/// layer's YAML, before merging or expansion.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawLayer {
    pub name: Option<String>,
    #[serde(default)]
    pub base_image: Option<String>,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub files: Vec<RawFileOp>,
    #[serde(default)]
    pub volumes: Vec<RawVolume>,
    #[serde(default)]
    pub scripts: Vec<RawScript>,
    #[serde(default)]
    pub repos: Vec<RawRepo>,
    #[serde(rename = "verify-fs", default)]
    pub verify_fs: Option<RawVerifyFs>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub tests: Vec<String>,
    #[serde(default)]
    pub entry: Option<RawEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawFileOp {
    pub src: String,
    pub dest: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawVolume {
    pub source: String,
    pub dest: String,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawScript {
    pub run_as: String,
    pub commands: Vec<String>,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRepo {
    pub url: String,
    pub path: String,
    pub branch: String,
    pub access: AccessMode,
    pub owner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawVerifyFs {
    #[serde(default)]
    pub required_files: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawEntry {
    #[serde(default)]
    pub init_command: Vec<String>,
    #[serde(default)]
    pub startup_delay: u64,
    #[serde(default)]
    pub command: Vec<String>,
}

/// An `env` binding after KEY=VALUE parsing, still carrying an unexpanded
/// `raw_value` and its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvBinding {
    pub key: String,
    pub raw_value: String,
    pub source_layer: SourceLayer,
}

/// A file operation in the merged config, `dest` still unexpanded until
/// `env_expand` runs over it.
#[derive(Debug, Clone)]
pub struct FileOp {
    pub src: String,
    pub dest: String,
    pub mode: Option<String>,
    pub owner: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub source_layer: SourceLayer,
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub source: String,
    pub dest: String,
    pub readonly: bool,
    pub source_layer: SourceLayer,
}

#[derive(Debug, Clone)]
pub struct ScriptEntry {
    pub run_as: String,
    pub commands: Vec<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub source_layer: SourceLayer,
}

#[derive(Debug, Clone)]
pub struct RepoEntry {
    pub url: String,
    pub path: String,
    pub branch: String,
    pub access: AccessMode,
    pub owner: String,
    pub source_layer: SourceLayer,
}

/// A habitat-managed tool, named in some layer's `tools` list. Its install
/// script lives at `<that layer's tools dir>/<name>.sh` -- the name alone
/// is declared in YAML, the script itself is a host-side file the pipeline
/// locates by provenance.
#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub name: String,
    pub source_layer: SourceLayer,
}

#[derive(Debug, Clone, Default)]
pub struct VerifyFs {
    pub required_files: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EntryPoint {
    pub init_command: Vec<String>,
    pub startup_delay: u64,
    pub command: Vec<String>,
}

/// Origin of the base image: an external reference, or a Dockerfile path.
#[derive(Debug, Clone)]
pub enum BaseSpec {
    Image(String),
    Dockerfile(String),
}

/// The fully merged, not-yet-expanded habitat configuration (spec §3).
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub name: String,
    pub base: BaseSpec,
    pub env: Vec<EnvBinding>,
    pub files: Vec<FileOp>,
    pub volumes: Vec<VolumeMount>,
    pub scripts: Vec<ScriptEntry>,
    pub repos: Vec<RepoEntry>,
    pub verify_fs: VerifyFs,
    pub tools: Vec<ToolEntry>,
    pub tests: Vec<String>,
    pub entry: EntryPoint,
}

/// The merged configuration after environment expansion has resolved every
/// `${KEY}` reference. This is what the hasher, pipeline, and session
/// runtime actually consume.
#[derive(Debug, Clone)]
pub struct HabitatConfig {
    pub name: String,
    pub base: BaseSpec,
    /// Expanded env, in binding order.
    pub env: Vec<(String, String)>,
    pub files: Vec<FileOp>,
    pub volumes: Vec<VolumeMount>,
    pub scripts: Vec<ScriptEntry>,
    pub repos: Vec<RepoEntry>,
    pub verify_fs: VerifyFs,
    pub tools: Vec<ToolEntry>,
    pub tests: Vec<String>,
    pub entry: EntryPoint,
}

impl HabitatConfig {
    /// Look up an expanded env value by key.
    pub fn env_get(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `env.WORKDIR`, required and validated to be absolute.
    pub fn workdir(&self) -> Option<&str> {
        self.env_get("WORKDIR")
    }

    /// `env.USER`, required and validated to not be `root`.
    pub fn user(&self) -> Option<&str> {
        self.env_get("USER")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_layer_rejects_unknown_fields() {
        let yaml = "name: demo\nbogus: true\n";
        let result: Result<RawLayer, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err());
    }

    #[test]
    fn raw_layer_defaults_are_empty() {
        let layer: RawLayer = serde_yaml::from_str("name: demo\n").unwrap();
        assert!(layer.env.is_empty());
        assert!(layer.files.is_empty());
        assert!(layer.repos.is_empty());
        assert!(layer.verify_fs.is_none());
    }

    #[test]
    fn access_mode_parses_lowercase() {
        let repo: RawRepo = serde_yaml::from_str(
            "url: git@example.com:a/b.git\npath: b\nbranch: main\naccess: write\nowner: agent\n",
        )
        .unwrap();
        assert_eq!(repo.access, AccessMode::Write);
    }

    #[test]
    fn habitat_config_env_get_finds_workdir() {
        let config = HabitatConfig {
            name: "demo".into(),
            base: BaseSpec::Image("fedora:41".into()),
            env: vec![("WORKDIR".into(), "/workspace".into())],
            files: vec![],
            volumes: vec![],
            scripts: vec![],
            repos: vec![],
            verify_fs: VerifyFs::default(),
            tools: vec![],
            tests: vec![],
            entry: EntryPoint::default(),
        };
        assert_eq!(config.workdir(), Some("/workspace"));
        assert_eq!(config.user(), None);
    }
}
