//! Post-expansion validation (C2).
//!
//! Runs after `env_expand` has resolved every `${KEY}` reference, so
//! validation sees final values: an absolute `WORKDIR`, a non-root `USER`,
//! well-formed repo access declarations, and no duplicate destinations
//! among file operations declared within a single habitat.

use crate::config::schema::HabitatConfig;
use crate::error::{ConfigErrorKind, HabitatError, HabitatResult, SourceLayer};
use std::collections::HashSet;

/// Validate a fully expanded `HabitatConfig`. Returns the first violation
/// found; callers that want every violation should collect separately.
pub fn validate(config: &HabitatConfig) -> HabitatResult<()> {
    validate_workdir(config)?;
    validate_user(config)?;
    validate_no_duplicate_destinations(config)?;
    validate_repo_paths(config)?;
    Ok(())
}

fn invalid(field: &str, reason: impl Into<String>, suggestion: Option<&str>) -> HabitatError {
    HabitatError::ConfigInvalid {
        kind: ConfigErrorKind::Schema,
        layer: SourceLayer::Habitat,
        field: field.to_string(),
        reason: reason.into(),
        suggestion: suggestion.map(str::to_string),
    }
}

fn validate_workdir(config: &HabitatConfig) -> HabitatResult<()> {
    let workdir = config
        .workdir()
        .ok_or_else(|| invalid("env.WORKDIR", "WORKDIR is required", Some("set env: [\"WORKDIR=/workspace\"]")))?;
    if !workdir.starts_with('/') {
        return Err(invalid(
            "env.WORKDIR",
            format!("WORKDIR must be an absolute path, got '{workdir}'"),
            Some("use an absolute path such as /workspace"),
        ));
    }
    Ok(())
}

fn validate_user(config: &HabitatConfig) -> HabitatResult<()> {
    let user = config
        .user()
        .ok_or_else(|| invalid("env.USER", "USER is required", Some("set env: [\"USER=agent\"]")))?;
    if user == "root" {
        return Err(invalid(
            "env.USER",
            "USER must not be root",
            Some("declare a non-root user for the habitat to run as"),
        ));
    }
    Ok(())
}

fn validate_no_duplicate_destinations(config: &HabitatConfig) -> HabitatResult<()> {
    let mut seen = HashSet::new();
    for file in &config.files {
        if !seen.insert(file.dest.as_str()) {
            return Err(invalid(
                "files[].dest",
                format!("duplicate destination '{}'", file.dest),
                Some("each file operation must target a distinct destination path"),
            ));
        }
    }
    Ok(())
}

fn validate_repo_paths(config: &HabitatConfig) -> HabitatResult<()> {
    let mut seen = HashSet::new();
    for repo in &config.repos {
        if !repo.path.starts_with('/') || repo.path.contains("..") {
            return Err(invalid(
                "repos[].path",
                format!("repo path '{}' must be absolute and contain no '..'", repo.path),
                Some("use an absolute path, e.g. \"/workspace/myrepo\""),
            ));
        }
        if !seen.insert(repo.path.as_str()) {
            return Err(invalid(
                "repos[].path",
                format!("duplicate repo path '{}'", repo.path),
                Some("each repository must clone to a distinct path"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{BaseSpec, EntryPoint, RepoEntry, VerifyFs};
    use crate::config::schema::AccessMode;

    fn base_config(env: Vec<(&str, &str)>) -> HabitatConfig {
        HabitatConfig {
            name: "demo".into(),
            base: BaseSpec::Image("fedora:41".into()),
            env: env.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
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
    fn rejects_missing_workdir() {
        let config = base_config(vec![("USER", "agent")]);
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, HabitatError::ConfigInvalid { .. }));
    }

    #[test]
    fn rejects_relative_workdir() {
        let config = base_config(vec![("WORKDIR", "workspace"), ("USER", "agent")]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_root_user() {
        let config = base_config(vec![("WORKDIR", "/workspace"), ("USER", "root")]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let config = base_config(vec![("WORKDIR", "/workspace"), ("USER", "agent")]);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn rejects_repo_path_escape() {
        let mut config = base_config(vec![("WORKDIR", "/workspace"), ("USER", "agent")]);
        config.repos.push(RepoEntry {
            url: "git@example.com:a/b.git".into(),
            path: "/workspace/repos/../escape".into(),
            branch: "main".into(),
            access: AccessMode::Read,
            owner: "agent".into(),
            source_layer: crate::error::SourceLayer::Habitat,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_relative_repo_path() {
        let mut config = base_config(vec![("WORKDIR", "/workspace"), ("USER", "agent")]);
        config.repos.push(RepoEntry {
            url: "git@example.com:a/b.git".into(),
            path: "myrepo".into(),
            branch: "main".into(),
            access: AccessMode::Read,
            owner: "agent".into(),
            source_layer: crate::error::SourceLayer::Habitat,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn accepts_absolute_repo_path() {
        let mut config = base_config(vec![("WORKDIR", "/workspace"), ("USER", "agent")]);
        config.repos.push(RepoEntry {
            url: "git@example.com:a/b.git".into(),
            path: "/workspace/myrepo".into(),
            branch: "main".into(),
            access: AccessMode::Read,
            owner: "agent".into(),
            source_layer: crate::error::SourceLayer::Habitat,
        });
        assert!(validate(&config).is_ok());
    }
}
