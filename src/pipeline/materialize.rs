//! File materializer (C6).
//!
//! Expands each `files[]` entry's `src` glob on the host, copies matches
//! into the working container via the engine, and applies mode/ownership.
//! A glob with zero matches is a warning, not an error -- a habitat author
//! moving files around shouldn't get a hard failure from a stale pattern.

use crate::config::schema::FileOp;
use crate::engine::ContainerEngine;
use crate::error::{HabitatError, HabitatResult, PhaseErrorKind};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Default file mode, overridden for private-key-looking filenames. Falls
/// back to 755 when the host file's own mode has any execute bit set,
/// rather than guessing from the destination filename.
fn default_mode(dest: &str, host_executable: bool) -> &'static str {
    if dest.ends_with(".pem") || dest.ends_with("_key") || dest.ends_with("id_rsa") {
        "600"
    } else if host_executable {
        "755"
    } else {
        "644"
    }
}

/// Expand `op.src` (a glob relative to `base_dir`) into concrete host paths.
fn expand_glob(base_dir: &Path, pattern: &str) -> HabitatResult<Vec<PathBuf>> {
    let full_pattern = base_dir.join(pattern);
    let pattern_str = full_pattern.to_string_lossy().to_string();
    let matches: Vec<PathBuf> = glob::glob(&pattern_str)
        .map_err(|e| HabitatError::PhaseFailed {
            phase_id: crate::hash::Phase::Files.id(),
            phase_name: "files".to_string(),
            kind: PhaseErrorKind::Fileop,
            message: format!("invalid glob pattern '{pattern}': {e}"),
            stdout: String::new(),
            stderr: String::new(),
        })?
        .filter_map(Result::ok)
        .collect();
    Ok(matches)
}

/// Materialize one file operation: expand its glob, copy each match into
/// the container at `op.dest` (joined with the match's filename when the
/// glob expands to more than one file), then chmod/chown.
pub async fn materialize_file(
    engine: &dyn ContainerEngine,
    container_id: &str,
    base_dir: &Path,
    op: &FileOp,
) -> HabitatResult<()> {
    let matches = expand_glob(base_dir, &op.src)?;
    if matches.is_empty() {
        warn!(src = %op.src, layer = %op.source_layer, "file glob matched nothing");
        return Ok(());
    }

    let single = matches.len() == 1;
    for path in &matches {
        let dest = if single {
            op.dest.clone()
        } else {
            let filename = path.file_name().map(|f| f.to_string_lossy().to_string()).unwrap_or_default();
            format!("{}/{}", op.dest.trim_end_matches('/'), filename)
        };
        copy_into_container(engine, container_id, path, &dest, op).await?;
    }
    Ok(())
}

async fn copy_into_container(
    engine: &dyn ContainerEngine,
    container_id: &str,
    host_path: &Path,
    dest: &str,
    op: &FileOp,
) -> HabitatResult<()> {
    let content = tokio::fs::read(host_path)
        .await
        .map_err(|e| HabitatError::io(format!("reading {}", host_path.display()), e))?;

    let metadata = tokio::fs::metadata(host_path)
        .await
        .map_err(|e| HabitatError::io(format!("statting {}", host_path.display()), e))?;
    let host_executable = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    };

    let parent = Path::new(dest).parent().map(|p| p.to_string_lossy().to_string());
    if let Some(parent) = &parent {
        run_ok(engine, container_id, vec!["mkdir".into(), "-p".into(), parent.clone()]).await?;
    }

    write_file_content(engine, container_id, dest, &content).await?;

    let mode = op.mode.clone().unwrap_or_else(|| default_mode(dest, host_executable).to_string());
    run_ok(engine, container_id, vec!["chmod".into(), mode, dest.to_string()]).await?;

    if let Some(owner) = &op.owner {
        run_ok(engine, container_id, vec!["chown".into(), owner.clone(), dest.to_string()]).await?;
    }

    Ok(())
}

async fn write_file_content(
    engine: &dyn ContainerEngine,
    container_id: &str,
    dest: &str,
    content: &[u8],
) -> HabitatResult<()> {
    use base64::Engine;
    // base64 round-trip avoids quoting/escaping issues for arbitrary binary
    // content over a plain `exec sh -c`.
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    let command = format!("echo {encoded} | base64 -d > {dest}");
    run_ok(engine, container_id, vec!["sh".into(), "-c".into(), command]).await
}

async fn run_ok(engine: &dyn ContainerEngine, container_id: &str, command: Vec<String>) -> HabitatResult<()> {
    let result = engine.exec(container_id, &command, None, None).await?;
    if result.success() {
        Ok(())
    } else {
        Err(HabitatError::PhaseFailed {
            phase_id: crate::hash::Phase::Files.id(),
            phase_name: "files".to_string(),
            kind: PhaseErrorKind::Fileop,
            message: format!("command failed: {}", command.join(" ")),
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_restrictive_for_key_files() {
        assert_eq!(default_mode("/home/agent/.ssh/id_rsa", true), "600");
        assert_eq!(default_mode("/etc/secrets/service.pem", false), "600");
        assert_eq!(default_mode("/usr/local/bin/setup.sh", true), "755");
        assert_eq!(default_mode("/etc/motd", false), "644");
    }

    #[test]
    fn expand_glob_empty_on_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let matches = expand_glob(dir.path(), "*.nonexistent").unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn expand_glob_finds_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"hi").unwrap();
        let matches = expand_glob(dir.path(), "*.txt").unwrap();
        assert_eq!(matches.len(), 2);
    }

}
