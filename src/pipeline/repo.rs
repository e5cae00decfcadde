//! Repository fetcher (C7).
//!
//! Clones each `repos[]` entry into the working container: shallow
//! (`--depth 1`), on its declared branch, owned by its declared user, and
//! marked safe for that user's git config (the container's global git
//! identity is root's by default, which refuses to operate on
//! other-owned worktrees without `safe.directory`).

use crate::config::schema::RepoEntry;
use crate::engine::ContainerEngine;
use crate::error::{HabitatError, HabitatResult, PhaseErrorKind};
use crate::hash::Phase;

/// Rewrite an `https://` clone URL to its SSH equivalent when the habitat
/// needs write access, so credentials come from the container's deploy
/// key rather than embedding a token in the URL.
///
/// `https://github.com/org/repo.git` -> `git@github.com:org/repo.git`
pub fn https_to_ssh(url: &str) -> String {
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    let Some((host, path)) = rest.split_once('/') else {
        return url.to_string();
    };
    format!("git@{host}:{path}")
}

/// Clone `repo` into the container at its declared absolute `path`.
pub async fn clone_repo(
    engine: &dyn ContainerEngine,
    container_id: &str,
    repo: &RepoEntry,
) -> HabitatResult<()> {
    let url = match repo.access {
        crate::config::schema::AccessMode::Write => https_to_ssh(&repo.url),
        crate::config::schema::AccessMode::Read => repo.url.clone(),
    };
    let dest = repo.path.clone();

    run_ok(
        engine,
        container_id,
        vec![
            "git".into(),
            "clone".into(),
            "--depth".into(),
            "1".into(),
            "--branch".into(),
            repo.branch.clone(),
            url,
            dest.clone(),
        ],
    )
    .await?;

    run_ok(
        engine,
        container_id,
        vec![
            "git".into(),
            "config".into(),
            "--global".into(),
            "--add".into(),
            "safe.directory".into(),
            dest.clone(),
        ],
    )
    .await?;

    run_ok(
        engine,
        container_id,
        vec!["chown".into(), "-R".into(), repo.owner.clone(), dest],
    )
    .await
}

async fn run_ok(engine: &dyn ContainerEngine, container_id: &str, command: Vec<String>) -> HabitatResult<()> {
    let result = engine.exec(container_id, &command, None, None).await?;
    if result.success() {
        Ok(())
    } else {
        Err(HabitatError::PhaseFailed {
            phase_id: Phase::Repos.id(),
            phase_name: "repos".to_string(),
            kind: PhaseErrorKind::Clone,
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
    fn https_to_ssh_rewrites_github_url() {
        assert_eq!(
            https_to_ssh("https://github.com/acme/widgets.git"),
            "git@github.com:acme/widgets.git"
        );
    }

    #[test]
    fn https_to_ssh_leaves_non_https_untouched() {
        assert_eq!(
            https_to_ssh("git@github.com:acme/widgets.git"),
            "git@github.com:acme/widgets.git"
        );
    }
}
