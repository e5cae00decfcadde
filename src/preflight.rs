//! Preflight repository access probe (C9).
//!
//! Before the build pipeline touches a container, every declared repo is
//! checked for reachability at the access level it declares: `read`
//! habitats only need `git ls-remote` to succeed, `write` habitats also
//! need API auth (the write path pushes branches and opens PRs later in
//! the session, which `ls-remote` alone can't validate). Transient
//! network failures get a bounded exponential backoff; anything else
//! fails immediately so a broken credential doesn't masquerade as a slow
//! network.

use crate::config::schema::{AccessMode, RepoEntry};
use crate::error::{HabitatError, HabitatResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// The three deterministic remedies a caller may choose between when a
/// repo fails its preflight check (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remedy {
    /// Proceed as if the probe had passed.
    ContinueAnyway,
    /// Rewrite this repo's `access` to `read` in the in-memory config (not
    /// on disk) and proceed.
    DowngradeToRead,
    /// The caller performed some remediation (installed a deploy key,
    /// refreshed a token) out of band; retry the probe once more.
    FixAuthThenRetry,
}

/// Lets the preflight probe ask the user (or a scripted caller) to pick a
/// remedy when a repo isn't reachable. Core preflight logic never prompts
/// directly; this is its only UI seam.
#[async_trait::async_trait]
pub trait RemedyPrompt: Send + Sync {
    async fn choose(&self, repo_url: &str, access: &str, reason: &str, options: &[Remedy]) -> HabitatResult<Remedy>;
}

/// A `RemedyPrompt` that always fails closed -- used in non-interactive
/// contexts (CI, `habitat config validate`). Returning an error here (not
/// a `Remedy` value) means a broken credential never masquerades as
/// `continue anyway` when nobody is present to choose it.
pub struct NoRemedy;

#[async_trait::async_trait]
impl RemedyPrompt for NoRemedy {
    async fn choose(&self, repo_url: &str, access: &str, reason: &str, _options: &[Remedy]) -> HabitatResult<Remedy> {
        Err(HabitatError::PreflightFailed {
            url: repo_url.to_string(),
            access: access.to_string(),
            reason: reason.to_string(),
            needs_deploy_key: true,
            needs_api_auth: access == "write",
        })
    }
}

fn is_transient(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    ["timed out", "connection reset", "temporary failure", "could not resolve host"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

async fn ls_remote_ok(url: &str) -> HabitatResult<Result<(), String>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let output = Command::new("git")
            .args(["ls-remote", "--heads", url])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HabitatError::command_failed(format!("git ls-remote --heads {url}"), e))?;

        if output.status.success() {
            return Ok(Ok(()));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if attempt >= MAX_ATTEMPTS || !is_transient(&stderr) {
            return Ok(Err(stderr));
        }
        tokio::time::sleep(BASE_BACKOFF * 2u32.pow(attempt - 1)).await;
    }
}

const REMEDY_OPTIONS: [Remedy; 3] = [Remedy::ContinueAnyway, Remedy::DowngradeToRead, Remedy::FixAuthThenRetry];

/// Offer `remedy` a choice for a failed check on `repo`, and apply it.
/// `FixAuthThenRetry` re-runs the whole probe from scratch; the other two
/// resolve the failure in place.
async fn resolve_failure(repo: &mut RepoEntry, remedy: &dyn RemedyPrompt, reason: String) -> HabitatResult<()> {
    let chosen = remedy.choose(&repo.url, &repo.access.to_string(), &reason, &REMEDY_OPTIONS).await?;
    match chosen {
        Remedy::ContinueAnyway => Ok(()),
        Remedy::DowngradeToRead => {
            repo.access = AccessMode::Read;
            Ok(())
        }
        Remedy::FixAuthThenRetry => Box::pin(probe_repo(repo, remedy)).await,
    }
}

/// Probe one repo for reachability at its declared access level.
pub async fn probe_repo(repo: &mut RepoEntry, remedy: &dyn RemedyPrompt) -> HabitatResult<()> {
    match ls_remote_ok(&repo.url).await? {
        Ok(()) => {}
        Err(reason) => return resolve_failure(repo, remedy, reason).await,
    }

    if repo.access == AccessMode::Write {
        // Write access additionally needs API auth for the push/PR path;
        // git-level reachability alone doesn't prove that.
        let reason = "write access requires API authentication".to_string();
        return resolve_failure(repo, remedy, reason).await;
    }

    Ok(())
}

/// Probe every repo a habitat declares.
pub async fn probe_all(repos: &mut [RepoEntry], remedy: &dyn RemedyPrompt) -> HabitatResult<()> {
    for repo in repos.iter_mut() {
        probe_repo(repo, remedy).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_network_errors_are_recognized() {
        assert!(is_transient("ssh: connect to host github.com port 22: Connection timed out"));
        assert!(is_transient("Could not resolve host: github.com"));
        assert!(!is_transient("fatal: Authentication failed"));
    }

    #[tokio::test]
    async fn no_remedy_fails_closed() {
        let remedy = NoRemedy;
        let err = remedy.choose("x", "read", "host not found", &REMEDY_OPTIONS).await.unwrap_err();
        assert!(matches!(err, HabitatError::PreflightFailed { .. }));
    }

    struct AlwaysDowngrade;
    #[async_trait::async_trait]
    impl RemedyPrompt for AlwaysDowngrade {
        async fn choose(&self, _repo_url: &str, _access: &str, _reason: &str, _options: &[Remedy]) -> HabitatResult<Remedy> {
            Ok(Remedy::DowngradeToRead)
        }
    }

    #[tokio::test]
    async fn downgrade_to_read_rewrites_access_in_memory() {
        let mut repo = RepoEntry {
            url: "https://127.0.0.1:1/nonexistent.git".into(),
            path: "/workspace/repos/demo".into(),
            branch: "main".into(),
            access: AccessMode::Write,
            owner: "agent".into(),
            source_layer: crate::error::SourceLayer::Habitat,
        };
        probe_repo(&mut repo, &AlwaysDowngrade).await.unwrap();
        assert_eq!(repo.access, AccessMode::Read);
    }
}
