//! Path & identifier helpers (C1)
//!
//! Two distinct path spaces exist: host (absolute on the orchestrator's
//! filesystem) and container (absolute inside the built image). Never
//! concatenate across spaces — these helpers keep the two apart by type
//! signature (host paths are `PathBuf`, container paths are `String`).

use std::path::{Path, PathBuf};

/// Resolve a path relative to an explicit install root.
///
/// The install root is always passed in rather than read from a
/// process-wide singleton (see DESIGN.md's "no hidden singletons" note).
pub fn host_rel(install_root: &Path, segments: &[&str]) -> PathBuf {
    let mut path = install_root.to_path_buf();
    for segment in segments {
        path.push(segment);
    }
    path
}

/// Join segments into an absolute container-side POSIX path.
pub fn container_path(workdir: &str, segments: &[&str]) -> String {
    let mut path = workdir.trim_end_matches('/').to_string();
    for segment in segments {
        path.push('/');
        path.push_str(segment.trim_matches('/'));
    }
    path
}

/// The image tag for a phase snapshot: `habitat-{name}:{id:02}-{phase_name}`.
pub fn snapshot_tag(name: &str, phase_id: u8, phase_name: &str) -> String {
    format!("habitat-{name}:{phase_id:02}-{phase_name}")
}

/// The image tag for the final snapshot: `habitat-{name}:final`.
pub fn final_tag(name: &str) -> String {
    format!("habitat-{name}:final")
}

/// The metadata label key recording a phase's content hash: `{phase}.hash`.
pub fn label_key(phase_name: &str) -> String {
    format!("{phase_name}.hash")
}

/// The `habitat-` tag prefix used to scope all engine queries to our own
/// images (spec §6, `images --filter label=...`).
pub const TAG_PREFIX: &str = "habitat-";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tag_grammar() {
        assert_eq!(snapshot_tag("minimal", 3, "env"), "habitat-minimal:03-env");
        assert_eq!(snapshot_tag("minimal", 12, "final"), "habitat-minimal:12-final");
    }

    #[test]
    fn final_tag_grammar() {
        assert_eq!(final_tag("minimal"), "habitat-minimal:final");
    }

    #[test]
    fn label_key_grammar() {
        assert_eq!(label_key("base"), "base.hash");
        assert_eq!(label_key("users"), "users.hash");
    }

    #[test]
    fn container_path_joins_posix() {
        assert_eq!(
            container_path("/workspace", &["habitat", "repo"]),
            "/workspace/habitat/repo"
        );
        assert_eq!(container_path("/workspace/", &["/repo/"]), "/workspace/repo");
    }

    #[test]
    fn host_rel_builds_under_root() {
        let root = Path::new("/opt/habitat");
        assert_eq!(
            host_rel(root, &["habitats", "demo", "config.yaml"]),
            PathBuf::from("/opt/habitat/habitats/demo/config.yaml")
        );
    }
}
