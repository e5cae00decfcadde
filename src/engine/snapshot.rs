//! Snapshot store and resume algorithm (C4).
//!
//! A snapshot is one committed image per completed phase, tagged
//! `habitat-{name}:{phase_id:02}-{phase_name}` and labeled with every
//! ancestor phase's content hash. Resume finds the highest phase whose
//! snapshot exists *and* whose ancestor-hash labels all still match the
//! current config's computed hashes -- a cache hit requires the entire
//! chain up to that point to be unchanged, not just the one phase.

use crate::engine::ContainerEngine;
use crate::error::HabitatResult;
use crate::hash::{all_phase_hashes, Phase};
use crate::paths::{final_tag, label_key, snapshot_tag};
use std::collections::HashMap;
use std::sync::Arc;

pub struct SnapshotStore {
    engine: Arc<dyn ContainerEngine>,
}

impl SnapshotStore {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Labels to stamp on a phase's committed snapshot: its own hash plus
    /// every ancestor's, so a later resume check can verify the whole
    /// chain from a single `image inspect`.
    pub fn labels_for(&self, hashes: &[(Phase, String)], upto: Phase) -> HashMap<String, String> {
        hashes
            .iter()
            .filter(|(phase, _)| *phase <= upto)
            .map(|(phase, hash)| (label_key(phase.name()), hash.clone()))
            .collect()
    }

    /// Commit a working container as the snapshot for `phase`.
    pub async fn commit_phase(
        &self,
        habitat_name: &str,
        container_id: &str,
        phase: Phase,
        hashes: &[(Phase, String)],
    ) -> HabitatResult<String> {
        let tag = if phase == Phase::Final {
            final_tag(habitat_name)
        } else {
            snapshot_tag(habitat_name, phase.id(), phase.name())
        };
        let labels = self.labels_for(hashes, phase);
        self.engine.commit(container_id, &tag, &labels).await?;
        Ok(tag)
    }

    /// Whether the final snapshot already exists and matches every phase
    /// hash, via a single label inspect. When true the whole build is a
    /// no-op: nothing needs to be recreated, recommitted, or re-tagged.
    pub async fn final_matches(&self, habitat_name: &str, hashes: &[(Phase, String)]) -> HabitatResult<bool> {
        let tag = final_tag(habitat_name);
        let Some(labels) = self.engine.image_labels(&tag).await? else {
            return Ok(false);
        };
        Ok(self.labels_match(&labels, hashes, Phase::Final))
    }

    /// Find the highest phase whose snapshot exists and whose recorded
    /// ancestor-hash labels all match `hashes`. Returns `None` if no phase
    /// can be resumed from (phase 0 must run fresh). Walks from the newest
    /// phase backward and stops at the first match, since a match at phase
    /// *k* implies every phase before it was already chained into *k*'s
    /// labels.
    pub async fn resume_point(
        &self,
        habitat_name: &str,
        hashes: &[(Phase, String)],
    ) -> HabitatResult<Option<(Phase, String)>> {
        for (phase, _) in hashes.iter().rev() {
            if *phase == Phase::Final {
                continue;
            }
            let tag = snapshot_tag(habitat_name, phase.id(), phase.name());
            let Some(labels) = self.engine.image_labels(&tag).await? else {
                continue;
            };
            if self.labels_match(&labels, hashes, *phase) {
                return Ok(Some((*phase, tag)));
            }
        }
        Ok(None)
    }

    /// Apply a forced-rebuild floor: even if a later phase's snapshot
    /// would otherwise resume cleanly, never resume past `floor`.
    pub fn apply_rebuild_floor(
        resume: Option<(Phase, String)>,
        floor: Option<Phase>,
    ) -> Option<(Phase, String)> {
        match (resume, floor) {
            (Some((phase, tag)), Some(floor)) if phase < floor => Some((phase, tag)),
            (Some(_), Some(_)) => None,
            (resume, None) => resume,
        }
    }

    fn labels_match(&self, labels: &HashMap<String, String>, hashes: &[(Phase, String)], upto: Phase) -> bool {
        hashes
            .iter()
            .filter(|(phase, _)| *phase <= upto)
            .all(|(phase, hash)| labels.get(&label_key(phase.name())) == Some(hash))
    }
}

/// Convenience: compute a habitat's phase hashes and find its resume
/// point in one call. `Some((Phase::Final, tag))` is a distinguished
/// result meaning the final snapshot itself already matches every phase
/// hash -- the caller has nothing left to build at all.
pub async fn find_resume_point(
    engine: Arc<dyn ContainerEngine>,
    habitat_name: &str,
    config: &crate::config::HabitatConfig,
    forced_floor: Option<Phase>,
) -> HabitatResult<(Vec<(Phase, String)>, Option<(Phase, String)>)> {
    let hashes = all_phase_hashes(config);
    let store = SnapshotStore::new(engine);

    if forced_floor.is_none() && store.final_matches(habitat_name, &hashes).await? {
        return Ok((hashes, Some((Phase::Final, final_tag(habitat_name)))));
    }

    let resume = store.resume_point(habitat_name, &hashes).await?;
    let resume = SnapshotStore::apply_rebuild_floor(resume, forced_floor);
    Ok((hashes, resume))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_for_includes_only_ancestors_up_to_phase() {
        let hashes = vec![
            (Phase::Base, "a".to_string()),
            (Phase::Users, "b".to_string()),
            (Phase::Env, "c".to_string()),
        ];
        let engine: Arc<dyn ContainerEngine> = Arc::new(crate::engine::docker::DockerEngine::new());
        let store = SnapshotStore::new(engine);
        let labels = store.labels_for(&hashes, Phase::Users);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("base.hash"), Some(&"a".to_string()));
        assert_eq!(labels.get("users.hash"), Some(&"b".to_string()));
        assert!(!labels.contains_key("env.hash"));
    }

    #[test]
    fn rebuild_floor_clamps_resume_below_floor() {
        let resume = Some((Phase::Setup, "tag".to_string()));
        let clamped = SnapshotStore::apply_rebuild_floor(resume, Some(Phase::Env));
        assert!(clamped.is_none());
    }

    #[test]
    fn rebuild_floor_keeps_resume_above_floor() {
        let resume = Some((Phase::Env, "tag".to_string()));
        let kept = SnapshotStore::apply_rebuild_floor(resume.clone(), Some(Phase::Setup));
        assert_eq!(kept, resume);
    }

    #[test]
    fn rebuild_floor_noop_without_floor() {
        let resume = Some((Phase::Env, "tag".to_string()));
        let kept = SnapshotStore::apply_rebuild_floor(resume.clone(), None);
        assert_eq!(kept, resume);
    }
}
