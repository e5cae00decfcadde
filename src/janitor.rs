//! Image lifecycle janitor (C12).
//!
//! Categorizes every `habitat-*` snapshot this host knows about, then
//! opportunistically removes the ones nothing needs. Runs at startup in
//! the background; a failure to remove one image is logged and skipped,
//! never raised -- janitorial cleanup must never block a user's actual
//! command.

use crate::engine::ContainerEngine;
use crate::error::HabitatResult;
use crate::paths::TAG_PREFIX;
use crate::session::Session;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCategory {
    /// Backing a container a live session is using right now.
    InUse,
    /// The most recent `final` snapshot for a habitat that still exists.
    Current,
    /// An intermediate phase snapshot superseded by a later one for the
    /// same habitat.
    Stale,
    /// Tagged `habitat-*` but the habitat it was built for no longer
    /// resolves to any known config.
    Orphan,
}

#[derive(Debug, Clone)]
pub struct CategorizedImage {
    pub tag: String,
    pub category: ImageCategory,
}

/// Categorize every `habitat-*` tag the engine knows about.
///
/// `known_habitat_names` is the set of habitats whose config currently
/// resolves (so their `final` tag counts as `Current`, not `Orphan`).
pub async fn categorize(
    engine: &dyn ContainerEngine,
    known_habitat_names: &HashSet<String>,
) -> HabitatResult<Vec<CategorizedImage>> {
    let tags = engine.image_list_prefixed(TAG_PREFIX).await?;
    let in_use_tags = in_use_image_tags().await?;

    let mut by_habitat: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    for tag in &tags {
        if let Some(name) = habitat_name_from_tag(tag) {
            by_habitat.entry(name).or_default().push(tag.clone());
        }
    }

    let mut result = Vec::with_capacity(tags.len());
    for tag in tags {
        if in_use_tags.contains(&tag) {
            result.push(CategorizedImage {
                tag,
                category: ImageCategory::InUse,
            });
            continue;
        }

        let Some(name) = habitat_name_from_tag(&tag) else {
            result.push(CategorizedImage {
                tag,
                category: ImageCategory::Orphan,
            });
            continue;
        };

        if !known_habitat_names.contains(&name) {
            result.push(CategorizedImage {
                tag,
                category: ImageCategory::Orphan,
            });
            continue;
        }

        let category = if tag.ends_with(":final") {
            ImageCategory::Current
        } else {
            ImageCategory::Stale
        };
        result.push(CategorizedImage { tag, category });
    }

    Ok(result)
}

fn habitat_name_from_tag(tag: &str) -> Option<String> {
    let rest = tag.strip_prefix(TAG_PREFIX)?;
    let name = rest.split(':').next()?;
    Some(name.to_string())
}

async fn in_use_image_tags() -> HabitatResult<HashSet<String>> {
    let sessions = Session::list_all().await?;
    Ok(sessions
        .into_iter()
        .filter(|s| s.container_id.is_some())
        .map(|s| format!("{TAG_PREFIX}{}:final", s.habitat_name))
        .collect())
}

/// Remove every `Stale` and `Orphan` image. Logs and continues on
/// individual removal failures.
pub async fn clean(engine: &dyn ContainerEngine, known_habitat_names: &HashSet<String>) -> usize {
    let images = match categorize(engine, known_habitat_names).await {
        Ok(images) => images,
        Err(err) => {
            warn!(error = %err, "janitor failed to categorize images, skipping this run");
            return 0;
        }
    };

    let mut removed = 0;
    for image in images {
        if !matches!(image.category, ImageCategory::Stale | ImageCategory::Orphan) {
            continue;
        }
        match engine.image_remove(&image.tag).await {
            Ok(()) => {
                debug!(tag = %image.tag, "janitor removed image");
                removed += 1;
            }
            Err(err) => warn!(tag = %image.tag, error = %err, "janitor failed to remove image"),
        }
    }
    removed
}

/// Spawn the janitor as a fire-and-forget background task at process
/// startup.
pub fn spawn_background(engine: Arc<dyn ContainerEngine>, known_habitat_names: HashSet<String>) {
    tokio::spawn(async move {
        let removed = clean(engine.as_ref(), &known_habitat_names).await;
        if removed > 0 {
            debug!(removed, "janitor background pass complete");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn habitat_name_from_tag_parses_phase_and_final_tags() {
        assert_eq!(habitat_name_from_tag("habitat-demo:03-env"), Some("demo".to_string()));
        assert_eq!(habitat_name_from_tag("habitat-demo:final"), Some("demo".to_string()));
        assert_eq!(habitat_name_from_tag("other-image:latest"), None);
    }
}
