//! Host-side state directory layout and the "last habitat used" marker.

use crate::error::{HabitatError, HabitatResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Root of all persisted habitat state (sessions, audit log, last-used
/// marker). `dirs::state_dir()` falls back to the local data dir on
/// platforms without a dedicated state directory (e.g. macOS).
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("habitat")
}

pub fn sessions_dir() -> PathBuf {
    state_dir().join("sessions")
}

pub fn audit_log_path() -> PathBuf {
    state_dir().join("audit.log")
}

fn last_used_path() -> PathBuf {
    state_dir().join("last-used.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastUsed {
    pub habitat_name: String,
    pub used_at: chrono::DateTime<chrono::Utc>,
}

/// Record the most recently launched habitat, so a bare `habitat start`
/// with no name can fall back to "whatever I ran last".
pub async fn record_last_used(habitat_name: &str) -> HabitatResult<()> {
    ensure_state_dirs().await?;
    let marker = LastUsed {
        habitat_name: habitat_name.to_string(),
        used_at: chrono::Utc::now(),
    };
    let content = serde_json::to_string_pretty(&marker)?;
    fs::write(last_used_path(), content)
        .await
        .map_err(|e| HabitatError::io("writing last-used marker", e))
}

pub async fn read_last_used() -> HabitatResult<Option<LastUsed>> {
    let path = last_used_path();
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| HabitatError::io(format!("reading {}", path.display()), e))?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub async fn ensure_state_dirs() -> HabitatResult<()> {
    for dir in [state_dir(), sessions_dir()] {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| HabitatError::io(format!("creating directory {}", dir.display()), e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_dir_is_namespaced_under_habitat() {
        assert!(state_dir().ends_with("habitat"));
    }
}
