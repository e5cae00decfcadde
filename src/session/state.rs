//! Session state persistence (C10).
//!
//! A running (or recently run) session is one JSON file under the state
//! directory, named by session ID. This is the only durable record of a
//! session between the launch sequence and cleanup -- if the process is
//! killed mid-session, the next `habitat list`/cleanup pass finds it here.

use crate::error::{HabitatError, HabitatResult};
use crate::state::state_dir;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

/// A running session record (spec §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub habitat_name: String,
    pub container_id: Option<String>,
    pub work_dir: String,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn sessions_dir() -> PathBuf {
    state_dir().join("sessions")
}

impl Session {
    pub fn new(habitat_name: String, work_dir: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            habitat_name,
            container_id: None,
            work_dir,
            status: SessionStatus::Starting,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn file_path(&self) -> PathBuf {
        sessions_dir().join(format!("{}.json", self.id))
    }

    fn file_path_for(id: Uuid) -> PathBuf {
        sessions_dir().join(format!("{id}.json"))
    }

    pub async fn load(id: Uuid) -> HabitatResult<Option<Self>> {
        let path = Self::file_path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| HabitatError::io(format!("reading session file {}", path.display()), e))?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    pub async fn save(&self) -> HabitatResult<()> {
        let path = self.file_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| HabitatError::io("creating sessions directory", e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| HabitatError::io(format!("writing session file {}", path.display()), e))?;
        Ok(())
    }

    pub async fn delete(&self) -> HabitatResult<()> {
        let path = self.file_path();
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| HabitatError::io(format!("deleting session file {}", path.display()), e))?;
        }
        Ok(())
    }

    pub async fn list_all() -> HabitatResult<Vec<Session>> {
        let dir = sessions_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut sessions = vec![];
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| HabitatError::io("reading sessions directory", e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| HabitatError::io("reading session entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Ok(content) = fs::read_to_string(&path).await {
                    if let Ok(session) = serde_json::from_str::<Session>(&content) {
                        sessions.push(session);
                    }
                }
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_new_starts_in_starting_status() {
        let session = Session::new("demo".to_string(), "/workspace".to_string());
        assert_eq!(session.status, SessionStatus::Starting);
        assert!(session.container_id.is_none());
    }

    #[test]
    fn session_roundtrips_through_json() {
        let session = Session::new("demo".to_string(), "/workspace".to_string());
        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.habitat_name, session.habitat_name);
        assert_eq!(parsed.id, session.id);
    }
}
