//! Session CRUD (C10).

use crate::error::{HabitatError, HabitatResult};
use crate::session::state::{Session, SessionStatus};
use crate::state::ensure_state_dirs;
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SessionManager;

impl SessionManager {
    pub async fn new() -> HabitatResult<Self> {
        ensure_state_dirs().await?;
        Ok(Self)
    }

    pub async fn create(&self, session: &Session) -> HabitatResult<()> {
        session.save().await?;
        info!(id = %session.id, habitat = %session.habitat_name, "created session");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> HabitatResult<Option<Session>> {
        Session::load(id).await
    }

    pub async fn list(&self) -> HabitatResult<Vec<Session>> {
        Session::list_all().await
    }

    pub async fn update_status(&self, id: Uuid, status: SessionStatus) -> HabitatResult<()> {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| HabitatError::SessionNotFound(id.to_string()))?;
        session.status = status;
        session.updated_at = Utc::now();
        session.save().await?;
        debug!(id = %id, ?status, "updated session status");
        Ok(())
    }

    pub async fn set_container_id(&self, id: Uuid, container_id: &str) -> HabitatResult<()> {
        let mut session = self
            .get(id)
            .await?
            .ok_or_else(|| HabitatError::SessionNotFound(id.to_string()))?;
        session.container_id = Some(container_id.to_string());
        session.updated_at = Utc::now();
        session.save().await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> HabitatResult<()> {
        let session = self
            .get(id)
            .await?
            .ok_or_else(|| HabitatError::SessionNotFound(id.to_string()))?;
        session.delete().await?;
        info!(id = %id, "deleted session");
        Ok(())
    }

    pub async fn find_by_container(&self, container_id: &str) -> HabitatResult<Option<Session>> {
        let sessions = self.list().await?;
        Ok(sessions
            .into_iter()
            .find(|s| s.container_id.as_deref() == Some(container_id)))
    }

    pub async fn active_count(&self) -> HabitatResult<usize> {
        let sessions = self.list().await?;
        Ok(sessions
            .iter()
            .filter(|s| matches!(s.status, SessionStatus::Running | SessionStatus::Starting))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_status_equality() {
        assert_eq!(SessionStatus::Running, SessionStatus::Running);
        assert_ne!(SessionStatus::Running, SessionStatus::Stopped);
    }
}
