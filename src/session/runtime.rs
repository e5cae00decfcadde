//! Ephemeral session launch sequence and guaranteed cleanup (C10).
//!
//! `launch` takes a habitat's final snapshot from idle image to an
//! attached, running container, and returns a `SessionGuard` whose
//! `Drop`-adjacent `cleanup()` is the single path every exit (normal,
//! non-zero, SIGINT, SIGTERM, or an abnormal container death) funnels
//! through. Cleanup is idempotent: calling it twice, or on a session that
//! never finished starting, is always safe.

use crate::engine::{ContainerEngine, ContainerSpec, VolumeSpec};
use crate::error::{HabitatError, HabitatResult, SessionErrorKind};
use crate::session::manager::SessionManager;
use crate::session::state::{Session, SessionStatus};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Budget for each cleanup step before escalating to a force-remove.
const CLEANUP_STEP_BUDGET: Duration = Duration::from_secs(5);

pub struct LaunchSpec {
    pub habitat_name: String,
    pub image_tag: String,
    pub workdir: String,
    pub user: Option<String>,
    pub env: Vec<(String, String)>,
    pub volumes: Vec<VolumeSpec>,
    pub init_command: Vec<String>,
    pub startup_delay: Duration,
    pub command: Vec<String>,
}

/// An in-progress or running session, owning the one container it
/// launched. Cleanup must be called exactly once per real container;
/// repeated calls beyond that are no-ops.
pub struct SessionGuard {
    engine: Arc<dyn ContainerEngine>,
    manager: SessionManager,
    session: Session,
    command: Vec<String>,
    user: Option<String>,
    cleaned_up: bool,
}

impl SessionGuard {
    /// Run the session's foreground command attached, returning its exit
    /// code. Detects whether stdout/stdin are TTYs and attaches
    /// accordingly (a non-interactive caller, e.g. a CI runner, still gets
    /// output without requesting a pty).
    pub async fn attach(&mut self) -> HabitatResult<i32> {
        let tty = std::io::stdout().is_terminal() && std::io::stdin().is_terminal();
        let container_id = self
            .session
            .container_id
            .clone()
            .ok_or_else(|| HabitatError::Session {
                kind: SessionErrorKind::Runtime,
                message: "session has no container to attach to".to_string(),
            })?;
        self.manager
            .update_status(self.session.id, SessionStatus::Running)
            .await?;
        self.engine
            .attach(&container_id, &self.command, self.user.as_deref(), Some(&self.session.work_dir), tty)
            .await
    }

    /// Stop and remove the session's container, deleting its state
    /// record. Safe to call more than once.
    pub async fn cleanup(&mut self) -> HabitatResult<()> {
        if self.cleaned_up {
            return Ok(());
        }
        self.cleaned_up = true;

        if let Some(container_id) = self.session.container_id.clone() {
            match timeout(CLEANUP_STEP_BUDGET, self.engine.stop(&container_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "graceful stop failed, forcing removal"),
                Err(_) => warn!("graceful stop timed out, forcing removal"),
            }

            match timeout(CLEANUP_STEP_BUDGET, self.engine.remove_container(&container_id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "container removal failed"),
                Err(_) => warn!("container removal timed out"),
            }
        }

        self.manager
            .update_status(self.session.id, SessionStatus::Stopped)
            .await
            .ok();
        self.manager.delete(self.session.id).await.ok();
        info!(id = %self.session.id, "session cleaned up");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// Launch an ephemeral session from a final snapshot: create the
/// container, start it, run its init command, wait `startup_delay`, then
/// verify it's actually running and its work dir exists before handing
/// back a guard ready to attach.
pub async fn launch(engine: Arc<dyn ContainerEngine>, spec: LaunchSpec) -> HabitatResult<SessionGuard> {
    let manager = SessionManager::new().await?;
    let mut session = Session::new(spec.habitat_name.clone(), spec.workdir.clone());
    manager.create(&session).await?;

    let container_spec = ContainerSpec {
        image: spec.image_tag.clone(),
        workdir: Some(spec.workdir.clone()),
        user: spec.user.clone(),
        env: spec.env.clone(),
        volumes: spec.volumes.clone(),
        tty: true,
        command: spec.command.clone(),
    };

    let container_id = match engine.create(&container_spec).await {
        Ok(id) => id,
        Err(err) => {
            session.status = SessionStatus::Failed;
            session.save().await.ok();
            return Err(HabitatError::Session {
                kind: SessionErrorKind::Startup,
                message: err.to_string(),
            });
        }
    };

    manager.set_container_id(session.id, &container_id).await?;
    session.container_id = Some(container_id.clone());

    if let Err(err) = start_and_verify(engine.as_ref(), &container_id, &spec).await {
        let _ = engine.stop(&container_id).await;
        let _ = engine.remove_container(&container_id).await;
        manager.update_status(session.id, SessionStatus::Failed).await.ok();
        return Err(err);
    }

    Ok(SessionGuard {
        engine,
        manager,
        session,
        command: spec.command.clone(),
        user: spec.user.clone(),
        cleaned_up: false,
    })
}

async fn start_and_verify(engine: &dyn ContainerEngine, container_id: &str, spec: &LaunchSpec) -> HabitatResult<()> {
    engine.start(container_id).await.map_err(|e| HabitatError::Session {
        kind: SessionErrorKind::Startup,
        message: e.to_string(),
    })?;

    if !spec.init_command.is_empty() {
        let result = engine
            .exec(container_id, &spec.init_command, None, Some(&spec.workdir))
            .await?;
        if !result.success() {
            return Err(HabitatError::Session {
                kind: SessionErrorKind::Startup,
                message: format!("init command failed: {}", result.stderr),
            });
        }
    }

    if !spec.startup_delay.is_zero() {
        tokio::time::sleep(spec.startup_delay).await;
    }

    if !engine.is_running(container_id).await? {
        return Err(HabitatError::Session {
            kind: SessionErrorKind::Startup,
            message: "container exited before startup_delay elapsed".to_string(),
        });
    }

    let workdir_check = engine
        .exec(container_id, &["test".into(), "-d".into(), spec.workdir.clone()], None, None)
        .await?;
    if !workdir_check.success() {
        return Err(HabitatError::Session {
            kind: SessionErrorKind::Startup,
            message: format!("work dir {} missing after startup", spec.workdir),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_step_budget_is_five_seconds() {
        assert_eq!(CLEANUP_STEP_BUDGET, Duration::from_secs(5));
    }
}
