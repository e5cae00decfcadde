//! `habitat stop` -- stop and remove a running session's container.

use crate::cli::args::StopArgs;
use crate::engine::docker::DockerEngine;
use crate::engine::ContainerEngine;
use crate::error::{HabitatError, HabitatResult};
use crate::session::state::SessionStatus;
use crate::session::SessionManager;
use console::style;
use uuid::Uuid;

pub async fn execute(args: &StopArgs) -> HabitatResult<()> {
    let id = Uuid::parse_str(&args.session)
        .map_err(|_| HabitatError::SessionNotFound(args.session.clone()))?;

    let manager = SessionManager::new().await?;
    let session = manager
        .get(id)
        .await?
        .ok_or_else(|| HabitatError::SessionNotFound(args.session.clone()))?;

    let engine = DockerEngine::new();
    if let Some(container_id) = &session.container_id {
        engine.stop(container_id).await?;
        engine.remove_container(container_id).await?;
    }

    manager.update_status(id, SessionStatus::Stopped).await?;
    manager.delete(id).await?;

    println!("{} stopped session {}", style("✓").green(), id);
    Ok(())
}
