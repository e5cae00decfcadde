//! `habitat status` -- check engine availability and host state directories.

use crate::engine::docker::DockerEngine;
use crate::engine::ContainerEngine;
use crate::error::HabitatResult;
use crate::session::SessionManager;
use crate::state::state_dir;
use console::style;

pub async fn execute() -> HabitatResult<()> {
    let engine = DockerEngine::new();
    let available = engine.is_available().await.unwrap_or(false);

    if available {
        println!("{} {} engine reachable", style("✓").green(), engine.engine_name());
    } else {
        println!("{} {} engine not reachable", style("✗").red(), engine.engine_name());
    }

    println!("state directory: {}", state_dir().display());

    let manager = SessionManager::new().await?;
    let active = manager.active_count().await?;
    println!("active sessions: {active}");

    Ok(())
}
