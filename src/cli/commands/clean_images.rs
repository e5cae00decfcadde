//! `habitat clean-images` -- remove stale and orphaned habitat image
//! snapshots.

use crate::cli::args::CleanImagesArgs;
use crate::engine::docker::DockerEngine;
use crate::error::HabitatResult;
use crate::janitor::{self, ImageCategory};
use crate::session::Session;
use console::style;
use std::collections::HashSet;

pub async fn execute(args: &CleanImagesArgs) -> HabitatResult<()> {
    let engine = DockerEngine::new();

    // No on-disk habitat registry exists; a habitat still "known" is one
    // with a session recorded on this host, present or past.
    let known_habitat_names: HashSet<String> = Session::list_all()
        .await?
        .into_iter()
        .map(|s| s.habitat_name)
        .collect();

    if args.dry_run {
        let images = janitor::categorize(&engine, &known_habitat_names).await?;
        let removable: Vec<_> = images
            .iter()
            .filter(|i| matches!(i.category, ImageCategory::Stale | ImageCategory::Orphan))
            .collect();
        for image in &removable {
            println!("would remove {} ({:?})", image.tag, image.category);
        }
        println!("{} {} image(s) would be removed", style("i").blue(), removable.len());
        return Ok(());
    }

    let removed = janitor::clean(&engine, &known_habitat_names).await;
    println!("{} removed {} image(s)", style("✓").green(), removed);
    Ok(())
}
