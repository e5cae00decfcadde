//! `habitat list` -- list known sessions and their status.

use crate::cli::args::{ListArgs, OutputFormat};
use crate::error::HabitatResult;
use crate::session::Session;
use console::style;

pub async fn execute(args: &ListArgs) -> HabitatResult<()> {
    let sessions = Session::list_all().await?;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
        OutputFormat::Plain => {
            for session in &sessions {
                println!(
                    "{}\t{}\t{:?}\t{}",
                    session.id, session.habitat_name, session.status, session.work_dir
                );
            }
        }
        OutputFormat::Table => {
            if sessions.is_empty() {
                println!("no sessions");
                return Ok(());
            }
            println!("{:<38} {:<20} {:<10} {}", "ID", "HABITAT", "STATUS", "WORKDIR");
            for session in &sessions {
                let status = format!("{:?}", session.status).to_lowercase();
                let status = match session.status {
                    crate::session::SessionStatus::Running => style(status).green().to_string(),
                    crate::session::SessionStatus::Failed => style(status).red().to_string(),
                    _ => style(status).yellow().to_string(),
                };
                println!(
                    "{:<38} {:<20} {:<19} {}",
                    session.id, session.habitat_name, status, session.work_dir
                );
            }
        }
    }

    Ok(())
}
