//! Phase executor (C5).
//!
//! Runs a phase's declared work inside the current working container.
//! Every command sources `/etc/profile.d/habitat-env.sh` first so a
//! phase's shell commands see the env block materialized by phase 2,
//! without threading `-e` flags through every single exec call.

use crate::config::schema::ScriptEntry;
use crate::engine::ContainerEngine;
use crate::error::{HabitatError, HabitatResult, PhaseErrorKind};
use crate::hash::Phase;

const ENV_PROFILE: &str = "/etc/profile.d/habitat-env.sh";

/// Wrap `command` so it runs under a login-like shell that sources the
/// env profile first.
fn wrap_with_profile(command: &str) -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!(". {ENV_PROFILE} 2>/dev/null || true; {command}"),
    ]
}

/// Write the env profile script from the habitat's expanded `env` block.
/// Grounded on phase 2 ("env") materializing every binding as an `export`
/// line so later phases and the session's own shell inherit it.
pub async fn write_env_profile(
    engine: &dyn ContainerEngine,
    container_id: &str,
    env: &[(String, String)],
) -> HabitatResult<()> {
    let mut script = String::from("#!/bin/sh\n");
    for (key, value) in env {
        script.push_str(&format!("export {key}={}\n", shell_quote(value)));
    }
    let encoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(script.as_bytes())
    };
    let command = format!("echo {encoded} | base64 -d > {ENV_PROFILE} && chmod 644 {ENV_PROFILE}");
    run_phase_command(engine, container_id, &command, None, Phase::Env, PhaseErrorKind::Exec).await
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Run every command in a `scripts[]` entry, in order, as its declared
/// user.
pub async fn run_script(
    engine: &dyn ContainerEngine,
    container_id: &str,
    script: &ScriptEntry,
    phase: Phase,
) -> HabitatResult<()> {
    for command in &script.commands {
        run_phase_command(
            engine,
            container_id,
            command,
            Some(&script.run_as),
            phase,
            PhaseErrorKind::Exec,
        )
        .await?;
    }
    Ok(())
}

/// Run a single shell command inside the working container, reporting any
/// non-zero exit as a `PhaseFailed` error of the given kind.
pub async fn run_phase_command(
    engine: &dyn ContainerEngine,
    container_id: &str,
    command: &str,
    user: Option<&str>,
    phase: Phase,
    kind: PhaseErrorKind,
) -> HabitatResult<()> {
    let wrapped = wrap_with_profile(command);
    let result = engine.exec(container_id, &wrapped, user, None).await?;
    if result.success() {
        Ok(())
    } else {
        Err(HabitatError::PhaseFailed {
            phase_id: phase.id(),
            phase_name: phase.name().to_string(),
            kind,
            message: format!("command failed: {command}"),
            stdout: result.stdout,
            stderr: result.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_with_profile_sources_env_file_first() {
        let wrapped = wrap_with_profile("echo hi");
        assert_eq!(wrapped[0], "sh");
        assert!(wrapped[2].contains(ENV_PROFILE));
        assert!(wrapped[2].ends_with("echo hi"));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
