//! Integration tests for the habitat CLI

mod cli_tests {
    use assert_cmd::cargo::cargo_bin_cmd;
    use predicates::prelude::*;

    fn habitat() -> assert_cmd::Command {
        cargo_bin_cmd!("habitat")
    }

    #[test]
    fn help_displays() {
        habitat()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("hermetic"));
    }

    #[test]
    fn version_displays() {
        habitat()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("habitat"));
    }

    #[test]
    fn status_runs() {
        // Status may report the engine as unreachable in CI, but it
        // should never panic.
        let _ = habitat().arg("status").assert();
    }

    #[test]
    fn list_empty() {
        habitat()
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("no sessions").or(predicate::str::contains("ID")));
    }

    #[test]
    fn stop_missing_session() {
        habitat()
            .args(["stop", "00000000-0000-0000-0000-000000000000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("session not found"));
    }

    #[test]
    fn validate_missing_config_file() {
        habitat()
            .args(["validate", "/nonexistent/habitat.yaml"])
            .assert()
            .failure();
    }

    #[test]
    fn clean_images_dry_run() {
        let _ = habitat().args(["clean-images", "--dry-run"]).assert();
    }
}
