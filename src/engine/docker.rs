//! `docker` CLI backend for `ContainerEngine`.
//!
//! Every operation shells out to the `docker` binary, in the same style
//! as the teacher's native Podman runtime: build one `Command`, capture
//! stdout/stderr, translate a non-zero exit into a `HabitatError`.

use crate::engine::{ContainerEngine, ContainerSpec, ExecResult};
use crate::error::{HabitatError, HabitatResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

pub struct DockerEngine {
    binary: String,
}

impl DockerEngine {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    async fn run_captured(&self, args: &[&str]) -> HabitatResult<std::process::Output> {
        debug!(args = ?args, "running docker command");
        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| HabitatError::command_failed(format!("{} {:?}", self.binary, args), e))
    }

    fn engine_error(command: &str, output: &std::process::Output) -> HabitatError {
        HabitatError::EngineFailed {
            command: command.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            timed_out: false,
        }
    }
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn is_available(&self) -> HabitatResult<bool> {
        Ok(Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false))
    }

    async fn build_from_dockerfile(&self, dockerfile_path: &Path, tag: &str) -> HabitatResult<()> {
        let context = dockerfile_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_string_lossy()
            .to_string();
        let dockerfile = dockerfile_path.to_string_lossy().to_string();
        let output = self
            .run_captured(&["build", "-f", &dockerfile, "-t", tag, &context])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker build", &output))
        }
    }

    async fn ensure_image(&self, image: &str) -> HabitatResult<()> {
        if self.image_exists(image).await? {
            return Ok(());
        }
        info!(image, "pulling image");
        let output = self.run_captured(&["pull", image]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker pull", &output))
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> HabitatResult<String> {
        self.ensure_image(&spec.image).await?;

        let mut args: Vec<String> = vec!["create".to_string()];
        if spec.tty {
            args.push("-it".to_string());
        }
        if let Some(workdir) = &spec.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        if let Some(user) = &spec.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        for (k, v) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{k}={v}"));
        }
        for volume in &spec.volumes {
            args.push("-v".to_string());
            let mode = if volume.readonly { ":ro" } else { "" };
            args.push(format!("{}:{}{}", volume.host_path, volume.container_path, mode));
        }
        args.push(spec.image.clone());
        args.push("sleep".to_string());
        args.push("infinity".to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_captured(&arg_refs).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(Self::engine_error("docker create", &output))
        }
    }

    async fn start(&self, container_id: &str) -> HabitatResult<()> {
        let output = self.run_captured(&["start", container_id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker start", &output))
        }
    }

    async fn exec(
        &self,
        container_id: &str,
        command: &[String],
        user: Option<&str>,
        workdir: Option<&str>,
    ) -> HabitatResult<ExecResult> {
        let mut args: Vec<String> = vec!["exec".to_string()];
        if let Some(user) = user {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        if let Some(workdir) = workdir {
            args.push("-w".to_string());
            args.push(workdir.to_string());
        }
        args.push(container_id.to_string());
        args.extend(command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_captured(&arg_refs).await?;
        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn commit(
        &self,
        container_id: &str,
        tag: &str,
        labels: &HashMap<String, String>,
    ) -> HabitatResult<()> {
        let mut args: Vec<String> = vec!["commit".to_string()];
        let mut sorted: Vec<(&String, &String)> = labels.iter().collect();
        sorted.sort_by_key(|(k, _)| k.as_str());
        for (key, value) in sorted {
            args.push("-c".to_string());
            args.push(format!("LABEL {key}=\"{value}\""));
        }
        args.push(container_id.to_string());
        args.push(tag.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_captured(&arg_refs).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker commit", &output))
        }
    }

    async fn stop(&self, container_id: &str) -> HabitatResult<()> {
        let output = self.run_captured(&["stop", container_id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker stop", &output))
        }
    }

    async fn remove_container(&self, container_id: &str) -> HabitatResult<()> {
        let output = self.run_captured(&["rm", "-f", container_id]).await?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such container") {
                Ok(())
            } else {
                Err(Self::engine_error("docker rm", &output))
            }
        }
    }

    async fn attach(
        &self,
        container_id: &str,
        command: &[String],
        user: Option<&str>,
        workdir: Option<&str>,
        tty: bool,
    ) -> HabitatResult<i32> {
        let mut args: Vec<String> = vec!["exec".to_string()];
        if tty {
            args.push("-it".to_string());
        } else {
            args.push("-i".to_string());
        }
        if let Some(user) = user {
            args.push("-u".to_string());
            args.push(user.to_string());
        }
        if let Some(workdir) = workdir {
            args.push("-w".to_string());
            args.push(workdir.to_string());
        }
        args.push(container_id.to_string());
        if command.is_empty() {
            args.push("/bin/bash".to_string());
            args.push("-l".to_string());
        } else {
            args.extend(command.iter().cloned());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let status = Command::new(&self.binary)
            .args(&arg_refs)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| HabitatError::command_failed(format!("docker {:?}", arg_refs), e))?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn is_running(&self, container_id: &str) -> HabitatResult<bool> {
        let output = self
            .run_captured(&["inspect", "-f", "{{.State.Running}}", container_id])
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
    }

    async fn image_exists(&self, tag: &str) -> HabitatResult<bool> {
        let output = self.run_captured(&["image", "inspect", tag]).await?;
        Ok(output.status.success())
    }

    async fn image_labels(&self, tag: &str) -> HabitatResult<Option<HashMap<String, String>>> {
        let output = self
            .run_captured(&["image", "inspect", "-f", "{{json .Config.Labels}}", tag])
            .await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let labels: Option<HashMap<String, String>> = serde_json::from_str(stdout.trim())
            .map_err(HabitatError::from)?;
        Ok(Some(labels.unwrap_or_default()))
    }

    async fn image_list_prefixed(&self, prefix: &str) -> HabitatResult<Vec<String>> {
        let output = self
            .run_captured(&["images", "--format", "{{.Repository}}:{{.Tag}}"])
            .await?;
        if !output.status.success() {
            return Err(Self::engine_error("docker images", &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .filter(|line| line.starts_with(prefix))
            .map(str::to_string)
            .collect())
    }

    async fn image_remove(&self, tag: &str) -> HabitatResult<()> {
        let output = self.run_captured(&["rmi", "-f", tag]).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Self::engine_error("docker rmi", &output))
        }
    }

    fn engine_name(&self) -> &'static str {
        "docker"
    }
}
