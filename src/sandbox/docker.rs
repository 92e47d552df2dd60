//! Container strategy via the Docker daemon API.
//!
//! Materializes a container with the attempt directory bind-mounted at
//! `/workspace`, execs the install/run/test phases inside it and
//! force-removes the container on teardown. The container runs `sleep` as its
//! main process so phases are individual execs with collected output.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use crate::error::SandboxError;

use super::{ArtifactLayout, Sandbox, SandboxResult};

/// Default image for pipeline containers.
pub const DEFAULT_IMAGE: &str = "python:3.11-slim";

/// Sandbox backed by an ephemeral Docker container.
pub struct DockerSandbox {
    container_name: String,
    workdir: PathBuf,
    layout: ArtifactLayout,
    image: String,
    exec_timeout: Duration,
    install_timeout: Duration,
    docker: Option<Docker>,
    container_id: Option<String>,
}

impl DockerSandbox {
    pub fn new(
        pipeline_name: &str,
        attempt: u32,
        workdir: PathBuf,
        layout: ArtifactLayout,
        image: String,
        exec_timeout: Duration,
        install_timeout: Duration,
    ) -> Self {
        let safe_name: String = pipeline_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        Self {
            container_name: format!("pipeforge-{}-attempt{}", safe_name, attempt),
            workdir,
            layout,
            image,
            exec_timeout,
            install_timeout,
            docker: None,
            container_id: None,
        }
    }

    fn docker(&self) -> Result<&Docker, SandboxError> {
        self.docker
            .as_ref()
            .ok_or_else(|| SandboxError::Setup("container not materialized".to_string()))
    }

    /// Execute a command inside the container, collecting output with a
    /// deadline. A timeout is reported as a failed result.
    async fn exec_command(
        &self,
        cmd: Vec<String>,
        timeout: Duration,
    ) -> Result<SandboxResult, SandboxError> {
        let docker = self.docker()?;
        let container_id = self
            .container_id
            .as_deref()
            .ok_or_else(|| SandboxError::Setup("container not materialized".to_string()))?;

        let exec = docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some("/workspace".to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::Setup(format!("failed to create exec: {}", e)))?;

        let collect = async {
            let start_result = docker
                .start_exec(&exec.id, None)
                .await
                .map_err(|e| SandboxError::Setup(format!("failed to start exec: {}", e)))?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            if let StartExecResults::Attached { mut output, .. } = start_result {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return Err(SandboxError::Setup(format!(
                                "error reading exec output: {}",
                                e
                            )));
                        }
                    }
                }
            }

            let exec_info = docker
                .inspect_exec(&exec.id)
                .await
                .map_err(|e| SandboxError::Setup(format!("failed to inspect exec: {}", e)))?;
            let exit_code = exec_info.exit_code.unwrap_or(-1) as i32;

            Ok(SandboxResult::from_output(stdout, stderr, exit_code))
        };

        match tokio::time::timeout(timeout, collect).await {
            Ok(result) => result,
            Err(_) => Ok(SandboxResult::failed(format!(
                "container command timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn materialize(&mut self) -> Result<(), SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::DaemonUnavailable(e.to_string()))?;

        // Pull the image; a no-op when it is already present locally.
        let mut pull = docker.create_image(
            Some(CreateImageOptions {
                from_image: self.image.as_str(),
                ..Default::default()
            }),
            None,
            None,
        );
        while let Some(progress) = pull.next().await {
            progress.map_err(|e| {
                SandboxError::Setup(format!("failed to pull image '{}': {}", self.image, e))
            })?;
        }

        let host_config = HostConfig {
            binds: Some(vec![format!("{}:/workspace", self.workdir.display())]),
            network_mode: Some("bridge".to_string()),
            ..Default::default()
        };

        let response = docker
            .create_container(
                Some(CreateContainerOptions {
                    name: self.container_name.clone(),
                    platform: None,
                }),
                Config {
                    image: Some(self.image.clone()),
                    cmd: Some(vec!["sleep".to_string(), "7200".to_string()]),
                    working_dir: Some("/workspace".to_string()),
                    host_config: Some(host_config),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::Setup(format!("failed to create container: {}", e)))?;

        docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Setup(format!("failed to start container: {}", e)))?;

        tracing::debug!(
            container = %self.container_name,
            image = %self.image,
            "docker sandbox materialized"
        );
        self.container_id = Some(response.id);
        self.docker = Some(docker);
        Ok(())
    }

    async fn install_dependencies(&mut self) -> Result<(), SandboxError> {
        let result = self
            .exec_command(
                vec![
                    "pip".to_string(),
                    "install".to_string(),
                    "--no-cache-dir".to_string(),
                    "-r".to_string(),
                    self.layout.requirements_file.clone(),
                ],
                self.install_timeout,
            )
            .await?;
        if !result.success {
            return Err(SandboxError::Setup(format!(
                "dependency install failed: {}",
                result.diagnostic()
            )));
        }
        Ok(())
    }

    async fn execute(&mut self) -> Result<SandboxResult, SandboxError> {
        self.exec_command(
            vec!["python".to_string(), self.layout.code_file.clone()],
            self.exec_timeout,
        )
        .await
    }

    async fn run_test(&mut self) -> Result<SandboxResult, SandboxError> {
        self.exec_command(
            vec![
                "python".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                self.layout.test_file.clone(),
            ],
            self.exec_timeout,
        )
        .await
    }

    async fn teardown(&mut self) {
        let (Some(docker), Some(container_id)) = (self.docker.take(), self.container_id.take())
        else {
            return;
        };
        if let Err(e) = docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(container = %self.container_name, error = %e, "failed to remove container");
        } else {
            tracing::debug!(container = %self.container_name, "docker sandbox torn down");
        }
    }
}
