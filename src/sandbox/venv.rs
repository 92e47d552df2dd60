//! Per-process isolated runtime strategy.
//!
//! Materializes a Python venv inside the attempt's working directory,
//! installs the declared manifest with its pip, then runs the code and the
//! test with the venv interpreter. Every external command carries a deadline;
//! a timed-out execution is reported as a failed phase, not an infra error,
//! because hanging generated code is something the next attempt can fix.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::SandboxError;

use super::{ArtifactLayout, Sandbox, SandboxResult};

/// Sandbox backed by a Python venv in the attempt directory.
pub struct VenvSandbox {
    workdir: PathBuf,
    layout: ArtifactLayout,
    exec_timeout: Duration,
    install_timeout: Duration,
    materialized: bool,
}

impl VenvSandbox {
    pub fn new(
        workdir: PathBuf,
        layout: ArtifactLayout,
        exec_timeout: Duration,
        install_timeout: Duration,
    ) -> Self {
        Self {
            workdir,
            layout,
            exec_timeout,
            install_timeout,
            materialized: false,
        }
    }

    fn venv_dir(&self) -> PathBuf {
        self.workdir.join("venv")
    }

    fn venv_bin(&self, program: &str) -> PathBuf {
        self.venv_dir().join("bin").join(program)
    }

    /// Run a command in the attempt directory, capturing output.
    ///
    /// A timeout produces a failed [`SandboxResult`] rather than an error so
    /// callers decide how to classify it.
    async fn run_command(
        &self,
        program: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<SandboxResult, SandboxError> {
        let result = tokio::time::timeout(
            timeout,
            Command::new(program)
                .args(args)
                .current_dir(&self.workdir)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(SandboxResult::from_output(
                String::from_utf8_lossy(&output.stdout).to_string(),
                String::from_utf8_lossy(&output.stderr).to_string(),
                output.status.code().unwrap_or(-1),
            )),
            Ok(Err(e)) => Err(SandboxError::Setup(format!(
                "failed to spawn '{}': {}",
                program.display(),
                e
            ))),
            Err(_) => Ok(SandboxResult::failed(format!(
                "command timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

#[async_trait]
impl Sandbox for VenvSandbox {
    async fn materialize(&mut self) -> Result<(), SandboxError> {
        let venv = self.venv_dir();
        let result = self
            .run_command(
                Path::new("python3"),
                &["-m", "venv", &venv.display().to_string()],
                self.install_timeout,
            )
            .await?;
        if !result.success {
            return Err(SandboxError::Setup(format!(
                "venv creation failed: {}",
                result.diagnostic()
            )));
        }
        self.materialized = true;
        tracing::debug!(workdir = %self.workdir.display(), "venv sandbox materialized");
        Ok(())
    }

    async fn install_dependencies(&mut self) -> Result<(), SandboxError> {
        let pip = self.venv_bin("pip");
        let result = self
            .run_command(
                &pip,
                &["install", "-r", &self.layout.requirements_file],
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
        let python = self.venv_bin("python");
        self.run_command(&python, &[self.layout.code_file.as_str()], self.exec_timeout)
            .await
    }

    async fn run_test(&mut self) -> Result<SandboxResult, SandboxError> {
        let python = self.venv_bin("python");
        self.run_command(
            &python,
            &["-m", "pytest", self.layout.test_file.as_str()],
            self.exec_timeout,
        )
        .await
    }

    async fn teardown(&mut self) {
        if !self.materialized {
            return;
        }
        // Remove only the environment; the artifact files stay as the
        // attempt's persisted output.
        if let Err(e) = tokio::fs::remove_dir_all(self.venv_dir()).await {
            tracing::debug!(error = %e, "failed to remove venv dir (may not exist)");
        }
        tracing::debug!(workdir = %self.workdir.display(), "venv sandbox torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox_in(dir: &Path) -> VenvSandbox {
        VenvSandbox::new(
            dir.to_path_buf(),
            ArtifactLayout::for_pipeline("p"),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn venv_paths_live_under_workdir() {
        let sandbox = sandbox_in(Path::new("/work/p/attempt-1"));
        assert_eq!(sandbox.venv_dir(), Path::new("/work/p/attempt-1/venv"));
        assert_eq!(
            sandbox.venv_bin("pip"),
            Path::new("/work/p/attempt-1/venv/bin/pip")
        );
    }

    #[tokio::test]
    async fn teardown_without_materialize_is_a_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sandbox = sandbox_in(dir.path());
        sandbox.teardown().await;
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn run_command_reports_timeout_as_failed_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = VenvSandbox::new(
            dir.path().to_path_buf(),
            ArtifactLayout::for_pipeline("p"),
            Duration::from_millis(50),
            Duration::from_millis(50),
        );

        let result = sandbox
            .run_command(Path::new("sleep"), &["5"], Duration::from_millis(50))
            .await
            .expect("timeout is not an infra error");
        assert!(!result.success);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn run_command_missing_binary_is_setup_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sandbox = sandbox_in(dir.path());

        let err = sandbox
            .run_command(
                Path::new("/nonexistent/interpreter"),
                &[],
                Duration::from_secs(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Setup(_)));
    }
}
