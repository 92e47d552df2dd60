//! Ephemeral sandbox environments for generated pipeline code.
//!
//! Each build attempt gets a fresh, disposable environment scoped to that
//! attempt only. Two interchangeable strategies implement the same
//! [`Sandbox`] contract: a per-process Python venv and a Docker container.
//! The [`runner`] module owns phase ordering and guarantees teardown on every
//! exit path.

pub mod docker;
pub mod runner;
pub mod venv;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use crate::codegen::GeneratedArtifact;
use crate::error::SandboxError;
use crate::utils::truncate;

pub use docker::DockerSandbox;
pub use runner::{AttemptRun, AttemptRunner, SandboxRunner, SandboxRunnerConfig};
pub use venv::VenvSandbox;

/// Captured outcome of one sandbox phase (execution or test).
#[derive(Debug, Clone, Serialize)]
pub struct SandboxResult {
    /// Whether the phase exited successfully.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Process exit status (-1 when unavailable).
    pub exit_code: i32,
}

impl SandboxResult {
    /// Build a result from captured process output.
    pub fn from_output(stdout: String, stderr: String, exit_code: i32) -> Self {
        Self {
            success: exit_code == 0,
            stdout,
            stderr,
            exit_code,
        }
    }

    /// A failed result with only an error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
        }
    }

    /// Diagnostic text carried into the next attempt's prompt.
    pub fn diagnostic(&self) -> String {
        let detail = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        truncate(detail, 4000)
    }
}

/// Sandbox isolation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxStrategy {
    /// Per-process isolated Python runtime (venv).
    Venv,
    /// Container build-and-run via the Docker daemon.
    Docker,
}

impl std::str::FromStr for SandboxStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "venv" => Ok(SandboxStrategy::Venv),
            "docker" => Ok(SandboxStrategy::Docker),
            other => Err(format!(
                "unknown sandbox strategy '{}', expected 'venv' or 'docker'",
                other
            )),
        }
    }
}

impl std::fmt::Display for SandboxStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxStrategy::Venv => write!(f, "venv"),
            SandboxStrategy::Docker => write!(f, "docker"),
        }
    }
}

/// The isolation capability: one ephemeral environment per attempt.
///
/// `execute` and `run_test` report the code's own failures through
/// [`SandboxResult`]; an `Err` from any method is an infrastructure failure.
#[async_trait]
pub trait Sandbox: Send {
    /// Create the isolated environment.
    async fn materialize(&mut self) -> Result<(), SandboxError>;

    /// Install the declared dependency manifest into the environment.
    async fn install_dependencies(&mut self) -> Result<(), SandboxError>;

    /// Execute the main code artifact.
    async fn execute(&mut self) -> Result<SandboxResult, SandboxError>;

    /// Run the test artifact against the executed code.
    async fn run_test(&mut self) -> Result<SandboxResult, SandboxError>;

    /// Destroy the environment. Must be safe to call in any state.
    async fn teardown(&mut self);
}

/// Filenames for one pipeline's artifact set inside a working directory.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    pub code_file: String,
    pub requirements_file: String,
    pub test_file: String,
}

impl ArtifactLayout {
    pub fn for_pipeline(pipeline_name: &str) -> Self {
        Self {
            code_file: format!("{}.py", pipeline_name),
            requirements_file: "requirements.txt".to_string(),
            test_file: format!("{}_test.py", pipeline_name),
        }
    }
}

/// Write a pipeline's artifact files into `dir`.
///
/// Produces the main code file, the dependency manifest, the test file and a
/// `.env` pointing generated code at the configured data root. Creates the
/// directory if needed.
pub fn write_pipeline_files(
    dir: &Path,
    pipeline_name: &str,
    artifact: &GeneratedArtifact,
    data_root: &Path,
) -> std::io::Result<ArtifactLayout> {
    let layout = ArtifactLayout::for_pipeline(pipeline_name);
    std::fs::create_dir_all(dir)?;
    std::fs::write(dir.join(&layout.code_file), &artifact.code)?;
    std::fs::write(dir.join(&layout.requirements_file), &artifact.requirements)?;
    std::fs::write(dir.join(&layout.test_file), &artifact.test_code)?;
    std::fs::write(
        dir.join(".env"),
        format!("DATA_FOLDER={}\n", data_root.display()),
    )?;
    Ok(layout)
}

/// Per-attempt working directory, never reused by a later attempt.
pub fn attempt_dir(pipelines_root: &Path, pipeline_name: &str, attempt: u32) -> PathBuf {
    pipelines_root
        .join(pipeline_name)
        .join(format!("attempt-{}", attempt))
}
