//! Sandbox phase orchestration.
//!
//! The runner materializes one sandbox per attempt, writes the artifact files
//! into the attempt's working directory, drives the phases in order and tears
//! the environment down on every exit path, including infrastructure errors
//! and timeouts.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::codegen::GeneratedArtifact;
use crate::error::SandboxError;

use super::{
    attempt_dir, write_pipeline_files, ArtifactLayout, DockerSandbox, Sandbox, SandboxResult,
    SandboxStrategy, VenvSandbox,
};

/// Outcome of running one artifact in a sandbox.
///
/// `test` is `None` when the execution phase failed and the test was skipped.
#[derive(Debug, Clone)]
pub struct AttemptRun {
    pub execution: SandboxResult,
    pub test: Option<SandboxResult>,
}

impl AttemptRun {
    /// Both phases ran and succeeded.
    pub fn succeeded(&self) -> bool {
        self.execution.success && self.test.as_ref().is_some_and(|t| t.success)
    }

    /// Whether the failure happened in the execution phase (as opposed to the
    /// test phase). Meaningless when the run succeeded.
    pub fn failed_in_execution(&self) -> bool {
        !self.execution.success
    }

    /// Diagnostic text from the failed phase, for synthesis feedback.
    pub fn failure_detail(&self) -> Option<String> {
        if !self.execution.success {
            return Some(self.execution.diagnostic());
        }
        match &self.test {
            Some(test) if !test.success => Some(test.diagnostic()),
            _ => None,
        }
    }
}

/// Something that can run a generated artifact in isolation.
///
/// The controller depends on this trait, not on a concrete sandbox, so the
/// retry loop is testable without an interpreter or a Docker daemon.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn run(
        &self,
        pipeline_name: &str,
        attempt: u32,
        artifact: &GeneratedArtifact,
    ) -> Result<AttemptRun, SandboxError>;
}

/// Configuration for the sandbox runner.
#[derive(Debug, Clone)]
pub struct SandboxRunnerConfig {
    /// Strategy used to isolate each attempt.
    pub strategy: SandboxStrategy,
    /// Root directory holding per-pipeline output directories.
    pub pipelines_root: PathBuf,
    /// Data root exposed to generated code via `.env`.
    pub data_root: PathBuf,
    /// Container image for the docker strategy.
    pub image: String,
    /// Deadline for the execution and test phases.
    pub exec_timeout: Duration,
    /// Deadline for environment creation and dependency install.
    pub install_timeout: Duration,
}

/// The production attempt runner.
pub struct SandboxRunner {
    config: SandboxRunnerConfig,
}

impl SandboxRunner {
    pub fn new(config: SandboxRunnerConfig) -> Self {
        Self { config }
    }

    fn build_sandbox(
        &self,
        pipeline_name: &str,
        attempt: u32,
        workdir: PathBuf,
        layout: ArtifactLayout,
    ) -> Box<dyn Sandbox> {
        match self.config.strategy {
            SandboxStrategy::Venv => Box::new(VenvSandbox::new(
                workdir,
                layout,
                self.config.exec_timeout,
                self.config.install_timeout,
            )),
            SandboxStrategy::Docker => Box::new(DockerSandbox::new(
                pipeline_name,
                attempt,
                workdir,
                layout,
                self.config.image.clone(),
                self.config.exec_timeout,
                self.config.install_timeout,
            )),
        }
    }
}

/// Drive the sandbox phases in order.
///
/// Split out of the trait impl so the ordering rules are unit-testable with a
/// fake sandbox.
pub(crate) async fn run_phases(sandbox: &mut dyn Sandbox) -> Result<AttemptRun, SandboxError> {
    sandbox.materialize().await?;
    sandbox.install_dependencies().await?;

    let execution = sandbox.execute().await?;
    if !execution.success {
        return Ok(AttemptRun {
            execution,
            test: None,
        });
    }

    let test = sandbox.run_test().await?;
    Ok(AttemptRun {
        execution,
        test: Some(test),
    })
}

#[async_trait]
impl AttemptRunner for SandboxRunner {
    async fn run(
        &self,
        pipeline_name: &str,
        attempt: u32,
        artifact: &GeneratedArtifact,
    ) -> Result<AttemptRun, SandboxError> {
        let workdir = attempt_dir(&self.config.pipelines_root, pipeline_name, attempt);
        let layout = write_pipeline_files(&workdir, pipeline_name, artifact, &self.config.data_root)?;

        let mut sandbox = self.build_sandbox(pipeline_name, attempt, workdir, layout);

        // Teardown runs whatever the phases returned, then the original
        // outcome propagates.
        let outcome = run_phases(sandbox.as_mut()).await;
        sandbox.teardown().await;

        tracing::info!(
            pipeline = %pipeline_name,
            attempt,
            success = outcome.as_ref().map(|r| r.succeeded()).unwrap_or(false),
            "sandbox attempt finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted sandbox recording phase calls.
    struct FakeSandbox {
        materialize_fails: bool,
        install_fails: bool,
        execute_exit: i32,
        test_exit: i32,
        torn_down: Arc<AtomicBool>,
        test_calls: Arc<AtomicUsize>,
    }

    impl FakeSandbox {
        fn passing() -> Self {
            Self {
                materialize_fails: false,
                install_fails: false,
                execute_exit: 0,
                test_exit: 0,
                torn_down: Arc::new(AtomicBool::new(false)),
                test_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Sandbox for FakeSandbox {
        async fn materialize(&mut self) -> Result<(), SandboxError> {
            if self.materialize_fails {
                return Err(SandboxError::Setup("no environment".to_string()));
            }
            Ok(())
        }

        async fn install_dependencies(&mut self) -> Result<(), SandboxError> {
            if self.install_fails {
                return Err(SandboxError::Setup("pip exploded".to_string()));
            }
            Ok(())
        }

        async fn execute(&mut self) -> Result<SandboxResult, SandboxError> {
            Ok(SandboxResult::from_output(
                "ran".to_string(),
                if self.execute_exit == 0 {
                    String::new()
                } else {
                    "Traceback".to_string()
                },
                self.execute_exit,
            ))
        }

        async fn run_test(&mut self) -> Result<SandboxResult, SandboxError> {
            self.test_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SandboxResult::from_output(
                String::new(),
                if self.test_exit == 0 {
                    String::new()
                } else {
                    "assert failed".to_string()
                },
                self.test_exit,
            ))
        }

        async fn teardown(&mut self) {
            self.torn_down.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn both_phases_succeed() {
        let mut sandbox = FakeSandbox::passing();
        let run = run_phases(&mut sandbox).await.expect("should run");
        assert!(run.succeeded());
        assert!(run.failure_detail().is_none());
    }

    #[tokio::test]
    async fn execution_failure_skips_test() {
        let mut sandbox = FakeSandbox {
            execute_exit: 1,
            ..FakeSandbox::passing()
        };
        let test_calls = sandbox.test_calls.clone();

        let run = run_phases(&mut sandbox).await.expect("should run");
        assert!(!run.succeeded());
        assert!(run.failed_in_execution());
        assert!(run.test.is_none());
        assert_eq!(test_calls.load(Ordering::SeqCst), 0);
        assert_eq!(run.failure_detail().expect("detail"), "Traceback");
    }

    #[tokio::test]
    async fn test_failure_is_reported_with_detail() {
        let mut sandbox = FakeSandbox {
            test_exit: 1,
            ..FakeSandbox::passing()
        };
        let run = run_phases(&mut sandbox).await.expect("should run");
        assert!(!run.succeeded());
        assert!(!run.failed_in_execution());
        assert_eq!(run.failure_detail().expect("detail"), "assert failed");
    }

    #[tokio::test]
    async fn setup_failures_propagate_as_errors() {
        let mut sandbox = FakeSandbox {
            install_fails: true,
            ..FakeSandbox::passing()
        };
        let err = run_phases(&mut sandbox).await.unwrap_err();
        assert!(matches!(err, SandboxError::Setup(_)));

        let mut sandbox = FakeSandbox {
            materialize_fails: true,
            ..FakeSandbox::passing()
        };
        assert!(run_phases(&mut sandbox).await.is_err());
    }
}
