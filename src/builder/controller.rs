//! The pipeline synthesis controller.
//!
//! Owns the end-to-end flow: risk gate, spec synthesis, source probe, then
//! the bounded generate-and-sandbox retry loop. Every path terminates in a
//! structured [`PipelineBuildOutcome`]; no internal error escapes the
//! controller.

use std::sync::Arc;

use uuid::Uuid;

use crate::codegen::{CodeSynthesizer, CodeSynthesizerConfig, GeneratedArtifact, GenerationFeedback};
use crate::error::{CodegenError, SpecError};
use crate::guard::{Decision, PromptGuard};
use crate::llm::LlmProvider;
use crate::sandbox::{
    write_pipeline_files, AttemptRunner, SandboxRunner, SandboxRunnerConfig,
};
use crate::source::SourceProber;
use crate::spec::{SpecSynthesizer, SpecSynthesizerConfig};

use super::config::BuildConfig;
use super::outcome::{BuildAttempt, BuildState, FailureReason, PipelineBuildOutcome};

/// The synthesis controller.
///
/// One instance serves many requests; each `build` call is independent and
/// owns its own attempt chain.
pub struct PipelineBuilder {
    guard: PromptGuard,
    spec_synthesizer: SpecSynthesizer,
    prober: SourceProber,
    code_synthesizer: CodeSynthesizer,
    runner: Arc<dyn AttemptRunner>,
    config: BuildConfig,
}

impl PipelineBuilder {
    /// Create a builder with the production sandbox runner.
    pub fn new(llm: Arc<dyn LlmProvider>, config: BuildConfig) -> Self {
        let runner = Arc::new(SandboxRunner::new(SandboxRunnerConfig {
            strategy: config.sandbox_strategy,
            pipelines_root: config.pipelines_root.clone(),
            data_root: config.data_root.clone(),
            image: config.docker_image.clone(),
            exec_timeout: config.exec_timeout,
            install_timeout: config.install_timeout,
        }));
        Self::with_runner(llm, config, runner)
    }

    /// Create a builder with a custom attempt runner.
    pub fn with_runner(
        llm: Arc<dyn LlmProvider>,
        config: BuildConfig,
        runner: Arc<dyn AttemptRunner>,
    ) -> Self {
        let spec_synthesizer = SpecSynthesizer::new(
            llm.clone(),
            SpecSynthesizerConfig {
                model: config.model.clone(),
                temperature: config.temperature,
                ..SpecSynthesizerConfig::default()
            },
        );
        let code_synthesizer = CodeSynthesizer::new(
            llm,
            CodeSynthesizerConfig {
                model: config.model.clone(),
                temperature: config.temperature,
                ..CodeSynthesizerConfig::default()
            },
        );
        let prober = SourceProber::new(config.data_root.clone(), config.preview_rows);

        Self {
            guard: PromptGuard::new(),
            spec_synthesizer,
            prober,
            code_synthesizer,
            runner,
            config,
        }
    }

    /// Run one build end to end.
    pub async fn build(&self, raw_input: &str) -> PipelineBuildOutcome {
        let build_id = Uuid::new_v4();
        let mut state = BuildState::Gated;
        tracing::info!(build = %build_id, state = %state, "build started");

        // Gated: block and non-overridden review short-circuit.
        let assessment = self.guard.analyze(raw_input);
        match assessment.decision {
            Decision::Block => {
                let state = BuildState::Failed(FailureReason::GuardBlocked);
                tracing::warn!(build = %build_id, state = %state, score = assessment.score, "input blocked");
                return PipelineBuildOutcome::Failure {
                    reason: FailureReason::GuardBlocked,
                    detail: format!("risk score {}", assessment.score),
                    findings: assessment.findings,
                };
            }
            Decision::Review => {
                let state = BuildState::Failed(FailureReason::GuardReview);
                tracing::warn!(build = %build_id, state = %state, score = assessment.score, "input needs review");
                return PipelineBuildOutcome::Failure {
                    reason: FailureReason::GuardReview,
                    detail: format!("risk score {}", assessment.score),
                    findings: assessment.findings,
                };
            }
            Decision::Allow => {}
        }

        // SpecPending: mint the pipeline spec.
        state = BuildState::SpecPending;
        tracing::debug!(build = %build_id, state = %state, "synthesizing spec");
        let spec = match self.spec_synthesizer.synthesize(&assessment.cleaned).await {
            Ok(spec) => spec,
            Err(SpecError::SchemaInvalid(detail)) => {
                return PipelineBuildOutcome::failure(FailureReason::SchemaInvalid, detail);
            }
            Err(SpecError::Llm(e)) => {
                return PipelineBuildOutcome::failure(
                    FailureReason::SchemaInvalid,
                    format!("collaborator call failed: {}", e),
                );
            }
        };

        // SourceProbed: the declared source must resolve.
        state = BuildState::SourceProbed;
        tracing::debug!(build = %build_id, state = %state, pipeline = %spec.name, "probing source");
        let preview = match self.prober.probe(&spec).await {
            Ok(preview) => preview,
            Err(e) => {
                return PipelineBuildOutcome::failure(
                    FailureReason::SourceUnreachable,
                    e.to_string(),
                );
            }
        };

        // Generate-and-sandbox loop, strictly sequential.
        let mut attempts: Vec<BuildAttempt> = Vec::new();
        for number in 1..=self.config.max_attempts {
            state = BuildState::Generating(number);
            tracing::info!(build = %build_id, state = %state, pipeline = %spec.name, "synthesizing code");

            let synthesis = {
                let feedback = attempts.last().and_then(|prior| {
                    prior.error.as_deref().map(|error| GenerationFeedback {
                        code: &prior.artifact.code,
                        test_code: &prior.artifact.test_code,
                        error,
                    })
                });
                self.code_synthesizer
                    .synthesize(&spec, &preview, feedback)
                    .await
            };

            let artifact = match synthesis {
                Ok(artifact) => artifact,
                Err(CodegenError::DisallowedDependency(package)) => {
                    return PipelineBuildOutcome::failure(
                        FailureReason::DisallowedDependency,
                        format!("package '{}' is not allow-listed", package),
                    );
                }
                Err(CodegenError::Llm(e)) => {
                    return PipelineBuildOutcome::failure(
                        FailureReason::GenerationFailed,
                        format!("collaborator call failed: {}", e),
                    );
                }
            };

            if !artifact.has_code() {
                return PipelineBuildOutcome::failure(
                    FailureReason::GenerationFailed,
                    "collaborator produced no code section",
                );
            }

            state = BuildState::Sandboxing(number);
            tracing::info!(build = %build_id, state = %state, pipeline = %spec.name, "running sandbox");
            let run = match self.runner.run(&spec.name, number, &artifact).await {
                Ok(run) => run,
                Err(e) => {
                    // Infrastructure failures abort without consuming the
                    // retry budget; the generated code cannot fix them.
                    return PipelineBuildOutcome::failure(
                        FailureReason::SandboxSetupFailed,
                        e.to_string(),
                    );
                }
            };

            if run.succeeded() {
                attempts.push(BuildAttempt {
                    number,
                    artifact: artifact.clone(),
                    execution: Some(run.execution),
                    test: run.test,
                    failure: None,
                    error: None,
                });
                self.persist_final_artifact(&spec.name, &artifact);
                let state = BuildState::Succeeded;
                tracing::info!(build = %build_id, state = %state, pipeline = %spec.name, attempts = number, "build succeeded");
                return PipelineBuildOutcome::Success {
                    spec,
                    artifact,
                    attempts,
                };
            }

            let failure = if run.failed_in_execution() {
                FailureReason::ExecutionFailed
            } else {
                FailureReason::TestFailed
            };
            let error = run
                .failure_detail()
                .unwrap_or_else(|| "no diagnostic output captured".to_string());
            tracing::warn!(
                build = %build_id,
                pipeline = %spec.name,
                attempt = number,
                reason = %failure,
                "attempt failed"
            );
            attempts.push(BuildAttempt {
                number,
                artifact,
                execution: Some(run.execution),
                test: run.test,
                failure: Some(failure),
                error: Some(error),
            });
        }

        let last_error = attempts
            .last()
            .and_then(|a| a.error.clone())
            .unwrap_or_default();
        let state = BuildState::Failed(FailureReason::RetryBudgetExhausted);
        tracing::warn!(build = %build_id, state = %state, pipeline = %spec.name, "retry budget exhausted");
        PipelineBuildOutcome::failure(
            FailureReason::RetryBudgetExhausted,
            format!(
                "{} attempts failed; last error: {}",
                self.config.max_attempts, last_error
            ),
        )
    }

    /// Write the winning artifact to the per-pipeline output directory.
    ///
    /// The attempt workspace already holds a copy; failing to persist the
    /// top-level set does not fail an otherwise successful build.
    fn persist_final_artifact(&self, pipeline_name: &str, artifact: &GeneratedArtifact) {
        let final_dir = self.config.pipelines_root.join(pipeline_name);
        if let Err(e) =
            write_pipeline_files(&final_dir, pipeline_name, artifact, &self.config.data_root)
        {
            tracing::warn!(pipeline = %pipeline_name, error = %e, "failed to persist final artifact");
        }
    }
}
