//! Terminal outcome and attempt-chain types for the synthesis controller.

use serde::Serialize;

use crate::codegen::GeneratedArtifact;
use crate::guard::Finding;
use crate::sandbox::SandboxResult;
use crate::spec::PipelineSpec;

/// Why a build terminated in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The risk gate blocked the input.
    GuardBlocked,
    /// The risk gate flagged the input for review.
    GuardReview,
    /// The collaborator's spec did not match the required schema.
    SchemaInvalid,
    /// The declared source could not be reached or matched nothing.
    SourceUnreachable,
    /// No usable code was extracted from the collaborator.
    GenerationFailed,
    /// The dependency manifest named a package outside the allow-list.
    DisallowedDependency,
    /// The generated code failed to execute.
    ExecutionFailed,
    /// The generated test failed.
    TestFailed,
    /// Every attempt in the budget failed.
    RetryBudgetExhausted,
    /// Sandbox infrastructure failed, independent of the generated code.
    SandboxSetupFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureReason::GuardBlocked => "guard_blocked",
            FailureReason::GuardReview => "guard_review",
            FailureReason::SchemaInvalid => "schema_invalid",
            FailureReason::SourceUnreachable => "source_unreachable",
            FailureReason::GenerationFailed => "generation_failed",
            FailureReason::DisallowedDependency => "disallowed_dependency",
            FailureReason::ExecutionFailed => "execution_failed",
            FailureReason::TestFailed => "test_failed",
            FailureReason::RetryBudgetExhausted => "retry_budget_exhausted",
            FailureReason::SandboxSetupFailed => "sandbox_setup_failed",
        };
        write!(f, "{}", name)
    }
}

/// States of the synthesis controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Gated,
    SpecPending,
    SourceProbed,
    Generating(u32),
    Sandboxing(u32),
    Succeeded,
    Failed(FailureReason),
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildState::Gated => write!(f, "gated"),
            BuildState::SpecPending => write!(f, "spec_pending"),
            BuildState::SourceProbed => write!(f, "source_probed"),
            BuildState::Generating(n) => write!(f, "generating({})", n),
            BuildState::Sandboxing(n) => write!(f, "sandboxing({})", n),
            BuildState::Succeeded => write!(f, "succeeded"),
            BuildState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// One generation-plus-sandbox cycle in the retry chain.
///
/// Attempts are appended, never mutated; each one records the failure text
/// the next attempt's prompt will carry.
#[derive(Debug, Clone)]
pub struct BuildAttempt {
    /// Ordinal number, starting at 1.
    pub number: u32,
    /// The artifact this attempt ran.
    pub artifact: GeneratedArtifact,
    /// Execution-phase result, if the sandbox ran.
    pub execution: Option<SandboxResult>,
    /// Test-phase result; `None` when the test was skipped.
    pub test: Option<SandboxResult>,
    /// Which phase failed, when the attempt failed.
    pub failure: Option<FailureReason>,
    /// Captured error text carried into the next attempt.
    pub error: Option<String>,
}

/// Terminal value of a build.
#[derive(Debug)]
pub enum PipelineBuildOutcome {
    /// The generated code and test both passed.
    Success {
        spec: PipelineSpec,
        artifact: GeneratedArtifact,
        attempts: Vec<BuildAttempt>,
    },
    /// The build terminated without a working pipeline.
    Failure {
        reason: FailureReason,
        detail: String,
        /// Gate findings, populated for guard failures.
        findings: Vec<Finding>,
    },
}

impl PipelineBuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineBuildOutcome::Success { .. })
    }

    /// The failure reason, if this outcome is a failure.
    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            PipelineBuildOutcome::Failure { reason, .. } => Some(*reason),
            PipelineBuildOutcome::Success { .. } => None,
        }
    }

    /// Convenience constructor for failures without findings.
    pub(crate) fn failure(reason: FailureReason, detail: impl Into<String>) -> Self {
        PipelineBuildOutcome::Failure {
            reason,
            detail: detail.into(),
            findings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_display_is_snake_case() {
        assert_eq!(FailureReason::GuardBlocked.to_string(), "guard_blocked");
        assert_eq!(
            FailureReason::RetryBudgetExhausted.to_string(),
            "retry_budget_exhausted"
        );
    }

    #[test]
    fn build_state_display_carries_attempt_number() {
        assert_eq!(BuildState::Generating(2).to_string(), "generating(2)");
        assert_eq!(
            BuildState::Failed(FailureReason::TestFailed).to_string(),
            "failed(test_failed)"
        );
    }

    #[test]
    fn outcome_accessors() {
        let failure = PipelineBuildOutcome::failure(FailureReason::SchemaInvalid, "bad shape");
        assert!(!failure.is_success());
        assert_eq!(
            failure.failure_reason(),
            Some(FailureReason::SchemaInvalid)
        );
    }
}
