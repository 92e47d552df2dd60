//! Code synthesis adapter.
//!
//! Turns (spec, preview, optional prior failure) into a [`GeneratedArtifact`]
//! via the generative collaborator. The reply must carry three labeled fenced
//! sections; each is extracted independently and an absent section yields an
//! empty string, leaving the controller to decide what that means. The
//! dependency
//! manifest is vetted against a fixed allow-list before the artifact is
//! returned; a violation invalidates the whole artifact and is never retried.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CodegenError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::prompts::{build_code_prompt, CODE_SYNTHESIS_SYSTEM};
use crate::source::DataPreview;
use crate::spec::PipelineSpec;
use crate::utils::extract_fenced_block;

/// Packages generated pipelines may declare, with minimum versions.
pub const ALLOWED_PACKAGES: [&str; 5] = [
    "pandas>=2.0.0",
    "numpy>=1.24.0",
    "python-dotenv>=1.0.0",
    "pyarrow>=14.0.0",
    "pytest>=7.0.0",
];

/// The code, dependency manifest and test produced for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Main pipeline code.
    pub code: String,
    /// Dependency manifest (requirements.txt content).
    pub requirements: String,
    /// Unit test code.
    pub test_code: String,
}

impl GeneratedArtifact {
    /// Whether the main code section is missing.
    pub fn has_code(&self) -> bool {
        !self.code.trim().is_empty()
    }
}

/// Prior-attempt context fed back into the next synthesis call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationFeedback<'a> {
    /// The previous attempt's main code.
    pub code: &'a str,
    /// The previous attempt's test code.
    pub test_code: &'a str,
    /// The captured error text from the previous attempt.
    pub error: &'a str,
}

/// Extract the package name from a manifest line, before any version
/// separator, lowercased.
fn package_name(line: &str) -> String {
    let mut name = line.trim();
    for sep in ["==", ">=", "<=", "~=", ">", "<", "="] {
        if let Some((head, _)) = name.split_once(sep) {
            name = head;
            break;
        }
    }
    name.trim().to_lowercase()
}

/// Check every manifest line against the allow-list.
///
/// Blank lines and comments are skipped; any other line whose package name is
/// not allow-listed fails the whole manifest.
pub fn check_requirements(manifest: &str) -> Result<(), CodegenError> {
    let allowed: Vec<String> = ALLOWED_PACKAGES.iter().map(|p| package_name(p)).collect();

    for line in manifest.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let name = package_name(trimmed);
        if !allowed.contains(&name) {
            return Err(CodegenError::DisallowedDependency(name));
        }
    }
    Ok(())
}

/// Configuration for the code synthesizer.
#[derive(Debug, Clone)]
pub struct CodeSynthesizerConfig {
    /// Model to use; empty selects the provider default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Token cap for the generated artifact.
    pub max_tokens: u32,
}

impl Default for CodeSynthesizerConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.0,
            max_tokens: 8192,
        }
    }
}

/// Adapter that synthesizes pipeline code artifacts.
pub struct CodeSynthesizer {
    llm: Arc<dyn LlmProvider>,
    config: CodeSynthesizerConfig,
}

impl CodeSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: CodeSynthesizerConfig) -> Self {
        Self { llm, config }
    }

    /// Creates with default configuration.
    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, CodeSynthesizerConfig::default())
    }

    /// Synthesize an artifact for the spec, optionally correcting a prior
    /// failed attempt.
    pub async fn synthesize(
        &self,
        spec: &PipelineSpec,
        preview: &DataPreview,
        feedback: Option<GenerationFeedback<'_>>,
    ) -> Result<GeneratedArtifact, CodegenError> {
        let spec_json = serde_json::to_string_pretty(spec)
            .unwrap_or_else(|_| format!("{:?}", spec));
        let prompt = build_code_prompt(
            &spec.name,
            &spec_json,
            &preview.to_prompt_json(),
            &ALLOWED_PACKAGES,
            feedback.map(|f| (f.code, f.test_code, f.error)),
        );

        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![Message::system(CODE_SYNTHESIS_SYSTEM), Message::user(prompt)],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = self.llm.generate(request).await?;
        let content = response.first_content().unwrap_or_default();

        let artifact = GeneratedArtifact {
            code: extract_fenced_block(content, "python"),
            requirements: extract_fenced_block(content, "requirements.txt"),
            test_code: extract_fenced_block(content, "python test"),
        };

        check_requirements(&artifact.requirements)?;

        tracing::debug!(
            pipeline = %spec.name,
            code_bytes = artifact.code.len(),
            test_bytes = artifact.test_code.len(),
            "code artifact extracted"
        );
        Ok(artifact)
    }
}
