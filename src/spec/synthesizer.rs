//! Specification synthesis adapter.
//!
//! Turns accepted request text into a validated [`PipelineSpec`] via the
//! generative collaborator. The response is constrained by a JSON Schema;
//! anything that still fails to parse into the required shape is a
//! `SchemaInvalid` failure. This adapter is the only place spec identity is
//! minted: on success the pipeline name receives a timestamp suffix.

use std::sync::Arc;

use chrono::Utc;

use crate::error::SpecError;
use crate::llm::{GenerationRequest, LlmProvider, Message, ResponseFormat};
use crate::prompts::{build_spec_prompt, SPEC_SYNTHESIS_SYSTEM};
use crate::utils::extract_json_object;

use super::PipelineSpec;

/// Configuration for the spec synthesizer.
#[derive(Debug, Clone)]
pub struct SpecSynthesizerConfig {
    /// Model to use; empty selects the provider default.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Token cap for the structured reply.
    pub max_tokens: u32,
}

impl Default for SpecSynthesizerConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.0,
            max_tokens: 1024,
        }
    }
}

/// Adapter that synthesizes pipeline specs from cleaned request text.
pub struct SpecSynthesizer {
    llm: Arc<dyn LlmProvider>,
    config: SpecSynthesizerConfig,
}

impl SpecSynthesizer {
    pub fn new(llm: Arc<dyn LlmProvider>, config: SpecSynthesizerConfig) -> Self {
        Self { llm, config }
    }

    /// Creates with default configuration.
    pub fn with_defaults(llm: Arc<dyn LlmProvider>) -> Self {
        Self::new(llm, SpecSynthesizerConfig::default())
    }

    /// Synthesize a spec from cleaned input.
    pub async fn synthesize(&self, cleaned_input: &str) -> Result<PipelineSpec, SpecError> {
        let request = GenerationRequest::new(
            self.config.model.clone(),
            vec![
                Message::system(SPEC_SYNTHESIS_SYSTEM),
                Message::user(build_spec_prompt(cleaned_input)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens)
        .with_response_format(ResponseFormat::json_schema(
            "pipeline_spec",
            PipelineSpec::response_schema(),
        ));

        let response = self.llm.generate(request).await?;
        let content = response
            .first_content()
            .ok_or_else(|| SpecError::SchemaInvalid("empty collaborator response".into()))?;

        let json = extract_json_object(content).ok_or_else(|| {
            SpecError::SchemaInvalid("no JSON object in collaborator response".into())
        })?;

        let spec: PipelineSpec = serde_json::from_str(&json)
            .map_err(|e| SpecError::SchemaInvalid(e.to_string()))?;
        spec.validate()?;

        let minted = Self::mint_unique_name(spec);
        tracing::info!(pipeline = %minted.name, source = %minted.source_kind, "pipeline spec synthesized");
        Ok(minted)
    }

    /// Append a generation timestamp so repeated runs of the same request
    /// never collide on pipeline name.
    fn mint_unique_name(mut spec: PipelineSpec) -> PipelineSpec {
        let stamp = Utc::now().format("%Y%m%d_%H%M");
        spec.name = format!("{}_{}", spec.name, stamp);
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use async_trait::async_trait;

    struct MockLlmProvider {
        response: String,
    }

    impl MockLlmProvider {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            _request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            Ok(GenerationResponse {
                id: "test-id".to_string(),
                model: "test-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(self.response.clone()),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage {
                    prompt_tokens: 50,
                    completion_tokens: 100,
                    total_tokens: 150,
                },
            })
        }
    }

    fn valid_spec_json() -> String {
        serde_json::json!({
            "name": "sales_summary",
            "source_kind": "local_csv",
            "source_path": "sales*.csv",
            "destination_kind": "embedded_db",
            "destination_name": "sales_summary",
            "transformation": "aggregate revenue by day",
            "schedule": "0 6 * * *"
        })
        .to_string()
    }

    #[tokio::test]
    async fn synthesize_parses_and_mints_name() {
        let llm = Arc::new(MockLlmProvider::new(&valid_spec_json()));
        let synthesizer = SpecSynthesizer::with_defaults(llm);

        let spec = synthesizer
            .synthesize("build a daily pipeline from sales.csv into a sales_summary table")
            .await
            .expect("should synthesize");

        assert!(spec.name.starts_with("sales_summary_"));
        assert!(spec.name.len() > "sales_summary_".len());
        assert_eq!(spec.source_kind, crate::spec::SourceKind::LocalCsv);
        assert!(spec.source_path.ends_with(".csv"));
    }

    #[tokio::test]
    async fn synthesize_tolerates_fenced_reply() {
        let fenced = format!("```json\n{}\n```", valid_spec_json());
        let llm = Arc::new(MockLlmProvider::new(&fenced));
        let synthesizer = SpecSynthesizer::with_defaults(llm);

        assert!(synthesizer.synthesize("sales rollup").await.is_ok());
    }

    #[tokio::test]
    async fn missing_field_is_schema_invalid() {
        let llm = Arc::new(MockLlmProvider::new(r#"{"name": "x"}"#));
        let synthesizer = SpecSynthesizer::with_defaults(llm);

        let err = synthesizer.synthesize("whatever").await.unwrap_err();
        assert!(matches!(err, SpecError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn non_json_reply_is_schema_invalid() {
        let llm = Arc::new(MockLlmProvider::new("I cannot produce a spec."));
        let synthesizer = SpecSynthesizer::with_defaults(llm);

        let err = synthesizer.synthesize("whatever").await.unwrap_err();
        assert!(matches!(err, SpecError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn wrong_extension_is_schema_invalid() {
        let bad = serde_json::json!({
            "name": "x",
            "source_kind": "local_csv",
            "source_path": "data.parquet",
            "destination_kind": "file",
            "destination_name": "out",
            "transformation": "none",
            "schedule": "@daily"
        })
        .to_string();
        let llm = Arc::new(MockLlmProvider::new(&bad));
        let synthesizer = SpecSynthesizer::with_defaults(llm);

        let err = synthesizer.synthesize("whatever").await.unwrap_err();
        assert!(matches!(err, SpecError::SchemaInvalid(_)));
    }
}
