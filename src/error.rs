//! Error types for pipeforge operations.
//!
//! Defines error types for the major subsystems:
//! - LLM API interactions
//! - Pipeline specification synthesis and validation
//! - Source probing and preview extraction
//! - Code synthesis and dependency vetting
//! - Sandbox lifecycle and execution

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: PIPEFORGE_LLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while synthesizing or validating a pipeline spec.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("Spec does not match the required schema: {0}")]
    SchemaInvalid(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors that can occur while probing a pipeline source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("No files match source pattern '{0}'")]
    NoMatchingFiles(String),

    #[error("Failed to read source file '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Invalid source locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Database probe failed: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during code synthesis.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("Dependency manifest contains disallowed package '{0}'")]
    DisallowedDependency(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Errors that can occur during sandbox operations.
///
/// `Setup` covers infrastructure failures (environment creation, dependency
/// install, daemon unavailable) as opposed to failures of the code under
/// test, which are reported through `SandboxResult`.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
