//! Generative collaborator integration.
//!
//! The spec and code synthesizers talk to an OpenAI-compatible
//! chat-completions endpoint through the [`LlmProvider`] trait, so tests can
//! substitute a mock and the HTTP client stays an implementation detail.

pub mod client;

pub use client::{
    Choice, GenerationRequest, GenerationResponse, JsonSchemaFormat, LlmClient, LlmProvider,
    Message, ResponseFormat, Usage,
};
