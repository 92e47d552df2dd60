//! Shared utilities for parsing collaborator responses.

pub mod extraction;

pub use extraction::{extract_fenced_block, extract_json_object, truncate};
