//! Content generation collaborator.
//!
//! Flavour text can optionally be generated by someone else (in practice the
//! connected client, through sampling; see [`crate::mcp::sampling`]). The
//! core only needs to know whether a generator is available and how to ask
//! it for text. Every caller must cope with failure by falling back to the
//! static text it already has.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A request for generated text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Instructions for the generator.
    pub system: String,
    /// What to write about.
    pub prompt: String,
}

impl GenerationRequest {
    /// Creates a request.
    #[must_use]
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// Why generation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// No generator is available.
    #[error("content generation is not available")]
    Unavailable,

    /// The generator did not answer in time.
    #[error("content generation timed out after {0:?}")]
    Timeout(Duration),

    /// The generator answered with an error.
    #[error("content generation was rejected: {0}")]
    Rejected(String),

    /// The answer could not be understood.
    #[error("content generation returned an unexpected payload")]
    Malformed,

    /// The request could not be delivered.
    #[error("content generation request could not be sent")]
    Undeliverable,
}

/// Something that can turn a prompt into text.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Whether [`generate`](Self::generate) can be expected to work.
    fn is_available(&self) -> bool;

    /// Generates text for `request`.
    ///
    /// Implementations must bound the wait; a call never hangs forever.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// A generator that is never available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGenerator;

#[async_trait]
impl ContentGenerator for NoGenerator {
    fn is_available(&self) -> bool {
        false
    }

    async fn generate(&self, _request: GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable)
    }
}

/// Asks `generator` for text if it is available, logging and swallowing any
/// failure.
pub async fn embellish(generator: &dyn ContentGenerator, request: GenerationRequest) -> Option<String> {
    if !generator.is_available() {
        return None;
    }
    match generator.generate(request).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "content generation failed, using static text");
            None
        }
    }
}
