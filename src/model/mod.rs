//! Generative model abstraction.
//!
//! Defines the [`GenerativeModel`] trait the extractor and comparator call, so
//! the hosted backend (OpenRouter) can be swapped for a stub in tests.

pub mod openrouter;

/// One attachment following the instruction prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    InlineMedia {
        mime_type: String,
        base64_data: String,
    },
}

impl Part {
    pub fn is_media(&self) -> bool {
        matches!(self, Part::InlineMedia { .. })
    }
}

/// A single request/response call to the model.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub parts: Vec<Part>,
    /// Force the response format to JSON.
    pub json_output: bool,
}

impl GenerationRequest {
    /// Plain text prompt with JSON output.
    pub fn json(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            parts: Vec::new(),
            json_output: true,
        }
    }

    pub fn with_parts(mut self, parts: Vec<Part>) -> Self {
        self.parts = parts;
        self
    }
}

/// Async trait implemented by each model backend.
///
/// Implementations are constructed once and shared across requests.
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, request: GenerationRequest) -> anyhow::Result<String>;
}
