use async_trait::async_trait;

use crate::error::AiError;

// =============================================================================
// Completion options
// =============================================================================

/// How the provider should shape the completion text.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonMode {
    /// Free text.
    Text,
    /// Any valid JSON object (`response_format: json_object`).
    Object,
    /// JSON conforming to a strict schema (`response_format: json_schema`).
    Schema {
        name: String,
        schema: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub json_mode: JsonMode,
    pub max_tokens: Option<u32>,
}

impl CompletionOptions {
    pub fn json(temperature: f32) -> Self {
        Self {
            temperature,
            json_mode: JsonMode::Object,
            max_tokens: None,
        }
    }

    pub fn with_json_mode(mut self, json_mode: JsonMode) -> Self {
        self.json_mode = json_mode;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            json_mode: JsonMode::Text,
            max_tokens: None,
        }
    }
}

// =============================================================================
// TextCompletion Trait
// =============================================================================

/// A single system + user prompt round trip returning the raw completion text.
///
/// Implementations must report HTTP 429 (or an equivalent provider signal) as
/// [`AiError::RateLimited`] so callers can decide whether to back off.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, AiError>;
}
