//! Text generation capability.
//!
//! The engine never talks to a model directly. Everything it needs from one
//! goes through [`TextGenerator`]: given a structured prompt, return text,
//! fallibly and slowly. [`ClaudeGenerator`] is the production implementation;
//! tests use [`crate::testing::ScriptedGenerator`].

use crate::config::GameConfig;
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors from the text-generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Text generation timed out")]
    Timeout,

    #[error("Text generation failed: {0}")]
    Backend(String),

    #[error("Text generation returned nothing")]
    EmptyResponse,
}

impl From<claude::Error> for GenerationError {
    fn from(e: claude::Error) -> Self {
        match e {
            claude::Error::Timeout => GenerationError::Timeout,
            other => GenerationError::Backend(other.to_string()),
        }
    }
}

/// What a generation request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationPurpose {
    ScenarioBlueprint,
    NpcDialogue,
    /// What an NPC does between the player's actions.
    NpcAction,
    ClosingNarrative,
}

/// A structured prompt.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: GenerationPurpose,
    pub system: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl GenerationRequest {
    pub fn new(purpose: GenerationPurpose, system: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            purpose,
            system: system.into(),
            messages,
            max_tokens: 1024,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// The last user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == claude::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Source of generated text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;
}

/// Run one generation call with an upper bound on its duration.
pub async fn generate_with_timeout(
    generator: &dyn TextGenerator,
    request: GenerationRequest,
    timeout: Duration,
) -> Result<String, GenerationError> {
    let purpose = request.purpose;
    match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(GenerationError::EmptyResponse),
        Ok(result) => result,
        Err(_) => {
            debug!(?purpose, ?timeout, "Generation call timed out");
            Err(GenerationError::Timeout)
        }
    }
}

// ============================================================================
// Claude
// ============================================================================

/// Text generation backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
}

impl ClaudeGenerator {
    pub fn new(client: Claude) -> Self {
        Self { client }
    }

    /// Wrap `client`, switching to the configured model when one is set.
    pub fn with_config(client: Claude, config: &GameConfig) -> Self {
        match config.model.as_deref().map(str::trim) {
            Some(model) if !model.is_empty() => Self::new(client.with_model(model)),
            _ => Self::new(client),
        }
    }

    /// Build from `ANTHROPIC_API_KEY` with the model named in `config`.
    pub fn from_config(config: &GameConfig) -> Result<Self, GenerationError> {
        Ok(Self::with_config(Claude::from_env()?, config))
    }

    /// Build from `ANTHROPIC_API_KEY`, honouring `MYSTERY_MODEL` when set.
    pub fn from_env() -> Result<Self, GenerationError> {
        Self::from_config(&GameConfig::from_env())
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }
}

#[async_trait]
impl TextGenerator for ClaudeGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut api_request = Request::new(request.messages)
            .with_system(request.system)
            .with_max_tokens(request.max_tokens);
        if let Some(temperature) = request.temperature {
            api_request = api_request.with_temperature(temperature);
        }

        let response = self.client.complete(api_request).await?;
        debug!(
            purpose = ?request.purpose,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Claude generation complete"
        );

        let text = response.text.trim().to_string();
        if text.is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}
