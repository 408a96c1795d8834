//! Text generation collaborators
//!
//! Every provider is normalised to [`Generation`] at this boundary, and any
//! provider failure surfaces as [`AgentError::GenerationFailure`].

pub mod echo;
pub mod gemini;
pub mod openai;
pub mod responder;

pub use echo::EchoGenerator;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use responder::{PromptTemplate, Responder};

use crate::config::{AppConfig, LlmProvider};
use crate::error::AgentError;
use crate::models::Generation;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Trait for a hosted (or fake) language model
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Model identifier; part of the memoization key.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<Generation>;
}

/// Build the generator selected by configuration.
pub fn build_generator(config: &AppConfig) -> Result<Arc<dyn TextGenerator>> {
    if config.fake_llm {
        info!("LLM backend: offline echo");
        return Ok(Arc::new(EchoGenerator));
    }

    match config.llm_provider {
        LlmProvider::Gemini => {
            info!(model = %config.gemini_model, "LLM backend: gemini");
            let mut client = GeminiClient::new(
                config.gemini_api_key.clone().unwrap_or_default(),
                config.gemini_model.clone(),
            )?;
            if let Some(url) = &config.gemini_base_url {
                client = client.with_base_url(url.as_str());
            }
            Ok(Arc::new(client))
        }
        LlmProvider::OpenAi => {
            info!(model = %config.openai_model, "LLM backend: openai");
            let mut client = OpenAiClient::new(
                config.openai_api_key.clone().unwrap_or_default(),
                config.openai_model.clone(),
            )?;
            if let Some(url) = &config.openai_base_url {
                client = client.with_base_url(url.as_str());
            }
            Ok(Arc::new(client))
        }
    }
}

pub(crate) fn missing_key(var: &str) -> AgentError {
    AgentError::GenerationFailure(format!("{} not configured", var))
}
