//! Offline generator used when `FAKE_LLM=1`

use super::TextGenerator;
use crate::models::Generation;
use crate::Result;

const PREVIEW_CHARS: usize = 400;

/// Answers with a preview of the prompt instead of calling a model
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoGenerator;

#[async_trait::async_trait]
impl TextGenerator for EchoGenerator {
    fn model(&self) -> &str {
        "echo"
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let preview: String = prompt.chars().take(PREVIEW_CHARS).collect();
        Ok(Generation::new(format!(
            "[FAKE_LLM] Resposta gerada a partir do prompt:\n{}...",
            preview
        )))
    }
}
