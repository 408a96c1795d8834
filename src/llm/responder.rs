//! Memoized text generation
//!
//! Prompts are rendered from a template and answered through the
//! cache-aside memoizer, so repeating a question within the TTL does not hit
//! the model again.

use super::TextGenerator;
use crate::cache::Memoizer;
use crate::Result;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Prompt with `{placeholder}` slots
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Substitute every `{key}`; unknown placeholders are left as written.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        vars.iter().fold(self.template.clone(), |acc, (key, value)| {
            acc.replace(&format!("{{{}}}", key), value)
        })
    }
}

pub struct Responder {
    generator: Arc<dyn TextGenerator>,
    memoizer: Arc<Memoizer>,
    ttl: Duration,
}

impl Responder {
    pub fn new(generator: Arc<dyn TextGenerator>, memoizer: Arc<Memoizer>, ttl: Duration) -> Self {
        Self {
            generator,
            memoizer,
            ttl,
        }
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    /// Answer `prompt`, reusing a cached answer when one is still valid.
    pub async fn reply(&self, prompt: &str) -> Result<String> {
        let key = cache_key(self.generator.model(), prompt);
        let generator = self.generator.clone();
        self.memoizer
            .get_or_compute(&key, self.ttl, || async move {
                generator.generate(prompt).await.map(|generation| generation.text)
            })
            .await
    }
}

/// `llm:<sha256(model, prompt)>`
pub fn cache_key(model: &str, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.as_bytes());
    format!("llm:{}", hex::encode(hasher.finalize()))
}
