use async_trait::async_trait;

use crate::core::errors::GatewayError;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Provider name for logs (e.g. "openai").
    fn name(&self) -> &str;

    /// Embeds a single text. Deterministic for a given model version.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, GatewayError>;

    /// Embeds several texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Single-shot chat completion with a system and a user prompt.
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, GatewayError>;
}
