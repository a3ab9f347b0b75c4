//! Embedder trait: turns text into fixed-width vectors.

use async_trait::async_trait;

use crate::error::Result;

/// Produces dense vectors for text. Output is not assumed to be
/// deterministic across calls.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Name of this embedder (e.g., "openai").
    fn name(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
