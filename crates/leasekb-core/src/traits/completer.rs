//! Completer trait: natural-language answer synthesis.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait Completer: Send + Sync {
    fn name(&self) -> &str;

    /// Generate a reply for `prompt` under the given system instruction.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}
