//! Deterministic collaborators for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use leasekb_core::error::{KbError, Result};
use leasekb_core::traits::{Completer, Embedder};

const VOCAB: &[&str] = &[
    "rent", "discount", "floor", "plan", "broker", "lease", "clause", "termination", "due",
];

/// Bag-of-keywords vector plus a small bias so nothing embeds to zero.
pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
        .collect();
    v.push(0.1);
    v
}

pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }
}

/// Counts `embed_batch` calls.
#[derive(Default)]
pub struct CountingEmbedder {
    pub batches: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn name(&self) -> &str {
        "counting"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(keyword_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(KbError::Upstream("embedding service unavailable".into()))
    }
}

/// Echoes the prompt back, or fails when built with `failing()`.
pub struct EchoCompleter {
    fail: bool,
}

impl EchoCompleter {
    pub fn ok() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl Completer for EchoCompleter {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(KbError::Upstream("rate limited".into()));
        }
        Ok(format!("  SYNTH[{prompt}]\n"))
    }
}
