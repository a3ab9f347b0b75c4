//! # LeaseKB Providers
//!
//! Embedding and chat-completion clients for LeaseKB.
//!
//! Every supported backend (OpenAI, OpenRouter, Ollama, llama.cpp, vLLM,
//! Together, Mistral) speaks the OpenAI wire format, so a single
//! `OpenAiCompatibleProvider` serves them all. Backends differ only in
//! base URL, auth style, and whether they expose `/embeddings`.

pub mod openai_compatible;
pub mod provider_registry;

use leasekb_core::config::{CompletionConfig, EmbeddingConfig};
use leasekb_core::error::{KbError, Result};
use leasekb_core::traits::{Completer, Embedder};

use openai_compatible::{ConnectionSettings, OpenAiCompatibleProvider};

/// Create an embedder from configuration.
///
/// Provider names: any registry entry, or `custom:<base-url>`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    let settings = ConnectionSettings {
        provider: config.provider.clone(),
        model: config.model.clone(),
        endpoint: config.endpoint.clone(),
        api_key: config.api_key.clone(),
    };
    let provider = resolve(&settings)?
        .with_embedding_options(config.dimensions, config.batch_size);

    if !provider.supports_embeddings() {
        return Err(KbError::Config(format!(
            "provider '{}' does not serve embeddings",
            config.provider
        )));
    }
    Ok(Box::new(provider))
}

/// Create an answer completer from configuration.
pub fn create_completer(config: &CompletionConfig) -> Result<Box<dyn Completer>> {
    let settings = ConnectionSettings {
        provider: config.provider.clone(),
        model: config.model.clone(),
        endpoint: config.endpoint.clone(),
        api_key: config.api_key.clone(),
    };
    let provider = resolve(&settings)?
        .with_generation_options(config.temperature, config.max_tokens);
    Ok(Box::new(provider))
}

fn resolve(settings: &ConnectionSettings) -> Result<OpenAiCompatibleProvider> {
    if settings.provider.starts_with("custom:") {
        return OpenAiCompatibleProvider::custom(settings);
    }
    let registry = provider_registry::get_provider_config(&settings.provider)
        .ok_or_else(|| {
            KbError::Config(format!(
                "unknown provider: {} (available: {}, or custom:<url>)",
                settings.provider,
                provider_registry::all_provider_names().join(", ")
            ))
        })?;
    OpenAiCompatibleProvider::from_registry(registry, settings)
}
