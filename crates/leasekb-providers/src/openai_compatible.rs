//! Unified OpenAI-compatible provider.
//!
//! One struct serves both embeddings and chat completions for every
//! backend in the registry. Backends differ only in base URL, auth style,
//! and API key.

use async_trait::async_trait;
use leasekb_core::error::{KbError, Result};
use leasekb_core::traits::{Completer, Embedder};
use serde_json::{Value, json};

use crate::provider_registry::{AuthStyle, ProviderConfig};

/// Connection fields shared by the embedding and completion config sections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionSettings {
    pub provider: String,
    pub model: String,
    pub endpoint: String,
    pub api_key: String,
}

/// A provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    name: String,
    model: String,
    api_key: String,
    /// Base URL without trailing slash (e.g., "https://api.openai.com/v1").
    base_url: String,
    chat_path: String,
    embeddings_path: Option<String>,
    auth_style: AuthStyle,
    /// Requested embedding width; 0 leaves it to the model.
    dimensions: u32,
    batch_size: usize,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a known provider config.
    ///
    /// Resolution order:
    /// - API key: `settings.api_key` > env vars > empty
    /// - Base URL: `settings.endpoint` > env override > registry default
    pub fn from_registry(registry: &ProviderConfig, settings: &ConnectionSettings) -> Result<Self> {
        let api_key = if !settings.api_key.is_empty() {
            settings.api_key.clone()
        } else {
            registry
                .env_keys
                .iter()
                .find_map(|key| std::env::var(key).ok())
                .unwrap_or_default()
        };

        let base_url = if !settings.endpoint.is_empty() {
            settings.endpoint.trim_end_matches('/').to_string()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST and friends usually omit the /v1 suffix
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        Ok(Self {
            name: registry.name.to_string(),
            model: settings.model.clone(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            embeddings_path: registry.embeddings_path.map(String::from),
            auth_style: registry.auth_style,
            dimensions: 0,
            batch_size: 64,
            temperature: 0.3,
            max_tokens: 500,
            client: reqwest::Client::new(),
        })
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(settings: &ConnectionSettings) -> Result<Self> {
        let base_url = settings
            .provider
            .strip_prefix("custom:")
            .unwrap_or(&settings.provider)
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(KbError::Config("custom provider needs a base URL".into()));
        }

        let api_key = if !settings.api_key.is_empty() {
            settings.api_key.clone()
        } else {
            std::env::var("CUSTOM_API_KEY").unwrap_or_default()
        };

        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            model: settings.model.clone(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            embeddings_path: Some("/embeddings".to_string()),
            auth_style,
            dimensions: 0,
            batch_size: 64,
            temperature: 0.3,
            max_tokens: 500,
            client: reqwest::Client::new(),
        })
    }

    pub fn with_embedding_options(mut self, dimensions: u32, batch_size: usize) -> Self {
        self.dimensions = dimensions;
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_generation_options(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn supports_embeddings(&self) -> bool {
        self.embeddings_path.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => {
                req.header("Authorization", format!("Bearer {}", self.api_key))
            }
            _ => req,
        }
    }

    fn check_key(&self) -> Result<()> {
        if self.auth_style != AuthStyle::None && self.api_key.is_empty() {
            return Err(KbError::ApiKeyMissing(self.name.clone()));
        }
        Ok(())
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        let req = self.apply_auth(req);

        let resp = req.send().await.map_err(|e| {
            KbError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(KbError::Upstream(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        resp.json()
            .await
            .map_err(|e| KbError::Http(format!("{}: invalid JSON body: {e}", self.name)))
    }
}

/// Request body for `POST /embeddings`.
pub(crate) fn embedding_body(model: &str, inputs: &[String], dimensions: u32) -> Value {
    let mut body = json!({
        "model": model,
        "input": inputs,
    });
    if dimensions > 0 {
        body["dimensions"] = json!(dimensions);
    }
    body
}

/// Extract vectors from an embeddings response, ordered by `index`.
pub(crate) fn parse_embeddings(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json["data"]
        .as_array()
        .ok_or_else(|| KbError::Upstream("No data in embeddings response".into()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (fallback, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(fallback);
        let vector = item["embedding"]
            .as_array()
            .ok_or_else(|| KbError::Upstream(format!("Embedding {index} is not an array")))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| KbError::Upstream(format!("Embedding {index} has a non-number")))
            })
            .collect::<Result<Vec<f32>>>()?;
        indexed.push((index, vector));
    }

    if indexed.len() != expected {
        return Err(KbError::Upstream(format!(
            "Expected {expected} embeddings, got {}",
            indexed.len()
        )));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Request body for `POST /chat/completions`.
pub(crate) fn chat_body(
    model: &str,
    system: &str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": prompt },
        ],
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

/// Extract the first choice's message content.
pub(crate) fn parse_chat(json: &Value) -> Result<String> {
    let choice = json["choices"]
        .get(0)
        .ok_or_else(|| KbError::Upstream("No choices in response".into()))?;
    choice["message"]["content"]
        .as_str()
        .map(|s| s.trim().to_string())
        .ok_or_else(|| KbError::Upstream("Empty message content".into()))
}

#[async_trait]
impl Embedder for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| KbError::Upstream("No embedding returned".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let path = self
            .embeddings_path
            .as_deref()
            .ok_or_else(|| KbError::Config(format!("{} does not serve embeddings", self.name)))?;
        self.check_key()?;

        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let body = embedding_body(&self.model, chunk, self.dimensions);
            let json = self.post_json(path, &body).await?;
            out.extend(parse_embeddings(&json, chunk.len())?);
            tracing::debug!("🧮 {} embedded {}/{}", self.name, out.len(), texts.len());
        }
        Ok(out)
    }
}

#[async_trait]
impl Completer for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        self.check_key()?;
        let body = chat_body(&self.model, system, prompt, self.temperature, self.max_tokens);
        let json = self.post_json(&self.chat_path, &body).await?;
        parse_chat(&json)
    }
}
