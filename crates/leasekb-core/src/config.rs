//! LeaseKB configuration system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{KbError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

impl Default for KbConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingConfig::default(),
            completion: CompletionConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }
}

impl KbConfig {
    /// Load config from the default path (~/.leasekb/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KbError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| KbError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| KbError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the LeaseKB home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".leasekb")
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Overrides the provider's base URL when non-empty.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Requested output dimension; 0 lets the model decide.
    #[serde(default)]
    pub dimensions: u32,
    #[serde(default = "default_embedding_batch")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String { "openai".into() }
fn default_embedding_model() -> String { "text-embedding-3-small".into() }
fn default_embedding_batch() -> usize { 64 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: String::new(),
            api_key: String::new(),
            dimensions: 0,
            batch_size: default_embedding_batch(),
        }
    }
}

/// Answer synthesis (chat completion) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn bool_true() -> bool { true }
fn default_completion_provider() -> String { "openai".into() }
fn default_completion_model() -> String { "gpt-3.5-turbo".into() }
fn default_temperature() -> f32 { 0.3 }
fn default_max_tokens() -> u32 { 500 }

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_completion_provider(),
            model: default_completion_model(),
            endpoint: String::new(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Knowledge-base routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory holding corpus source files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Directory holding persisted vector stores.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,
    /// Corpus selected when keyword classification ties.
    #[serde(default = "default_corpus")]
    pub default_corpus: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Maximum characters of retrieved context handed to the completer.
    #[serde(default = "default_context_budget")]
    pub context_char_budget: usize,
    #[serde(default = "default_corpora")]
    pub corpora: BTreeMap<String, CorpusConfig>,
}

fn default_data_dir() -> String { "~/.leasekb/data".into() }
fn default_store_dir() -> String { "~/.leasekb/stores".into() }
fn default_corpus() -> String { "qa".into() }
fn default_top_k() -> usize { 3 }
fn default_context_budget() -> usize { 4000 }

fn default_corpora() -> BTreeMap<String, CorpusConfig> {
    [
        ("qa", "qa_internal_kb.csv"),
        ("property", "HackathonInternalKnowledgeBase.csv"),
        ("master_clauses", "master_clauses.csv"),
    ]
    .into_iter()
    .map(|(name, source)| {
        (
            name.to_string(),
            CorpusConfig {
                source: source.to_string(),
                keywords: None,
            },
        )
    })
    .collect()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_dir: default_store_dir(),
            default_corpus: default_corpus(),
            top_k: default_top_k(),
            context_char_budget: default_context_budget(),
            corpora: default_corpora(),
        }
    }
}

/// Per-corpus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Source file, relative to `data_dir` unless absolute.
    pub source: String,
    /// Replaces the built-in keyword list when set.
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}
