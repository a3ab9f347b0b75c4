//! Keyword routing of queries to corpora.
//!
//! Classification is a coarse pre-filter: it only picks which store a query
//! is searched against. Ranking inside the store is always by embedding.

use std::sync::Arc;

use leasekb_core::config::KnowledgeConfig;
use leasekb_core::error::{KbError, Result};
use leasekb_vector::SearchResult;
use serde::Serialize;

use crate::corpus::CorpusKind;
use crate::registry::KnowledgeRegistry;

/// Keyword-overlap classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    routes: Vec<(CorpusKind, Vec<String>)>,
    default: CorpusKind,
}

impl Classifier {
    /// Keywords are matched case-insensitively.
    pub fn new(routes: Vec<(CorpusKind, Vec<String>)>, default: CorpusKind) -> Self {
        let routes = routes
            .into_iter()
            .map(|(kind, words)| {
                let words = words
                    .iter()
                    .map(|w| normalize(w))
                    .filter(|w| !w.is_empty())
                    .collect();
                (kind, words)
            })
            .collect();
        Self { routes, default }
    }

    /// Every configured corpus with its keyword override or built-in list.
    pub fn from_config(config: &KnowledgeConfig) -> Result<Self> {
        let default = CorpusKind::from_name(&config.default_corpus)
            .ok_or_else(|| KbError::UnknownCorpus(config.default_corpus.clone()))?;
        let mut routes = Vec::with_capacity(config.corpora.len());
        for (name, corpus) in &config.corpora {
            let kind = CorpusKind::from_name(name)
                .ok_or_else(|| KbError::UnknownCorpus(name.clone()))?;
            let keywords = corpus
                .keywords
                .clone()
                .unwrap_or_else(|| kind.default_keywords());
            routes.push((kind, keywords));
        }
        Ok(Self::new(routes, default))
    }

    pub fn default_corpus(&self) -> CorpusKind {
        self.default
    }

    /// Number of distinct keywords of each corpus present in `query`.
    pub fn scores(&self, query: &str) -> Vec<(CorpusKind, usize)> {
        let query = normalize(query);
        self.routes
            .iter()
            .map(|(kind, words)| {
                let hits = words.iter().filter(|w| contains_phrase(&query, w)).count();
                (*kind, hits)
            })
            .collect()
    }

    /// The corpus with strictly the most keyword hits, else the default.
    pub fn classify(&self, query: &str) -> CorpusKind {
        let scores = self.scores(query);
        let best = scores.iter().map(|(_, n)| *n).max().unwrap_or(0);
        let mut leaders = scores.iter().filter(|(_, n)| *n == best);
        let chosen = match (leaders.next(), leaders.next()) {
            (Some((kind, n)), None) if *n > 0 => *kind,
            _ => self.default,
        };
        tracing::debug!("🧭 '{query}' → {chosen} (scores {scores:?})");
        chosen
    }
}

/// Lowercase and collapse whitespace runs to single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole-word (or whole-phrase) containment; both sides pre-normalized.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    // Step one char past each rejected hit; a keyword may overlap itself
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        if !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric) {
            return true;
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Results of a routed search, tagged with the corpus that served them.
#[derive(Debug, Clone, Serialize)]
pub struct RoutedResults {
    pub corpus: CorpusKind,
    pub results: Vec<SearchResult>,
}

/// Classifies queries and searches the selected corpus.
pub struct Router {
    classifier: Classifier,
    registry: Arc<KnowledgeRegistry>,
}

impl Router {
    pub fn new(classifier: Classifier, registry: Arc<KnowledgeRegistry>) -> Self {
        Self {
            classifier,
            registry,
        }
    }

    pub fn classify(&self, query: &str) -> CorpusKind {
        self.classifier.classify(query)
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn registry(&self) -> &Arc<KnowledgeRegistry> {
        &self.registry
    }

    /// Classify, then search the chosen corpus.
    pub async fn search(&self, query: &str, k: usize) -> Result<RoutedResults> {
        let kind = self.classify(query);
        self.search_in(kind, query, k).await
    }

    /// Search an explicit corpus. Upstream failures (embedder, source)
    /// are logged and yield an empty result set.
    pub async fn search_in(&self, kind: CorpusKind, query: &str, k: usize) -> Result<RoutedResults> {
        match self.try_search(kind, query, k).await {
            Ok(results) => Ok(RoutedResults {
                corpus: kind,
                results,
            }),
            Err(e) if e.is_upstream() => {
                tracing::warn!("⚠️ {kind} search failed: {e}");
                Ok(RoutedResults {
                    corpus: kind,
                    results: Vec::new(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn try_search(&self, kind: CorpusKind, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        // Build first so a missing source surfaces before an embedder call
        self.registry.ensure_loaded(kind).await?;
        let vector = self.registry.embedder().embed(query).await?;
        self.registry.search(kind, &vector, k).await
    }
}
