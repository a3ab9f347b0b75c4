//! Per-corpus vector stores, built on first use.
//!
//! Each corpus owns its own async mutex, so building or querying one corpus
//! never blocks another. On first access a corpus is loaded from its
//! persisted blob; if there is none (or it is corrupt) the source records
//! are embedded and the new store is written back before use.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use leasekb_core::config::KnowledgeConfig;
use leasekb_core::error::{KbError, Result};
use leasekb_core::traits::Embedder;
use leasekb_vector::{SearchResult, StoreStats, VectorStore};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::corpus::CorpusKind;
use crate::source::{CsvSource, RecordSource};

/// File extension of persisted corpus stores.
pub const STORE_EXTENSION: &str = "lkb";

struct CorpusSlot {
    source: Arc<dyn RecordSource>,
    blob_path: PathBuf,
    store: Mutex<Option<VectorStore>>,
}

/// Snapshot of one corpus, taken without forcing a build.
#[derive(Debug, Clone, Serialize)]
pub struct CorpusStatus {
    pub corpus: CorpusKind,
    pub source: String,
    pub blob_path: PathBuf,
    pub blob_exists: bool,
    /// Last write of the persisted blob.
    pub blob_modified: Option<DateTime<Utc>>,
    /// Present once the store is resident in memory.
    pub stats: Option<StoreStats>,
}

/// Owns one lazily built store per corpus.
pub struct KnowledgeRegistry {
    embedder: Arc<dyn Embedder>,
    slots: BTreeMap<CorpusKind, CorpusSlot>,
}

impl KnowledgeRegistry {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            slots: BTreeMap::new(),
        }
    }

    /// Register a corpus. Re-registering replaces the previous entry.
    pub fn with_corpus(
        mut self,
        kind: CorpusKind,
        source: impl RecordSource + 'static,
        blob_path: impl Into<PathBuf>,
    ) -> Self {
        self.slots.insert(
            kind,
            CorpusSlot {
                source: Arc::new(source),
                blob_path: blob_path.into(),
                store: Mutex::new(None),
            },
        );
        self
    }

    /// Register every configured corpus: CSV sources under `data_dir`,
    /// blobs at `<store_dir>/<corpus>.lkb`. Paths must already be expanded.
    pub fn from_config(config: &KnowledgeConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let data_dir = Path::new(&config.data_dir);
        let store_dir = Path::new(&config.store_dir);
        let mut registry = Self::new(embedder);
        for (name, corpus) in &config.corpora {
            let kind = CorpusKind::from_name(name)
                .ok_or_else(|| KbError::UnknownCorpus(name.clone()))?;
            let source = data_dir.join(&corpus.source);
            let blob = store_dir.join(format!("{}.{STORE_EXTENSION}", kind.name()));
            registry = registry.with_corpus(kind, CsvSource::new(source), blob);
        }
        Ok(registry)
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn corpora(&self) -> Vec<CorpusKind> {
        self.slots.keys().copied().collect()
    }

    fn slot(&self, kind: CorpusKind) -> Result<&CorpusSlot> {
        self.slots
            .get(&kind)
            .ok_or_else(|| KbError::UnknownCorpus(kind.name().to_string()))
    }

    /// Load or build the corpus if it is not resident yet.
    pub async fn ensure_loaded(&self, kind: CorpusKind) -> Result<()> {
        let slot = self.slot(kind)?;
        let mut guard = slot.store.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_or_build(kind, slot).await?);
        }
        Ok(())
    }

    /// Run `f` against the corpus store, loading or building it first.
    pub async fn with_store<R>(
        &self,
        kind: CorpusKind,
        f: impl FnOnce(&VectorStore) -> R,
    ) -> Result<R> {
        let slot = self.slot(kind)?;
        let mut guard = slot.store.lock().await;
        let store = match guard.take() {
            Some(store) => store,
            None => self.load_or_build(kind, slot).await?,
        };
        Ok(f(guard.insert(store)))
    }

    pub async fn search(
        &self,
        kind: CorpusKind,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.with_store(kind, |store| store.search(query, k)).await?
    }

    pub async fn stats(&self, kind: CorpusKind) -> Result<StoreStats> {
        self.with_store(kind, VectorStore::stats).await
    }

    pub async fn find_duplicates(&self, kind: CorpusKind, threshold: f32) -> Result<Vec<Vec<usize>>> {
        self.with_store(kind, |store| store.find_duplicates(threshold)).await
    }

    /// Drop near-duplicates from the corpus and persist the result.
    pub async fn remove_duplicates(&self, kind: CorpusKind, threshold: f32) -> Result<usize> {
        let slot = self.slot(kind)?;
        let mut guard = slot.store.lock().await;
        let mut store = match guard.take() {
            Some(store) => store,
            None => self.load_or_build(kind, slot).await?,
        };
        let removed = store.remove_duplicates(threshold);
        let store = if removed > 0 {
            persist(store, slot.blob_path.clone()).await?
        } else {
            store
        };
        *guard = Some(store);
        Ok(removed)
    }

    /// Re-embed the corpus from source, ignoring memory and disk state.
    /// Returns the new record count.
    pub async fn rebuild(&self, kind: CorpusKind) -> Result<usize> {
        let slot = self.slot(kind)?;
        let mut guard = slot.store.lock().await;
        let store = self.build(kind, slot).await?;
        let count = store.len();
        *guard = Some(store);
        Ok(count)
    }

    /// Rebuild every registered corpus concurrently.
    pub async fn rebuild_all(&self) -> Vec<(CorpusKind, Result<usize>)> {
        let kinds = self.corpora();
        let outcomes = futures::future::join_all(kinds.iter().map(|k| self.rebuild(*k))).await;
        kinds.into_iter().zip(outcomes).collect()
    }

    /// Status of every corpus. Does not load anything; a corpus that is
    /// mid-build reports no stats.
    pub fn status(&self) -> Vec<CorpusStatus> {
        let mut out = Vec::with_capacity(self.slots.len());
        for (kind, slot) in &self.slots {
            let modified = std::fs::metadata(&slot.blob_path)
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            let stats = slot
                .store
                .try_lock()
                .ok()
                .and_then(|guard| (*guard).as_ref().map(VectorStore::stats));
            out.push(CorpusStatus {
                corpus: *kind,
                source: slot.source.describe(),
                blob_path: slot.blob_path.clone(),
                blob_exists: slot.blob_path.exists(),
                blob_modified: modified,
                stats,
            });
        }
        out
    }

    async fn load_or_build(&self, kind: CorpusKind, slot: &CorpusSlot) -> Result<VectorStore> {
        let path = slot.blob_path.clone();
        match blocking(move || VectorStore::open(&path)).await {
            Ok(store) => {
                tracing::info!(
                    "📂 Loaded {kind} store: {} records from {}",
                    store.len(),
                    slot.blob_path.display()
                );
                Ok(store)
            }
            Err(KbError::NotFound(_)) => self.build(kind, slot).await,
            Err(KbError::CorruptData(reason)) => {
                tracing::warn!(
                    "⚠️ {kind} store at {} is corrupt ({reason}), rebuilding",
                    slot.blob_path.display()
                );
                self.build(kind, slot).await
            }
            Err(e) => Err(e),
        }
    }

    async fn build(&self, kind: CorpusKind, slot: &CorpusSlot) -> Result<VectorStore> {
        let source = slot.source.clone();
        tracing::info!("🔨 Building {kind} store from {}", source.describe());
        let records = blocking(move || source.read()).await?;
        let prepared = kind.prepare(records);

        let mut store = VectorStore::new();
        if !prepared.is_empty() {
            let vectors = self.embedder.embed_batch(&prepared.embed_texts).await?;
            store.add_batch(vectors, prepared.texts, Some(prepared.metadata))?;
        }

        let store = persist(store, slot.blob_path.clone()).await?;
        tracing::info!(
            "💾 Saved {kind} store: {} records to {}",
            store.len(),
            slot.blob_path.display()
        );
        Ok(store)
    }
}

async fn persist(store: VectorStore, path: PathBuf) -> Result<VectorStore> {
    blocking(move || {
        store.save(&path)?;
        Ok(store)
    })
    .await
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| KbError::Io(std::io::Error::other(e)))?
}
