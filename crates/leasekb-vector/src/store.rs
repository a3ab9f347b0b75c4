//! Record storage: parallel vectors, texts, and stable ids.

use leasekb_core::Metadata;
use leasekb_core::error::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable handle for a record. Assigned monotonically, never reused within
/// one store instance, so `ids` is always sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Read-only store summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub count: usize,
    /// Vector width, 0 when the store is empty.
    pub dimension: usize,
    pub has_metadata: bool,
    /// Fraction of records carrying metadata.
    pub metadata_coverage: f32,
}

/// Dense vector store addressed by position.
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    /// Vector width; 0 while empty, locked by the first insert.
    pub(crate) dimension: usize,
    /// Row-major, `ids.len() * dimension` floats.
    pub(crate) vectors: Vec<f32>,
    pub(crate) texts: Vec<String>,
    pub(crate) ids: Vec<RecordId>,
    pub(crate) metadata: HashMap<RecordId, Metadata>,
    pub(crate) next_id: u64,
}

impl VectorStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Vector width, 0 when empty.
    pub fn dimension(&self) -> usize {
        if self.is_empty() { 0 } else { self.dimension }
    }

    /// Append records in input order. Nothing is inserted unless the whole
    /// batch validates.
    pub fn add_batch(
        &mut self,
        vectors: Vec<Vec<f32>>,
        texts: Vec<String>,
        metadata: Option<Vec<Metadata>>,
    ) -> Result<Vec<RecordId>> {
        if vectors.len() != texts.len() {
            return Err(KbError::DimensionMismatch(format!(
                "{} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        if let Some(n) = metadata.as_ref().map(Vec::len).filter(|&n| n != texts.len()) {
            return Err(KbError::DimensionMismatch(format!(
                "{n} metadata entries for {} texts",
                texts.len()
            )));
        }

        let width = if self.is_empty() {
            vectors.first().map(|v| v.len()).unwrap_or(0)
        } else {
            self.dimension
        };
        for (i, v) in vectors.iter().enumerate() {
            if v.is_empty() {
                return Err(KbError::DimensionMismatch(format!(
                    "vector {i} in batch is empty"
                )));
            }
            if v.len() != width {
                return Err(KbError::DimensionMismatch(format!(
                    "vector {i} in batch has width {}, expected {width}",
                    v.len()
                )));
            }
        }

        if vectors.is_empty() {
            return Ok(Vec::new());
        }

        self.dimension = width;
        self.vectors.reserve(vectors.len() * width);
        let mut assigned = Vec::with_capacity(vectors.len());
        let mut meta_iter = metadata.map(|m| m.into_iter());

        for (vector, text) in vectors.into_iter().zip(texts) {
            let id = self.allocate_id();
            self.vectors.extend_from_slice(&vector);
            self.texts.push(text);
            self.ids.push(id);
            if let Some(meta) = meta_iter.as_mut().and_then(|it| it.next()) {
                self.metadata.insert(id, meta);
            }
            assigned.push(id);
        }

        tracing::debug!(
            "Added {} records (total {}, dim {})",
            assigned.len(),
            self.len(),
            self.dimension
        );
        Ok(assigned)
    }

    /// Append one record.
    pub fn add_single(
        &mut self,
        vector: Vec<f32>,
        text: impl Into<String>,
        metadata: Option<Metadata>,
    ) -> Result<RecordId> {
        let ids = self.add_batch(
            vec![vector],
            vec![text.into()],
            metadata.map(|m| vec![m]),
        )?;
        Ok(ids[0])
    }

    /// Replace the record at `index`. `None` fields are left unchanged.
    pub fn update(
        &mut self,
        index: usize,
        text: impl Into<String>,
        vector: Option<Vec<f32>>,
        metadata: Option<Metadata>,
    ) -> Result<()> {
        if index >= self.len() {
            return Err(KbError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        if let Some(width) = vector.as_ref().map(Vec::len).filter(|&w| w != self.dimension) {
            return Err(KbError::DimensionMismatch(format!(
                "update vector has width {width}, store uses {}",
                self.dimension
            )));
        }

        self.texts[index] = text.into();
        if let Some(v) = vector {
            let start = index * self.dimension;
            self.vectors[start..start + self.dimension].copy_from_slice(&v);
        }
        if let Some(meta) = metadata {
            self.metadata.insert(self.ids[index], meta);
        }
        Ok(())
    }

    /// Remove records by position. Indices are deduplicated and applied
    /// highest first; out-of-range entries are ignored. Returns how many
    /// records were removed.
    pub fn remove(&mut self, indices: &[usize]) -> usize {
        let len = self.len();
        let mut targets: Vec<usize> = indices.iter().copied().filter(|&i| i < len).collect();
        targets.sort_unstable_by(|a, b| b.cmp(a));
        targets.dedup();

        for &index in &targets {
            self.remove_at(index);
        }
        if self.is_empty() {
            self.dimension = 0;
        }

        if !targets.is_empty() {
            tracing::debug!("Removed {} records ({} remain)", targets.len(), self.len());
        }
        targets.len()
    }

    fn remove_at(&mut self, index: usize) {
        let id = self.ids.remove(index);
        self.texts.remove(index);
        let start = index * self.dimension;
        self.vectors.drain(start..start + self.dimension);
        self.metadata.remove(&id);
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.vectors.clear();
        self.texts.clear();
        self.ids.clear();
        self.metadata.clear();
        self.dimension = 0;
    }

    pub fn stats(&self) -> StoreStats {
        let count = self.len();
        StoreStats {
            count,
            dimension: self.dimension(),
            has_metadata: !self.metadata.is_empty(),
            metadata_coverage: if count == 0 {
                0.0
            } else {
                self.metadata.len() as f32 / count as f32
            },
        }
    }

    pub fn text(&self, index: usize) -> Option<&str> {
        self.texts.get(index).map(String::as_str)
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn vector(&self, index: usize) -> Option<&[f32]> {
        if index >= self.len() {
            return None;
        }
        let start = index * self.dimension;
        Some(&self.vectors[start..start + self.dimension])
    }

    pub fn metadata(&self, index: usize) -> Option<&Metadata> {
        self.ids.get(index).and_then(|id| self.metadata.get(id))
    }

    pub fn id_at(&self, index: usize) -> Option<RecordId> {
        self.ids.get(index).copied()
    }

    /// Current position of a record, if it still exists.
    pub fn position_of(&self, id: RecordId) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    fn allocate_id(&mut self) -> RecordId {
        let id = RecordId(self.next_id);
        self.next_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(tag: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("tag".into(), json!(tag));
        m
    }

    fn tag_at(store: &VectorStore, index: usize) -> Option<String> {
        store
            .metadata(index)
            .and_then(|m| m.get("tag"))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    fn five_records() -> VectorStore {
        let mut store = VectorStore::new();
        let vectors = (0..5).map(|i| vec![i as f32, 1.0]).collect();
        let texts = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let metadata = ["ma", "mb", "mc", "md", "me"].iter().map(|t| meta(t)).collect();
        store.add_batch(vectors, texts, Some(metadata)).unwrap();
        store
    }

    #[test]
    fn test_add_batch_assigns_positions_in_order() {
        let mut store = VectorStore::new();
        store.add_single(vec![1.0, 0.0], "first", None).unwrap();
        let ids = store
            .add_batch(
                vec![vec![0.0, 1.0], vec![1.0, 1.0]],
                vec!["second".into(), "third".into()],
                None,
            )
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_eq!(store.len(), 3);
        assert_eq!(store.text(1), Some("second"));
        assert_eq!(store.text(2), Some("third"));
        assert_eq!(store.vector(2), Some(&[1.0, 1.0][..]));
        assert_eq!(store.position_of(ids[1]), Some(2));
    }

    #[test]
    fn test_add_batch_count_mismatch() {
        let mut store = VectorStore::new();
        let err = store
            .add_batch(vec![vec![1.0]], vec!["a".into(), "b".into()], None)
            .unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch(_)));

        let err = store
            .add_batch(vec![vec![1.0]], vec!["a".into()], Some(vec![]))
            .unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_rejects_width_mismatch_atomically() {
        let mut store = VectorStore::new();
        store.add_single(vec![1.0, 0.0, 0.0], "a", None).unwrap();

        let err = store
            .add_batch(
                vec![vec![0.0, 1.0, 0.0], vec![0.0, 1.0]],
                vec!["b".into(), "c".into()],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch(_)));
        // Valid first row was not inserted
        assert_eq!(store.len(), 1);
        assert_eq!(store.texts().len(), store.len());
    }

    #[test]
    fn test_add_rejects_empty_vector() {
        let mut store = VectorStore::new();
        assert!(store.add_single(vec![], "empty", None).is_err());
    }

    #[test]
    fn test_update_partial_fields() {
        let mut store = five_records();
        store.update(1, "B", None, None).unwrap();
        assert_eq!(store.text(1), Some("B"));
        assert_eq!(store.vector(1), Some(&[1.0, 1.0][..]));
        assert_eq!(tag_at(&store, 1).as_deref(), Some("mb"));

        store
            .update(2, "C", Some(vec![9.0, 9.0]), Some(meta("new")))
            .unwrap();
        assert_eq!(store.vector(2), Some(&[9.0, 9.0][..]));
        assert_eq!(tag_at(&store, 2).as_deref(), Some("new"));
    }

    #[test]
    fn test_update_out_of_range() {
        let mut store = five_records();
        let err = store.update(5, "x", None, None).unwrap_err();
        assert!(matches!(err, KbError::IndexOutOfRange { index: 5, len: 5 }));
    }

    #[test]
    fn test_update_wrong_width() {
        let mut store = five_records();
        let err = store.update(0, "x", Some(vec![1.0]), None).unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch(_)));
        assert_eq!(store.text(0), Some("a"));
    }

    #[test]
    fn test_remove_shifts_metadata_with_records() {
        let mut store = five_records();
        let removed = store.remove(&[1, 3]);
        assert_eq!(removed, 2);
        assert_eq!(store.texts(), &["a", "c", "e"]);
        assert_eq!(tag_at(&store, 0).as_deref(), Some("ma"));
        assert_eq!(tag_at(&store, 1).as_deref(), Some("mc"));
        assert_eq!(tag_at(&store, 2).as_deref(), Some("me"));
        assert_eq!(store.vector(2), Some(&[4.0, 1.0][..]));
    }

    #[test]
    fn test_remove_ignores_duplicates_and_out_of_range() {
        let mut store = five_records();
        let removed = store.remove(&[2, 2, 99, 2]);
        assert_eq!(removed, 1);
        assert_eq!(store.texts(), &["a", "b", "d", "e"]);
        assert_eq!(store.remove(&[42]), 0);
        assert_eq!(store.len(), 4);
    }

    #[test]
    fn test_sequential_remove_matches_single_call() {
        let mut sequential = five_records();
        sequential.remove(&[3]);
        sequential.remove(&[1]);

        let mut batched = five_records();
        batched.remove(&[3, 1]);

        assert_eq!(sequential.texts(), batched.texts());
        assert_eq!(sequential.vectors, batched.vectors);
        for i in 0..batched.len() {
            assert_eq!(tag_at(&sequential, i), tag_at(&batched, i));
        }
    }

    #[test]
    fn test_ids_survive_removal() {
        let mut store = five_records();
        let id_d = store.id_at(3).unwrap();
        store.remove(&[0]);
        assert_eq!(store.position_of(id_d), Some(2));
        assert_eq!(store.text(2), Some("d"));
        store.remove(&[2]);
        assert_eq!(store.position_of(id_d), None);
    }

    #[test]
    fn test_clear_and_stats() {
        let mut store = five_records();
        let stats = store.stats();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.dimension, 2);
        assert!(stats.has_metadata);
        assert!((stats.metadata_coverage - 1.0).abs() < 1e-6);

        store.clear();
        let stats = store.stats();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.dimension, 0);
        assert!(!stats.has_metadata);

        // Width unlocks once empty
        store.add_single(vec![1.0, 2.0, 3.0], "wide", None).unwrap();
        assert_eq!(store.dimension(), 3);
    }

    #[test]
    fn test_length_invariant_after_every_operation() {
        let mut store = five_records();
        let check = |s: &VectorStore| {
            assert_eq!(s.texts.len(), s.ids.len());
            assert_eq!(s.vectors.len(), s.ids.len() * s.dimension);
            assert!(s.metadata.keys().all(|id| s.ids.contains(id)));
        };
        check(&store);
        store.remove(&[0, 4]);
        check(&store);
        store.update(0, "z", Some(vec![0.5, 0.5]), Some(meta("z"))).unwrap();
        check(&store);
        store.add_single(vec![3.0, 3.0], "f", Some(meta("mf"))).unwrap();
        check(&store);
        store.clear();
        check(&store);
    }
}
