//! Nearest-neighbour retrieval by cosine similarity.

use leasekb_core::Metadata;
use leasekb_core::error::{KbError, Result};
use serde::{Deserialize, Serialize};

use crate::similarity::{cosine_with_norms, norm_squared};
use crate::store::{RecordId, VectorStore};

/// A single search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Position at query time.
    pub position: usize,
    pub id: RecordId,
    pub text: String,
    /// Cosine similarity; higher is closer.
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl VectorStore {
    /// Return the `k` records most similar to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let ranked = self.rank(query)?;
        Ok(ranked
            .into_iter()
            .take(k)
            .map(|(pos, score)| self.result_at(pos, score))
            .collect())
    }

    /// Rank every record, then keep the first `k` that satisfy `predicate`.
    /// Rejected records do not count toward `k`.
    pub fn search_with_filter<F>(
        &self,
        query: &[f32],
        k: usize,
        mut predicate: F,
    ) -> Result<Vec<SearchResult>>
    where
        F: FnMut(&str, Option<&Metadata>) -> bool,
    {
        let ranked = self.rank(query)?;
        let mut kept = Vec::with_capacity(k.min(ranked.len()));
        for (pos, score) in ranked {
            if kept.len() >= k {
                break;
            }
            if predicate(self.texts[pos].as_str(), self.metadata(pos)) {
                kept.push(self.result_at(pos, score));
            }
        }
        Ok(kept)
    }

    /// Score every record against `query`, sorted by descending score.
    fn rank(&self, query: &[f32]) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(KbError::DimensionMismatch(format!(
                "query has width {}, store uses {}",
                query.len(),
                self.dimension
            )));
        }

        let qn = norm_squared(query);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(pos, v)| (pos, cosine_with_norms(query, qn, v, norm_squared(v))))
            .collect();

        // Stable: ties stay in position order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }

    fn result_at(&self, pos: usize, score: f32) -> SearchResult {
        SearchResult {
            position: pos,
            id: self.ids[pos],
            text: self.texts[pos].clone(),
            score,
            metadata: self.metadata(pos).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine_similarity;
    use serde_json::json;

    fn greek_store() -> VectorStore {
        let mut store = VectorStore::new();
        store
            .add_batch(
                vec![vec![0.9, 0.1, 0.0], vec![0.0, 0.2, 1.0], vec![0.6, 0.5, 0.1]],
                vec!["alpha".into(), "beta".into(), "gamma".into()],
                None,
            )
            .unwrap();
        store
    }

    #[test]
    fn test_search_orders_by_score() {
        let store = greek_store();
        let q = [1.0, 0.2, 0.0];
        let results = store.search(&q, 2).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "alpha");
        assert_eq!(results[1].text, "gamma");
        let expected_alpha = cosine_similarity(&q, &[0.9, 0.1, 0.0]);
        let expected_gamma = cosine_similarity(&q, &[0.6, 0.5, 0.1]);
        assert!((results[0].score - expected_alpha).abs() < 1e-6);
        assert!((results[1].score - expected_gamma).abs() < 1e-6);
        assert_eq!(results[0].position, 0);
        assert_eq!(results[1].position, 2);
    }

    #[test]
    fn test_search_scores_descend() {
        let store = greek_store();
        let results = store.search(&[0.1, 0.9, 0.3], 10).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_search_k_bounds() {
        let store = greek_store();
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 0).unwrap().len(), 0);
        assert_eq!(store.search(&[1.0, 0.0, 0.0], 100).unwrap().len(), 3);

        let empty = VectorStore::new();
        assert!(empty.search(&[1.0, 0.0], 5).unwrap().is_empty());
        // Width is unchecked on an empty store
        assert!(empty.search(&[1.0; 7], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let store = greek_store();
        let err = store.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, KbError::DimensionMismatch(_)));
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut store = VectorStore::new();
        let texts: Vec<String> = (0..6).map(|i| format!("dup-{i}")).collect();
        store.add_batch(vec![vec![1.0, 1.0]; 6], texts, None).unwrap();
        let results = store.search(&[2.0, 2.0], 6).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.position).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_filter_does_not_consume_budget() {
        let mut store = VectorStore::new();
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.95, 0.05],
            vec![0.9, 0.1],
            vec![0.5, 0.5],
            vec![0.0, 1.0],
        ];
        let texts = ["keep-a", "drop-b", "drop-c", "keep-d", "keep-e"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        store.add_batch(vectors, texts, None).unwrap();

        let results = store
            .search_with_filter(&[1.0, 0.0], 2, |text, _| text.starts_with("keep"))
            .unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["keep-a", "keep-d"]);
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_filter_on_metadata() {
        let mut store = VectorStore::new();
        let mut lease = Metadata::new();
        lease.insert("kind".into(), json!("lease"));
        store.add_single(vec![1.0, 0.0], "no meta", None).unwrap();
        store
            .add_single(vec![0.8, 0.2], "tagged", Some(lease))
            .unwrap();

        let results = store
            .search_with_filter(&[1.0, 0.0], 5, |_, meta| {
                meta.and_then(|m| m.get("kind")).and_then(|v| v.as_str()) == Some("lease")
            })
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "tagged");
        assert!(results[0].metadata.is_some());
    }

    #[test]
    fn test_filter_exhausts_ranked_list() {
        let store = greek_store();
        let results = store
            .search_with_filter(&[1.0, 0.0, 0.0], 3, |text, _| text == "beta")
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "beta");
    }
}
