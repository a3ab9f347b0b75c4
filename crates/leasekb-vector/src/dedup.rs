//! Near-duplicate scanning.
//!
//! Exhaustive O(n²) comparison. Rows of the upper-triangular similarity
//! matrix are computed in parallel; clustering itself is sequential since
//! each decision depends on the ones before it.

use rayon::prelude::*;

use crate::similarity::{cosine_with_norms, norm_squared};
use crate::store::VectorStore;

impl VectorStore {
    /// Upper triangle of the pairwise cosine matrix: `rows[i][j - i - 1]`
    /// holds `sim(i, j)` for every `j > i`.
    pub fn pairwise_similarities(&self) -> Vec<Vec<f32>> {
        let n = self.len();
        if n < 2 {
            return Vec::new();
        }
        let dim = self.dimension;
        let rows: Vec<&[f32]> = self.vectors.chunks_exact(dim).collect();
        let norms: Vec<f64> = rows.iter().map(|v| norm_squared(v)).collect();

        (0..n)
            .into_par_iter()
            .map(|i| {
                ((i + 1)..n)
                    .map(|j| cosine_with_norms(rows[i], norms[i], rows[j], norms[j]))
                    .collect::<Vec<f32>>()
            })
            .collect()
    }

    /// Group records whose similarity to a cluster's lowest member is at
    /// least `threshold`. Singletons are omitted; clusters come back in
    /// ascending order of their lowest position.
    pub fn find_duplicates(&self, threshold: f32) -> Vec<Vec<usize>> {
        let n = self.len();
        if n < 2 {
            return Vec::new();
        }

        let sims = self.pairwise_similarities();
        let mut processed = vec![false; n];
        let mut clusters = Vec::new();

        for i in 0..n {
            if processed[i] {
                continue;
            }
            let mut cluster = Vec::new();
            for j in (i + 1)..n {
                if !processed[j] && sims[i][j - i - 1] >= threshold {
                    if cluster.is_empty() {
                        cluster.push(i);
                    }
                    cluster.push(j);
                    processed[j] = true;
                }
            }
            if !cluster.is_empty() {
                processed[i] = true;
                clusters.push(cluster);
            }
        }

        tracing::debug!(
            "Duplicate scan over {n} records at {threshold}: {} clusters",
            clusters.len()
        );
        clusters
    }

    /// Keep the lowest position of every duplicate cluster and remove the
    /// rest. Returns the number of records removed.
    pub fn remove_duplicates(&mut self, threshold: f32) -> usize {
        let doomed: Vec<usize> = self
            .find_duplicates(threshold)
            .into_iter()
            .flat_map(|cluster| cluster.into_iter().skip(1))
            .collect();
        let removed = self.remove(&doomed);
        if removed > 0 {
            tracing::info!("🧹 Removed {removed} near-duplicate records");
        }
        removed
    }
}
