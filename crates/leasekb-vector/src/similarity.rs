//! Similarity kernels.
//!
//! Accumulates in f64 so that `cosine(v, v)` is exactly 1.0 for any
//! non-zero `v`. Duplicate thresholds of 1.0 rely on this.

/// Dot product, unrolled by 4.
pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let chunks = a.len() / 4;
    let mut s0 = 0.0f64;
    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    let mut s3 = 0.0f64;

    for i in 0..chunks {
        let k = i * 4;
        s0 += a[k] as f64 * b[k] as f64;
        s1 += a[k + 1] as f64 * b[k + 1] as f64;
        s2 += a[k + 2] as f64 * b[k + 2] as f64;
        s3 += a[k + 3] as f64 * b[k + 3] as f64;
    }

    let mut sum = (s0 + s1) + (s2 + s3);
    for k in chunks * 4..a.len() {
        sum += a[k] as f64 * b[k] as f64;
    }
    sum
}

/// Squared L2 norm.
pub fn norm_squared(v: &[f32]) -> f64 {
    dot_product(v, v)
}

/// Cosine similarity in [-1, 1]. Zero-magnitude input scores 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_with_norms(a, norm_squared(a), b, norm_squared(b))
}

/// Cosine similarity with precomputed squared norms.
pub(crate) fn cosine_with_norms(a: &[f32], na: f64, b: &[f32], nb: f64) -> f32 {
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    let score = dot_product(a, b) / (na * nb).sqrt();
    if !score.is_finite() {
        return 0.0;
    }
    // `+ 0.0` folds -0.0 into 0.0 so total ordering treats them as ties
    score.clamp(-1.0, 1.0) as f32 + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_product() {
        let a = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let b = vec![1.0; 9];
        assert!((dot_product(&a, &b) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_basic() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_ignores_magnitude() {
        let a = [0.3, 0.4, 0.5];
        let b = [3.0, 4.0, 5.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_self_similarity_is_exactly_one() {
        let v = [0.137, -0.52, 0.911, 0.004, 0.3333];
        assert_eq!(cosine_similarity(&v, &v), 1.0);
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }
}
