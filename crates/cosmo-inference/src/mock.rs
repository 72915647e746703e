//! Mock backends for deterministic testing.
//!
//! The mock embedder derives a vector from the text bytes, the mock reducer
//! really multiplies vectors through a fixed matrix, so handler tests can
//! assert on actual numbers instead of stubs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cosmo_core::{Coord3, EmbeddingBackend, Error, ManifoldFit, ReductionBackend, Result, Vector};

/// Deterministic mock embedding backend.
#[derive(Clone)]
pub struct MockEmbedder {
    dimension: usize,
    model: String,
    fail: Arc<AtomicBool>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockEmbedder {
    /// Create a mock embedder with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "mock-embed".to_string(),
            fail: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every subsequent call fail (to exercise error paths).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of embed calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All batches passed to `embed_texts`, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// The deterministic vector this mock produces for `text`.
    pub fn vector_for(&self, text: &str) -> Vector {
        // Cheap byte-mix hash expanded to the full dimension; stable across
        // runs and platforms.
        let mut state: u32 = 2_166_136_261;
        for b in text.bytes() {
            state ^= b as u32;
            state = state.wrapping_mul(16_777_619);
        }
        let mut values = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223 ^ i as u32);
            values.push((state as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        Vector::from(values)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedder {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.lock().unwrap().push(texts.to_vec());

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("mock backend failing".to_string()));
        }

        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic mock reduction backend.
///
/// `fit` projects every vector through a fixed matrix and returns that matrix;
/// `transform` multiplies through whatever matrix it is given. Both are real
/// linear algebra, so "transform with the learned matrix reproduces the fit"
/// holds for tests that need it.
#[derive(Clone)]
pub struct MockReducer {
    fail: Arc<AtomicBool>,
    fit_calls: Arc<AtomicUsize>,
    transform_calls: Arc<AtomicUsize>,
}

impl MockReducer {
    pub fn new() -> Self {
        Self {
            fail: Arc::new(AtomicBool::new(false)),
            fit_calls: Arc::new(AtomicUsize::new(0)),
            transform_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every subsequent call fail (to exercise fallback paths).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn fit_count(&self) -> usize {
        self.fit_calls.load(Ordering::SeqCst)
    }

    pub fn transform_count(&self) -> usize {
        self.transform_calls.load(Ordering::SeqCst)
    }

    /// The fixed projection matrix `fit` learns for `dimension` inputs.
    pub fn learned_matrix(dimension: usize) -> Vec<Vec<f32>> {
        (0..dimension)
            .map(|i| {
                let base = (i + 1) as f32;
                vec![0.01 * base, -0.02 * base, 0.03 * base]
            })
            .collect()
    }

    fn project(vector: &[f32], matrix: &[Vec<f32>]) -> Coord3 {
        let mut acc = [0.0f64; 3];
        for (v, row) in vector.iter().zip(matrix.iter()) {
            for (a, m) in acc.iter_mut().zip(row.iter()) {
                *a += *v as f64 * *m as f64;
            }
        }
        Coord3::new(acc[0], acc[1], acc[2])
    }
}

impl Default for MockReducer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReductionBackend for MockReducer {
    async fn fit(&self, vectors: &[Vec<f32>]) -> Result<ManifoldFit> {
        self.fit_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Reduction("mock reducer failing".to_string()));
        }

        let dimension = vectors.first().map(|v| v.len()).unwrap_or(0);
        let matrix = Self::learned_matrix(dimension);
        let coordinates = vectors.iter().map(|v| Self::project(v, &matrix)).collect();

        Ok(ManifoldFit {
            coordinates,
            matrix,
            parameters: serde_json::json!({"n_neighbors": 15, "min_dist": 0.1}),
        })
    }

    async fn transform(&self, vectors: &[Vec<f32>], matrix: &[Vec<f32>]) -> Result<Vec<Coord3>> {
        self.transform_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Reduction("mock reducer failing".to_string()));
        }

        Ok(vectors.iter().map(|v| Self::project(v, matrix)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new(16);
        let a = embedder
            .embed_texts(&["hello".to_string()])
            .await
            .unwrap();
        let b = embedder
            .embed_texts(&["hello".to_string()])
            .await
            .unwrap();
        assert_eq!(a[0].as_slice(), b[0].as_slice());
        assert_eq!(a[0].as_slice().len(), 16);
        assert_eq!(embedder.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_embedder_distinct_texts_differ() {
        let embedder = MockEmbedder::new(16);
        let out = embedder
            .embed_texts(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(out[0].as_slice(), out[1].as_slice());
    }

    #[tokio::test]
    async fn test_mock_embedder_failure_mode() {
        let embedder = MockEmbedder::new(8);
        embedder.set_failing(true);
        assert!(embedder.embed_texts(&["x".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_reducer_transform_matches_fit() {
        let reducer = MockReducer::new();
        let vectors = vec![vec![1.0, 0.0, 2.0], vec![0.5, 0.5, 0.5]];

        let fit = reducer.fit(&vectors).await.unwrap();
        let transformed = reducer.transform(&vectors, &fit.matrix).await.unwrap();

        assert_eq!(fit.coordinates, transformed);
        assert_eq!(reducer.fit_count(), 1);
        assert_eq!(reducer.transform_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_reducer_failure_mode() {
        let reducer = MockReducer::new();
        reducer.set_failing(true);
        assert!(reducer.fit(&[vec![1.0]]).await.is_err());
        assert!(reducer.transform(&[vec![1.0]], &[vec![1.0, 1.0, 1.0]]).await.is_err());
    }
}
