//! Dimension-reduction service client.
//!
//! The service is a stateless remote black box: "fit" learns a manifold over
//! a batch of vectors and returns 3-D coordinates plus a reusable linear
//! matrix; "transform" applies a previously learned matrix to new vectors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use cosmo_core::{defaults, Coord3, Error, ManifoldFit, ReductionBackend, Result};

/// Default reduction service endpoint.
pub const DEFAULT_REDUCER_URL: &str = defaults::REDUCER_BASE;

/// HTTP client for the dimension-reduction service.
pub struct ReductionClient {
    client: Client,
    base_url: String,
    n_neighbors: u32,
    min_dist: f32,
    fit_timeout_secs: u64,
    transform_timeout_secs: u64,
}

/// Health probe response.
#[derive(Debug, Clone, Deserialize)]
pub struct ReducerHealth {
    pub status: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Serialize)]
struct ReduceRequest<'a> {
    vectors: &'a [Vec<f32>],
    method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_dimensions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    n_neighbors: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_dist: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transformation_matrix: Option<&'a [Vec<f32>]>,
}

#[derive(Deserialize)]
struct FitResponse {
    coordinates: Vec<[f64; 3]>,
    transformation_matrix: Vec<Vec<f32>>,
    #[serde(default)]
    parameters: JsonValue,
}

#[derive(Deserialize)]
struct TransformResponse {
    coordinates: Vec<[f64; 3]>,
}

impl ReductionClient {
    /// Create a new client with default settings.
    pub fn new() -> Self {
        Self::with_config(DEFAULT_REDUCER_URL.to_string())
    }

    /// Create a new client against the given base URL.
    pub fn with_config(base_url: String) -> Self {
        let fit_timeout_secs = std::env::var("COSMO_REDUCER_FIT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::REDUCE_FIT_TIMEOUT_SECS);

        let transform_timeout_secs = std::env::var("COSMO_REDUCER_TRANSFORM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::REDUCE_TRANSFORM_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(fit_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        info!(
            "Initializing reduction client: url={}, fit_timeout={}s, transform_timeout={}s",
            base_url, fit_timeout_secs, transform_timeout_secs
        );

        Self {
            client,
            base_url,
            n_neighbors: defaults::MANIFOLD_N_NEIGHBORS,
            min_dist: defaults::MANIFOLD_MIN_DIST,
            fit_timeout_secs,
            transform_timeout_secs,
        }
    }

    /// Create from environment variables (`COSMO_REDUCER_BASE` and the
    /// timeout overrides).
    pub fn from_env() -> Self {
        let base_url = std::env::var("COSMO_REDUCER_BASE")
            .unwrap_or_else(|_| DEFAULT_REDUCER_URL.to_string());
        Self::with_config(base_url)
    }

    /// Override the manifold neighborhood size.
    pub fn with_n_neighbors(mut self, n: u32) -> Self {
        self.n_neighbors = n;
        self
    }

    /// Override the manifold minimum distance.
    pub fn with_min_dist(mut self, d: f32) -> Self {
        self.min_dist = d;
        self
    }

    /// Probe the service's health endpoint.
    pub async fn health(&self) -> Result<ReducerHealth> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(defaults::REDUCE_HEALTH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| Error::Reduction(format!("Health probe failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Reduction(format!(
                "Health probe returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Reduction(format!("Failed to parse health response: {}", e)))
    }

    async fn post_reduce<T: serde::de::DeserializeOwned>(
        &self,
        request: &ReduceRequest<'_>,
        timeout_secs: u64,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/reduce", self.base_url))
            .timeout(Duration::from_secs(timeout_secs))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Reduction(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Reduction(format!(
                "Reduction service returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Reduction(format!("Failed to parse response: {}", e)))
    }
}

impl Default for ReductionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn to_coords(raw: Vec<[f64; 3]>, expected: usize, op: &str) -> Result<Vec<Coord3>> {
    if raw.len() != expected {
        return Err(Error::Reduction(format!(
            "{} returned {} coordinates for {} vectors",
            op,
            raw.len(),
            expected
        )));
    }
    Ok(raw
        .into_iter()
        .map(|[x, y, z]| Coord3::new(x, y, z))
        .collect())
}

#[async_trait]
impl ReductionBackend for ReductionClient {
    #[instrument(skip(self, vectors), fields(subsystem = "reduction", component = "client", op = "fit", vector_count = vectors.len()))]
    async fn fit(&self, vectors: &[Vec<f32>]) -> Result<ManifoldFit> {
        let start = Instant::now();

        let request = ReduceRequest {
            vectors,
            method: "manifold_learning",
            target_dimensions: Some(defaults::TARGET_DIMENSIONS),
            n_neighbors: Some(self.n_neighbors),
            min_dist: Some(self.min_dist),
            transformation_matrix: None,
        };

        let result: FitResponse = self.post_reduce(&request, self.fit_timeout_secs).await?;
        let coordinates = to_coords(result.coordinates, vectors.len(), "fit")?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            vector_count = vectors.len(),
            duration_ms = elapsed,
            "Manifold fit complete"
        );
        if elapsed > 30_000 {
            warn!(
                duration_ms = elapsed,
                vector_count = vectors.len(),
                slow = true,
                "Slow manifold fit"
            );
        }

        Ok(ManifoldFit {
            coordinates,
            matrix: result.transformation_matrix,
            parameters: result.parameters,
        })
    }

    #[instrument(skip(self, vectors, matrix), fields(subsystem = "reduction", component = "client", op = "transform", vector_count = vectors.len()))]
    async fn transform(&self, vectors: &[Vec<f32>], matrix: &[Vec<f32>]) -> Result<Vec<Coord3>> {
        let start = Instant::now();

        let request = ReduceRequest {
            vectors,
            method: "linear_transform",
            target_dimensions: None,
            n_neighbors: None,
            min_dist: None,
            transformation_matrix: Some(matrix),
        };

        let result: TransformResponse = self
            .post_reduce(&request, self.transform_timeout_secs)
            .await?;
        let coordinates = to_coords(result.coordinates, vectors.len(), "transform")?;

        debug!(
            vector_count = vectors.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Linear transform complete"
        );

        Ok(coordinates)
    }
}
