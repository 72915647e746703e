//! Projection dispatch configuration.

use std::time::Duration;

use cosmo_core::defaults;

/// Configuration for the spatial projection worker's dispatch logic.
#[derive(Debug, Clone)]
pub struct ProjectionConfig {
    /// A manifold fit runs when the node population is an exact multiple of
    /// this interval (and within the band below).
    pub learning_interval: usize,
    /// Minimum node count eligible for manifold learning.
    pub min_learning_nodes: usize,
    /// Maximum node count eligible for manifold learning.
    pub max_learning_nodes: usize,
    /// Maximum delayed redeliveries while waiting for missing embeddings.
    pub wait_retry_limit: u32,
    /// Fixed delay between missing-embedding redeliveries.
    pub wait_retry_delay: Duration,
    /// Dimensionality used for fallback pseudo-vectors when the user has no
    /// stored vectors to infer it from.
    pub embedding_dimension: usize,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            learning_interval: defaults::LEARNING_INTERVAL,
            min_learning_nodes: defaults::LEARNING_MIN_NODES,
            max_learning_nodes: defaults::LEARNING_MAX_NODES,
            wait_retry_limit: defaults::WAIT_RETRY_LIMIT,
            wait_retry_delay: Duration::from_millis(defaults::WAIT_RETRY_DELAY_MS),
            embedding_dimension: defaults::EMBED_DIMENSION,
        }
    }
}

impl ProjectionConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `COSMO_LEARNING_INTERVAL` | `100` | Manifold fit population interval |
    /// | `COSMO_LEARNING_MIN_NODES` | `10` | Minimum nodes for a fit |
    /// | `COSMO_LEARNING_MAX_NODES` | `10000` | Maximum nodes for a fit |
    /// | `COSMO_WAIT_RETRY_LIMIT` | `5` | Missing-embedding redelivery ceiling |
    /// | `COSMO_WAIT_RETRY_DELAY_MS` | `3000` | Delay between redeliveries |
    /// | `COSMO_EMBED_DIM` | `768` | Fallback pseudo-vector dimensionality |
    pub fn from_env() -> Self {
        fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
            std::env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            learning_interval: env_parse("COSMO_LEARNING_INTERVAL", defaults::LEARNING_INTERVAL)
                .max(1),
            min_learning_nodes: env_parse(
                "COSMO_LEARNING_MIN_NODES",
                defaults::LEARNING_MIN_NODES,
            ),
            max_learning_nodes: env_parse(
                "COSMO_LEARNING_MAX_NODES",
                defaults::LEARNING_MAX_NODES,
            ),
            wait_retry_limit: env_parse("COSMO_WAIT_RETRY_LIMIT", defaults::WAIT_RETRY_LIMIT),
            wait_retry_delay: Duration::from_millis(env_parse(
                "COSMO_WAIT_RETRY_DELAY_MS",
                defaults::WAIT_RETRY_DELAY_MS,
            )),
            embedding_dimension: env_parse("COSMO_EMBED_DIM", defaults::EMBED_DIMENSION),
        }
    }

    /// Set the manifold-learning population interval.
    pub fn with_learning_interval(mut self, interval: usize) -> Self {
        self.learning_interval = interval;
        self
    }

    /// Set the node-count band eligible for manifold learning.
    pub fn with_learning_band(mut self, min: usize, max: usize) -> Self {
        self.min_learning_nodes = min;
        self.max_learning_nodes = max;
        self
    }

    /// Set the missing-embedding redelivery ceiling.
    pub fn with_wait_retry_limit(mut self, limit: u32) -> Self {
        self.wait_retry_limit = limit;
        self
    }

    /// Set the delay between missing-embedding redeliveries.
    pub fn with_wait_retry_delay(mut self, delay: Duration) -> Self {
        self.wait_retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProjectionConfig::default();
        assert_eq!(config.learning_interval, defaults::LEARNING_INTERVAL);
        assert_eq!(config.min_learning_nodes, defaults::LEARNING_MIN_NODES);
        assert_eq!(config.max_learning_nodes, defaults::LEARNING_MAX_NODES);
        assert_eq!(config.wait_retry_limit, defaults::WAIT_RETRY_LIMIT);
    }

    #[test]
    fn test_builder_chaining() {
        let config = ProjectionConfig::default()
            .with_learning_interval(500)
            .with_learning_band(20, 2_000)
            .with_wait_retry_limit(2)
            .with_wait_retry_delay(Duration::from_millis(50));

        assert_eq!(config.learning_interval, 500);
        assert_eq!(config.min_learning_nodes, 20);
        assert_eq!(config.max_learning_nodes, 2_000);
        assert_eq!(config.wait_retry_limit, 2);
        assert_eq!(config.wait_retry_delay, Duration::from_millis(50));
    }
}
