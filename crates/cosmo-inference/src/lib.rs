//! # cosmo-inference
//!
//! HTTP backend abstractions for cosmograph: the text-to-vector embedding
//! backend and the dimension-reduction service client. Both implement traits
//! from `cosmo-core` so the workers stay backend-agnostic.

pub mod embedder;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod reducer;

pub use embedder::OllamaEmbedder;
pub use reducer::{ReducerHealth, ReductionClient};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockEmbedder, MockReducer};
