//! # cosmo-core
//!
//! Core types, traits, and abstractions for the cosmograph pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other cosmograph crates depend on: the entity model, the job and
//! projection-event payloads, the repository and backend traits, and the
//! shared error taxonomy.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, PipelineEvent};
pub use models::*;
pub use traits::*;
