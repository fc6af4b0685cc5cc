//! Vector DocStore - per-tenant document storage over a vector database
//!
//! This crate provides:
//! - Collection lifecycle per tenant (create, index, load, attach)
//! - Validated document inserts with fixed-dimension embeddings
//! - L2 similarity search constrained by boolean filter expressions
//! - An in-process vector service with optional snapshot persistence
//! - Layered configuration and structured logging with operation metrics

pub mod core;
pub mod embeddings;
pub mod logging;
pub mod vector;

// Re-export commonly used items
pub use core::config::ClientConfig;
pub use core::error::{DocStoreError, Result};
pub use embeddings::{EmbeddingError, EmbeddingProvider};
pub use logging::{LoggingConfig, LoggingSystem, MetricsCollector};
pub use vector::{
    Document, DocumentRecord, DocumentStore, LoadedCollection, MemoryConnector, MemoryServer,
    VectorError,
};
