//! Embedding source contract
//!
//! Embeddings are produced by an external service; this crate only
//! consumes them through [`EmbeddingProvider`].

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an embedding provider
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    #[error("Embedding generation failed: {reason}")]
    EmbeddingFailed { reason: String },

    #[error("Embedding service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Maps text to a fixed-dimension vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Output dimension
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Embed and check the output dimension
    async fn embed_checked(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let vector = self.embed(text).await?;
        if vector.len() != self.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}
