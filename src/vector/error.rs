//! Vector store error types

use thiserror::Error;

use crate::embeddings::EmbeddingError;

/// Errors surfaced by collection lifecycle, insert and search operations
#[derive(Error, Debug)]
pub enum VectorError {
    #[error("Collection '{collection}' is not loaded")]
    NotLoaded { collection: String },

    #[error("Invalid document: {reason}")]
    Validation { reason: String },

    /// `transient` is set when the service was unavailable
    #[error("Failed to store document in '{collection}': {reason}")]
    StoreWrite {
        collection: String,
        reason: String,
        transient: bool,
    },

    /// `transient` is set when the service was unavailable
    #[error("Failed to search '{collection}': {reason}")]
    Query {
        collection: String,
        reason: String,
        transient: bool,
    },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Failed to prepare collection '{collection}': {reason}")]
    Lifecycle { collection: String, reason: String },

    #[error("Collection '{collection}' has schema version {found}, expected {expected}")]
    SchemaMismatch {
        collection: String,
        expected: u32,
        found: u32,
    },

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
}

impl VectorError {
    pub fn validation(reason: impl Into<String>) -> Self {
        VectorError::Validation {
            reason: reason.into(),
        }
    }

    pub fn query(collection: &str, reason: impl Into<String>) -> Self {
        VectorError::Query {
            collection: collection.to_string(),
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn not_loaded(collection: &str) -> Self {
        VectorError::NotLoaded {
            collection: collection.to_string(),
        }
    }

    /// Map a backend failure raised while inserting
    pub fn from_write(collection: &str, err: BackendError) -> Self {
        match err {
            BackendError::CollectionNotLoaded { .. } => Self::not_loaded(collection),
            other => VectorError::StoreWrite {
                collection: collection.to_string(),
                transient: matches!(other, BackendError::Unavailable { .. }),
                reason: other.to_string(),
            },
        }
    }

    /// Map a backend failure raised while searching or querying
    pub fn from_query(collection: &str, err: BackendError) -> Self {
        match err {
            BackendError::CollectionNotLoaded { .. } => Self::not_loaded(collection),
            other => VectorError::Query {
                collection: collection.to_string(),
                transient: matches!(other, BackendError::Unavailable { .. }),
                reason: other.to_string(),
            },
        }
    }

    /// Map a backend failure raised while creating, indexing or loading
    pub fn from_lifecycle(collection: &str, err: BackendError) -> Self {
        match err {
            BackendError::Unavailable { reason } => VectorError::Connection { reason },
            other => VectorError::Lifecycle {
                collection: collection.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Check if the error is retryable
    ///
    /// Only service outages are; a rejected filter, vector or row fails
    /// the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            VectorError::StoreWrite { transient, .. } | VectorError::Query { transient, .. } => {
                *transient
            }
            VectorError::Connection { .. } => true,
            _ => false,
        }
    }

    /// Get suggested retry delay in milliseconds
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            VectorError::StoreWrite {
                transient: true, ..
            } => Some(500),
            VectorError::Query {
                transient: true, ..
            } => Some(200),
            VectorError::Connection { .. } => Some(1000),
            _ => None,
        }
    }
}

/// Errors reported by a database backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    #[error("collection already exists: {name}")]
    CollectionExists { name: String },

    #[error("invalid collection name '{name}'")]
    InvalidCollectionName { name: String },

    #[error("collection not loaded: {name}")]
    CollectionNotLoaded { name: String },

    #[error("collection {name} has no index on its vector field")]
    IndexMissing { name: String },

    #[error("invalid schema: {reason}")]
    InvalidSchema { reason: String },

    #[error("invalid index: {reason}")]
    InvalidIndex { reason: String },

    #[error("schema violation: {reason}")]
    SchemaViolation { reason: String },

    #[error("invalid expression: {0}")]
    InvalidExpression(#[from] FilterError),

    #[error("invalid search request: {reason}")]
    InvalidRequest { reason: String },

    #[error("service unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("persistence failed: {reason}")]
    Persistence { reason: String },
}

/// Result type for backend calls
pub type BackendResult<T> = Result<T, BackendError>;

/// Filter expression parse and type errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("parse error at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    #[error("unknown field '{name}'")]
    UnknownField { name: String },

    #[error("vector field '{name}' cannot be used in a filter")]
    VectorField { name: String },

    #[error("field '{field}' is {expected}, cannot compare with {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool size must be at least 1")]
    InvalidSize,

    #[error("worker task failed: {reason}")]
    TaskFailed { reason: String },
}
