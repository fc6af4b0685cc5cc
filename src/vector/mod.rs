//! Per-tenant document storage over a vector database
//!
//! Each tenant owns one collection with a fixed document schema. The
//! client creates or attaches to a collection, loads it, inserts validated
//! documents with their embeddings and runs L2 similarity searches
//! constrained by boolean filter expressions.

mod backend;
mod config;
mod connection;
mod document;
mod error;
mod filter;
mod memory;
mod pool;
mod schema;
mod store;

#[cfg(test)]
mod tests;

pub use backend::{
    CollectionInfo, Entity, FieldValue, Hit, IndexDescriptor, QueryRequest, SearchRequest,
    VectorBackend,
};
pub use self::config::{ConnectionConfig, IndexParams, IndexType, MetricType, SearchParams, StoreConfig};
pub use connection::{connect_with_retry, Connector, MemoryConnector};
pub use document::{metadata_keys, Document, DocumentRecord, Headers};
pub use error::{BackendError, BackendResult, FilterError, PoolError, VectorError};
pub use filter::{CompareOp, Expr, FilterExpr, Literal, MAX_NESTING, MAX_TERMS};
pub use memory::{is_valid_collection_name, MemoryServer, MAX_IVF_PARAM, MAX_TOP_K};
pub use pool::{WorkerPool, DEFAULT_WORKERS};
pub use schema::{
    fields, CollectionSchema, DataType, FieldSchema, EMBEDDING_DIM, SCHEMA_VERSION,
};
pub use store::{DocumentStore, LoadedCollection, VectorResult};
