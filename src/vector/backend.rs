//! Database backend contract
//!
//! A [`VectorBackend`] is a live handle to a vector database service. The
//! document store only talks to the database through this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::config::{IndexParams, MetricType};
use super::error::BackendResult;
use super::schema::{CollectionSchema, DataType};

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int64(i64),
    VarChar(String),
    FloatVector(Vec<f32>),
}

impl FieldValue {
    pub fn dtype(&self) -> DataType {
        match self {
            FieldValue::Int64(_) => DataType::Int64,
            FieldValue::VarChar(_) => DataType::VarChar,
            FieldValue::FloatVector(_) => DataType::FloatVector,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::VarChar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            FieldValue::FloatVector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::VarChar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::VarChar(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int64(value)
    }
}

impl From<Vec<f32>> for FieldValue {
    fn from(value: Vec<f32>) -> Self {
        FieldValue::FloatVector(value)
    }
}

/// A row keyed by field name
pub type Entity = HashMap<String, FieldValue>;

/// Index built on a collection's vector field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub field_name: String,
    pub params: IndexParams,
}

/// Snapshot of a collection's state as reported by the database
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: CollectionSchema,
    pub index: Option<IndexDescriptor>,
    pub loaded: bool,
    pub num_entities: u64,
}

/// Vector similarity request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Vector field searched
    pub anns_field: String,
    pub vector: Vec<f32>,
    pub metric: MetricType,
    pub nprobe: u32,
    pub limit: usize,
    /// Boolean filter over scalar fields, empty for none
    pub expr: String,
    pub output_fields: Vec<String>,
}

/// Scalar-only request
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub expr: String,
    pub limit: usize,
    pub output_fields: Vec<String>,
}

/// One search hit, ranked best first
#[derive(Debug, Clone)]
pub struct Hit {
    pub id: i64,
    /// Score under the search metric
    pub distance: f32,
    pub entity: Entity,
}

/// Live handle to a vector database service
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Round-trip used to confirm the service is reachable
    async fn ping(&self) -> BackendResult<()>;

    async fn has_collection(&self, name: &str) -> BackendResult<bool>;

    async fn list_collections(&self) -> BackendResult<Vec<String>>;

    /// Create an empty collection; fails if the name is taken
    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> BackendResult<()>;

    async fn describe_collection(&self, name: &str) -> BackendResult<CollectionInfo>;

    /// Build an index on a vector field
    async fn create_index(&self, name: &str, field: &str, params: &IndexParams) -> BackendResult<()>;

    /// Make a collection searchable
    async fn load_collection(&self, name: &str) -> BackendResult<()>;

    async fn release_collection(&self, name: &str) -> BackendResult<()>;

    /// Insert rows atomically into a loaded collection, returning the
    /// assigned primary keys
    async fn insert(&self, name: &str, rows: Vec<Entity>) -> BackendResult<Vec<i64>>;

    async fn search(&self, name: &str, request: &SearchRequest) -> BackendResult<Vec<Hit>>;

    /// Filter-only retrieval ordered by primary key
    async fn query(&self, name: &str, request: &QueryRequest) -> BackendResult<Vec<Entity>>;
}
