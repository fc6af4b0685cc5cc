//! Tenant document store client
//!
//! [`DocumentStore`] owns the connection and the collection lifecycle.
//! [`DocumentStore::ensure_loaded`] hands out a [`LoadedCollection`], a cheap
//! clonable handle through which documents are inserted and searched. The
//! client also remembers the most recently loaded handle as its active
//! collection for single-tenant callers.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error, info};

use super::backend::{Entity, QueryRequest, SearchRequest, VectorBackend};
use super::config::StoreConfig;
use super::connection::{connect_with_retry, Connector};
use super::document::{build_row, Document, DocumentRecord};
use super::error::{BackendError, VectorError};
use super::schema::{fields, CollectionSchema};
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::logging::{names, time_operation, MetricsCollector};
use crate::timed_debug;

/// Result type for vector store operations
pub type VectorResult<T> = Result<T, VectorError>;

/// Collection name reported when no collection has been loaded yet
const NO_ACTIVE_COLLECTION: &str = "<none>";

/// Client for per-tenant document collections
pub struct DocumentStore {
    config: StoreConfig,
    schema: Arc<CollectionSchema>,
    backend: Option<Arc<dyn VectorBackend>>,
    active: RwLock<Option<LoadedCollection>>,
    metrics: Arc<MetricsCollector>,
}

impl DocumentStore {
    /// Connect to the vector service
    ///
    /// A failed connection is logged, not returned: the client is still
    /// built and every operation that needs the service reports
    /// [`VectorError::Connection`].
    pub async fn connect(config: StoreConfig, connector: &dyn Connector) -> Self {
        let backend = match connect_with_retry(connector, &config.connection).await {
            Ok(backend) => Some(backend),
            Err(e) => {
                error!("Vector store unavailable: {}", e);
                None
            }
        };
        Self::build(config, backend)
    }

    /// Build a client over an already established backend handle
    pub fn with_backend(config: StoreConfig, backend: Arc<dyn VectorBackend>) -> Self {
        Self::build(config, Some(backend))
    }

    fn build(config: StoreConfig, backend: Option<Arc<dyn VectorBackend>>) -> Self {
        Self {
            config,
            schema: Arc::new(CollectionSchema::documents()),
            backend,
            active: RwLock::new(None),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Share an existing metrics collector
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    fn backend(&self) -> VectorResult<&Arc<dyn VectorBackend>> {
        self.backend.as_ref().ok_or_else(|| VectorError::Connection {
            reason: format!("not connected to {}", self.config.connection.address()),
        })
    }

    /// Create or attach to `name` and make it searchable
    ///
    /// A missing collection is created with the document schema and an
    /// index on `embedding`. An existing one is attached as-is after its
    /// schema version is checked; a missing index is built.
    pub async fn ensure_loaded(&self, name: &str) -> VectorResult<LoadedCollection> {
        let backend = Arc::clone(self.backend()?);
        let lifecycle = |e: BackendError| VectorError::from_lifecycle(name, e);

        timed_debug!(self.metrics, names::ENSURE_LOADED, {
            let exists = backend.has_collection(name).await.map_err(lifecycle)?;

            let created = if exists {
                false
            } else {
                match backend.create_collection(name, &self.schema).await {
                    Ok(()) => true,
                    // lost a race with another client creating it
                    Err(BackendError::CollectionExists { .. }) => false,
                    Err(e) => return Err(lifecycle(e)),
                }
            };

            if created {
                info!("Created collection '{}'", name);
                backend
                    .create_index(name, fields::EMBEDDING, &self.config.index)
                    .await
                    .map_err(lifecycle)?;
            } else {
                let info = backend.describe_collection(name).await.map_err(lifecycle)?;
                if info.schema.version != self.schema.version {
                    return Err(VectorError::SchemaMismatch {
                        collection: name.to_string(),
                        expected: self.schema.version,
                        found: info.schema.version,
                    });
                }
                if info.index.is_none() {
                    backend
                        .create_index(name, fields::EMBEDDING, &self.config.index)
                        .await
                        .map_err(lifecycle)?;
                }
                info!(
                    "Attached to existing collection '{}' ({} rows)",
                    name, info.num_entities
                );
            }

            backend.load_collection(name).await.map_err(lifecycle)?;
        });

        let handle = LoadedCollection {
            name: name.to_string(),
            backend,
            schema: Arc::clone(&self.schema),
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
        };
        *self.active.write() = Some(handle.clone());
        debug!("Collection '{}' loaded", name);
        Ok(handle)
    }

    /// Unload a collection; handles to it report `NotLoaded` afterwards
    pub async fn release(&self, name: &str) -> VectorResult<()> {
        self.backend()?
            .release_collection(name)
            .await
            .map_err(|e| VectorError::from_lifecycle(name, e))?;

        let mut active = self.active.write();
        if active.as_ref().map(|c| c.name == name).unwrap_or(false) {
            *active = None;
        }
        info!("Released collection '{}'", name);
        Ok(())
    }

    pub async fn has_collection(&self, name: &str) -> VectorResult<bool> {
        self.backend()?
            .has_collection(name)
            .await
            .map_err(|e| VectorError::from_lifecycle(name, e))
    }

    pub async fn list_collections(&self) -> VectorResult<Vec<String>> {
        self.backend()?
            .list_collections()
            .await
            .map_err(|e| VectorError::from_lifecycle(NO_ACTIVE_COLLECTION, e))
    }

    /// Most recently loaded collection, if any
    pub fn active_collection(&self) -> Option<LoadedCollection> {
        self.active.read().clone()
    }

    fn active(&self) -> VectorResult<LoadedCollection> {
        self.active_collection()
            .ok_or_else(|| VectorError::not_loaded(NO_ACTIVE_COLLECTION))
    }

    /// Store into the active collection
    pub async fn store(&self, document: &Document, embedding: &[f32]) -> VectorResult<i64> {
        self.active()?.store(document, embedding).await
    }

    /// Search the active collection
    pub async fn search(
        &self,
        query: Option<&[f32]>,
        filter: Option<&str>,
        limit: usize,
    ) -> VectorResult<Vec<DocumentRecord>> {
        self.active()?.search(query, filter, limit).await
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("address", &self.config.connection.address())
            .field("connected", &self.is_connected())
            .field(
                "active",
                &self.active.read().as_ref().map(|c| c.name.clone()),
            )
            .finish()
    }
}

/// Handle to a collection that was loaded by [`DocumentStore::ensure_loaded`]
#[derive(Clone)]
pub struct LoadedCollection {
    name: String,
    backend: Arc<dyn VectorBackend>,
    schema: Arc<CollectionSchema>,
    config: StoreConfig,
    metrics: Arc<MetricsCollector>,
}

impl LoadedCollection {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Result count used when callers have no preference
    pub fn default_limit(&self) -> usize {
        self.config.search.default_limit
    }

    /// Whether the service still reports the collection as loaded
    pub async fn is_loaded(&self) -> VectorResult<bool> {
        let info = self
            .backend
            .describe_collection(&self.name)
            .await
            .map_err(|e| VectorError::from_lifecycle(&self.name, e))?;
        Ok(info.loaded)
    }

    /// Number of stored rows
    pub async fn count(&self) -> VectorResult<u64> {
        let info = self
            .backend
            .describe_collection(&self.name)
            .await
            .map_err(|e| VectorError::from_query(&self.name, e))?;
        Ok(info.num_entities)
    }

    /// Validate and insert one document, returning its primary key
    pub async fn store(&self, document: &Document, embedding: &[f32]) -> VectorResult<i64> {
        let row = build_row(document, embedding, &self.schema)?;
        let ids = self.insert_rows(vec![row]).await?;
        ids.into_iter().next().ok_or_else(|| VectorError::StoreWrite {
            collection: self.name.clone(),
            reason: "service returned no primary key".to_string(),
            transient: false,
        })
    }

    /// Validate every document, then insert them in one call
    ///
    /// Either all rows are written or none are.
    pub async fn store_batch(&self, items: &[(Document, Vec<f32>)]) -> VectorResult<Vec<i64>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let rows = items
            .iter()
            .enumerate()
            .map(|(i, (document, embedding))| {
                build_row(document, embedding, &self.schema).map_err(|e| match e {
                    VectorError::Validation { reason } => {
                        VectorError::validation(format!("document {}: {}", i, reason))
                    }
                    other => other,
                })
            })
            .collect::<VectorResult<Vec<_>>>()?;

        self.insert_rows(rows).await
    }

    /// Embed `page_content` with `provider` and store the result
    pub async fn store_text(
        &self,
        document: &Document,
        provider: &dyn EmbeddingProvider,
    ) -> VectorResult<i64> {
        let embedding = self.embed(&document.page_content, provider).await?;
        self.store(document, &embedding).await
    }

    async fn embed(&self, text: &str, provider: &dyn EmbeddingProvider) -> VectorResult<Vec<f32>> {
        let _timer = time_operation(&self.metrics, names::EMBED)
            .add_label("collection", self.name.clone());
        let vector = provider.embed_checked(text).await?;

        let expected = self.schema.dim();
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            }
            .into());
        }
        Ok(vector)
    }

    async fn insert_rows(&self, rows: Vec<Entity>) -> VectorResult<Vec<i64>> {
        let info = self
            .backend
            .describe_collection(&self.name)
            .await
            .map_err(|e| VectorError::from_write(&self.name, e))?;
        if !info.loaded {
            return Err(VectorError::not_loaded(&self.name));
        }

        let count = rows.len();
        let ids = timed_debug!(self.metrics, names::STORE, {
            self.backend.insert(&self.name, rows).await
        })
        .map_err(|e| VectorError::from_write(&self.name, e))?;

        self.metrics.record_counter(names::ROWS_STORED, count as u64);
        debug!("Stored {} row(s) in '{}'", count, self.name);
        Ok(ids)
    }

    /// Nearest neighbours of `query` among rows matching `filter`
    ///
    /// Results are ordered best first with ties broken by id. Without a
    /// query vector the call falls back to a filter-only query ordered by
    /// id; a call with neither a vector nor a filter is rejected.
    pub async fn search(
        &self,
        query: Option<&[f32]>,
        filter: Option<&str>,
        limit: usize,
    ) -> VectorResult<Vec<DocumentRecord>> {
        if limit == 0 {
            return Err(VectorError::query(&self.name, "limit must be positive"));
        }
        let expr = filter.map(str::trim).unwrap_or_default();

        let vector = match query {
            Some(vector) => vector,
            None if expr.is_empty() => {
                return Err(VectorError::query(
                    &self.name,
                    "a query vector or a filter expression is required",
                ))
            }
            None => {
                debug!(
                    "No query vector for '{}', running filter-only query",
                    self.name
                );
                return self.query(expr, limit).await;
            }
        };

        let dim = self.schema.dim();
        if vector.len() != dim {
            return Err(VectorError::query(
                &self.name,
                format!(
                    "query vector has dimension {}, expected {}",
                    vector.len(),
                    dim
                ),
            ));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(VectorError::query(
                &self.name,
                "query vector contains non-finite values",
            ));
        }

        let request = SearchRequest {
            anns_field: fields::EMBEDDING.to_string(),
            vector: vector.to_vec(),
            metric: self.config.search.metric,
            nprobe: self.config.search.nprobe,
            limit,
            expr: expr.to_string(),
            output_fields: self.schema.output_fields(),
        };

        let hits = timed_debug!(self.metrics, names::SEARCH, {
            self.backend.search(&self.name, &request).await
        })
        .map_err(|e| VectorError::from_query(&self.name, e))?;

        let records = hits
            .into_iter()
            .map(|hit| DocumentRecord::from_entity(hit.entity, Some(hit.distance)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| VectorError::query(&self.name, reason))?;

        debug!(
            "Search on '{}' returned {} hit(s) (limit {})",
            self.name,
            records.len(),
            limit
        );
        Ok(records)
    }

    /// Embed `text` with `provider` and search with it
    pub async fn search_text(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
        filter: Option<&str>,
        limit: usize,
    ) -> VectorResult<Vec<DocumentRecord>> {
        let vector = self.embed(text, provider).await?;
        self.search(Some(vector.as_slice()), filter, limit).await
    }

    /// Rows matching `filter` in id order, without distances
    pub async fn query(&self, filter: &str, limit: usize) -> VectorResult<Vec<DocumentRecord>> {
        if limit == 0 {
            return Err(VectorError::query(&self.name, "limit must be positive"));
        }

        let request = QueryRequest {
            expr: filter.trim().to_string(),
            limit,
            output_fields: self.schema.output_fields(),
        };

        let rows = timed_debug!(self.metrics, names::QUERY, {
            self.backend.query(&self.name, &request).await
        })
        .map_err(|e| VectorError::from_query(&self.name, e))?;

        rows.into_iter()
            .map(|row| DocumentRecord::from_entity(row, None))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| VectorError::query(&self.name, reason))
    }
}

impl fmt::Debug for LoadedCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCollection")
            .field("name", &self.name)
            .field("schema_version", &self.schema.version)
            .finish()
    }
}
