//! In-process vector database service
//!
//! Implements [`VectorBackend`] with exhaustive scoring over stored rows.
//! Collections can optionally be snapshotted to a directory so that they
//! survive a restart; load state is never persisted. Every mutation
//! rewrites the whole collection snapshot on the blocking thread pool.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::backend::{
    CollectionInfo, Entity, FieldValue, Hit, IndexDescriptor, QueryRequest, SearchRequest,
    VectorBackend,
};
use super::config::{IndexParams, IndexType};
use super::error::{BackendError, BackendResult};
use super::filter::FilterExpr;
use super::schema::{CollectionSchema, DataType};

/// Largest result window a single search or query may ask for
pub const MAX_TOP_K: usize = 16384;

/// Upper bound for `nlist` and `nprobe`
pub const MAX_IVF_PARAM: u32 = 65536;

const SNAPSHOT_EXT: &str = "snapshot";

lazy_static! {
    static ref COLLECTION_NAME: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,254}$").unwrap();
}

/// Check a name against the collection naming rule
pub fn is_valid_collection_name(name: &str) -> bool {
    COLLECTION_NAME.is_match(name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionState {
    name: String,
    schema: CollectionSchema,
    index: Option<IndexDescriptor>,
    rows: BTreeMap<i64, Entity>,
    next_id: i64,
    #[serde(skip)]
    loaded: bool,
}

impl CollectionState {
    fn new(name: &str, schema: CollectionSchema) -> Self {
        Self {
            name: name.to_string(),
            schema,
            index: None,
            rows: BTreeMap::new(),
            next_id: 1,
            loaded: false,
        }
    }

    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            schema: self.schema.clone(),
            index: self.index.clone(),
            loaded: self.loaded,
            num_entities: self.rows.len() as u64,
        }
    }

    fn ensure_loaded(&self) -> BackendResult<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(BackendError::CollectionNotLoaded {
                name: self.name.clone(),
            })
        }
    }

    /// Check one row against the schema before anything is written
    fn check_row(&self, row: &Entity) -> BackendResult<()> {
        let violation = |reason: String| BackendError::SchemaViolation { reason };

        for name in row.keys() {
            match self.schema.field(name) {
                None => return Err(violation(format!("unknown field '{}'", name))),
                Some(f) if f.auto_id => {
                    return Err(violation(format!(
                        "field '{}' is auto-assigned and must not be supplied",
                        name
                    )))
                }
                Some(_) => {}
            }
        }

        for field in self.schema.input_fields() {
            let value = row
                .get(&field.name)
                .ok_or_else(|| violation(format!("missing field '{}'", field.name)))?;

            if value.dtype() != field.dtype {
                return Err(violation(format!(
                    "field '{}' expects {}, got {}",
                    field.name,
                    field.dtype,
                    value.dtype()
                )));
            }

            match value {
                FieldValue::VarChar(s) => {
                    let max = field.max_length.unwrap_or(usize::MAX);
                    let len = s.chars().count();
                    if len > max {
                        return Err(violation(format!(
                            "field '{}' length {} exceeds max_length {}",
                            field.name, len, max
                        )));
                    }
                }
                FieldValue::FloatVector(v) => {
                    let dim = field.dim.unwrap_or(0);
                    if v.len() != dim {
                        return Err(violation(format!(
                            "field '{}' expects dimension {}, got {}",
                            field.name,
                            dim,
                            v.len()
                        )));
                    }
                }
                FieldValue::Int64(_) => {}
            }
        }

        Ok(())
    }

    /// Row with the primary key filled in, restricted to `output_fields`
    fn project(&self, id: i64, row: &Entity, output_fields: &[String]) -> Entity {
        let pk = self
            .schema
            .primary_field()
            .map(|f| f.name.as_str())
            .unwrap_or("id");

        output_fields
            .iter()
            .filter_map(|name| {
                if name == pk {
                    Some((name.clone(), FieldValue::Int64(id)))
                } else {
                    row.get(name).map(|v| (name.clone(), v.clone()))
                }
            })
            .collect()
    }

    /// Row as seen by filter expressions, primary key included
    fn filter_view(&self, id: i64, row: &Entity) -> Entity {
        let mut view = row.clone();
        if let Some(pk) = self.schema.primary_field() {
            view.insert(pk.name.clone(), FieldValue::Int64(id));
        }
        view
    }

    fn check_output_fields(&self, output_fields: &[String]) -> BackendResult<()> {
        for name in output_fields {
            if self.schema.field(name).is_none() {
                return Err(BackendError::InvalidRequest {
                    reason: format!("unknown output field '{}'", name),
                });
            }
        }
        Ok(())
    }
}

fn check_limit(limit: usize) -> BackendResult<()> {
    if limit == 0 || limit > MAX_TOP_K {
        return Err(BackendError::InvalidRequest {
            reason: format!("limit must be in [1, {}], got {}", MAX_TOP_K, limit),
        });
    }
    Ok(())
}

/// In-process database service shared by every client that connects to it
pub struct MemoryServer {
    collections: DashMap<String, Arc<RwLock<CollectionState>>>,
    snapshot_dir: Option<PathBuf>,
    online: AtomicBool,
}

impl MemoryServer {
    /// Create an empty, purely in-memory server
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
            snapshot_dir: None,
            online: AtomicBool::new(true),
        }
    }

    /// Create a server that snapshots collections into `dir`
    ///
    /// Existing snapshots in `dir` are restored.
    pub fn open(dir: impl AsRef<Path>) -> BackendResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| BackendError::Persistence {
            reason: format!("failed to create snapshot directory {:?}: {}", dir, e),
        })?;

        let server = Self {
            collections: DashMap::new(),
            snapshot_dir: Some(dir.clone()),
            online: AtomicBool::new(true),
        };

        let entries = std::fs::read_dir(&dir).map_err(|e| BackendError::Persistence {
            reason: format!("failed to read snapshot directory {:?}: {}", dir, e),
        })?;

        let mut restored = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXT) {
                continue;
            }
            let bytes = std::fs::read(&path).map_err(|e| BackendError::Persistence {
                reason: format!("failed to read snapshot {:?}: {}", path, e),
            })?;
            let state: CollectionState =
                bincode::deserialize(&bytes).map_err(|e| BackendError::Persistence {
                    reason: format!("corrupt snapshot {:?}: {}", path, e),
                })?;
            debug!(
                "Restored collection '{}' with {} rows",
                state.name,
                state.rows.len()
            );
            server
                .collections
                .insert(state.name.clone(), Arc::new(RwLock::new(state)));
            restored += 1;
        }

        if restored > 0 {
            info!("Restored {} collection(s) from {:?}", restored, dir);
        }

        Ok(server)
    }

    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot_dir.as_deref()
    }

    /// Simulate the service going away or coming back
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if online {
            info!("Vector service back online");
        } else {
            warn!("Vector service taken offline");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn check_online(&self) -> BackendResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(BackendError::Unavailable {
                reason: "vector service is offline".to_string(),
            })
        }
    }

    fn get(&self, name: &str) -> BackendResult<Arc<RwLock<CollectionState>>> {
        self.check_online()?;
        self.collections
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BackendError::CollectionNotFound {
                name: name.to_string(),
            })
    }

    /// Encode a collection snapshot, or `None` when running memory only
    fn encode(&self, state: &CollectionState) -> BackendResult<Option<Snapshot>> {
        let dir = match self.snapshot_dir {
            Some(ref dir) => dir,
            None => return Ok(None),
        };

        let bytes = bincode::serialize(state).map_err(|e| BackendError::Persistence {
            reason: format!("failed to encode collection '{}': {}", state.name, e),
        })?;

        Ok(Some(Snapshot {
            path: dir.join(format!("{}.{}", state.name, SNAPSHOT_EXT)),
            tmp: dir.join(format!("{}.{}.tmp", state.name, SNAPSHOT_EXT)),
            bytes,
        }))
    }

    /// Write a collection snapshot without blocking the runtime
    ///
    /// Callers hold the collection's write lock across the await so
    /// snapshots land in mutation order.
    async fn persist(&self, state: &CollectionState) -> BackendResult<()> {
        let snapshot = match self.encode(state)? {
            Some(snapshot) => snapshot,
            None => return Ok(()),
        };

        tokio::task::spawn_blocking(move || snapshot.write())
            .await
            .map_err(|e| BackendError::Persistence {
                reason: format!("snapshot writer failed: {}", e),
            })?
    }

    /// Synchronous write for callers holding a registry shard lock
    fn persist_blocking(&self, state: &CollectionState) -> BackendResult<()> {
        match self.encode(state)? {
            Some(snapshot) => snapshot.write(),
            None => Ok(()),
        }
    }
}

/// Encoded collection ready to be written
struct Snapshot {
    path: PathBuf,
    tmp: PathBuf,
    bytes: Vec<u8>,
}

impl Snapshot {
    /// Write via temp file + rename
    fn write(&self) -> BackendResult<()> {
        std::fs::write(&self.tmp, &self.bytes)
            .and_then(|_| std::fs::rename(&self.tmp, &self.path))
            .map_err(|e| BackendError::Persistence {
                reason: format!("failed to write snapshot {:?}: {}", self.path, e),
            })
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorBackend for MemoryServer {
    async fn ping(&self) -> BackendResult<()> {
        self.check_online()
    }

    async fn has_collection(&self, name: &str) -> BackendResult<bool> {
        self.check_online()?;
        Ok(self.collections.contains_key(name))
    }

    async fn list_collections(&self) -> BackendResult<Vec<String>> {
        self.check_online()?;
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, schema: &CollectionSchema) -> BackendResult<()> {
        self.check_online()?;
        if !is_valid_collection_name(name) {
            return Err(BackendError::InvalidCollectionName {
                name: name.to_string(),
            });
        }
        schema
            .validate()
            .map_err(|reason| BackendError::InvalidSchema { reason })?;

        let state = CollectionState::new(name, schema.clone());
        match self.collections.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(BackendError::CollectionExists {
                    name: name.to_string(),
                })
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                // an empty collection; small enough to write in place
                self.persist_blocking(&state)?;
                slot.insert(Arc::new(RwLock::new(state)));
            }
        }

        debug!("Created collection '{}'", name);
        Ok(())
    }

    async fn describe_collection(&self, name: &str) -> BackendResult<CollectionInfo> {
        let collection = self.get(name)?;
        let state = collection.read().await;
        Ok(state.info())
    }

    async fn create_index(&self, name: &str, field: &str, params: &IndexParams) -> BackendResult<()> {
        let collection = self.get(name)?;
        let mut state = collection.write().await;

        let target = state
            .schema
            .field(field)
            .ok_or_else(|| BackendError::InvalidIndex {
                reason: format!("unknown field '{}'", field),
            })?;
        if target.dtype != DataType::FloatVector {
            return Err(BackendError::InvalidIndex {
                reason: format!("field '{}' is not a vector field", field),
            });
        }
        if params.index_type == IndexType::IvfFlat
            && (params.nlist == 0 || params.nlist > MAX_IVF_PARAM)
        {
            return Err(BackendError::InvalidIndex {
                reason: format!("nlist must be in [1, {}], got {}", MAX_IVF_PARAM, params.nlist),
            });
        }

        let descriptor = IndexDescriptor {
            field_name: field.to_string(),
            params: params.clone(),
        };
        match state.index {
            Some(ref existing) if *existing == descriptor => return Ok(()),
            Some(ref existing) => {
                return Err(BackendError::InvalidIndex {
                    reason: format!(
                        "index already exists on '{}' with different parameters ({} {} nlist={})",
                        existing.field_name,
                        existing.params.index_type,
                        existing.params.metric,
                        existing.params.nlist
                    ),
                })
            }
            None => {}
        }

        state.index = Some(descriptor);
        self.persist(&state).await?;
        debug!(
            "Built {} index on '{}.{}' (metric {}, nlist {})",
            params.index_type, name, field, params.metric, params.nlist
        );
        Ok(())
    }

    async fn load_collection(&self, name: &str) -> BackendResult<()> {
        let collection = self.get(name)?;
        let mut state = collection.write().await;
        if state.index.is_none() {
            return Err(BackendError::IndexMissing {
                name: name.to_string(),
            });
        }
        state.loaded = true;
        Ok(())
    }

    async fn release_collection(&self, name: &str) -> BackendResult<()> {
        let collection = self.get(name)?;
        collection.write().await.loaded = false;
        Ok(())
    }

    async fn insert(&self, name: &str, rows: Vec<Entity>) -> BackendResult<Vec<i64>> {
        let collection = self.get(name)?;
        let mut state = collection.write().await;
        state.ensure_loaded()?;

        for row in &rows {
            state.check_row(row)?;
        }

        let first_id = state.next_id;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id = state.next_id;
            state.next_id += 1;
            state.rows.insert(id, row);
            ids.push(id);
        }

        if let Err(e) = self.persist(&state).await {
            // undo so the insert stays all-or-nothing
            for id in &ids {
                state.rows.remove(id);
            }
            state.next_id = first_id;
            return Err(e);
        }

        Ok(ids)
    }

    async fn search(&self, name: &str, request: &SearchRequest) -> BackendResult<Vec<Hit>> {
        let collection = self.get(name)?;
        let state = collection.read().await;
        state.ensure_loaded()?;

        let index = state.index.as_ref().ok_or_else(|| BackendError::IndexMissing {
            name: name.to_string(),
        })?;
        if index.field_name != request.anns_field {
            return Err(BackendError::InvalidRequest {
                reason: format!("field '{}' has no vector index", request.anns_field),
            });
        }
        if index.params.metric != request.metric {
            return Err(BackendError::InvalidRequest {
                reason: format!(
                    "metric type mismatch: index uses {}, search asked for {}",
                    index.params.metric, request.metric
                ),
            });
        }
        if request.nprobe == 0 || request.nprobe > MAX_IVF_PARAM {
            return Err(BackendError::InvalidRequest {
                reason: format!("nprobe must be in [1, {}], got {}", MAX_IVF_PARAM, request.nprobe),
            });
        }
        check_limit(request.limit)?;
        state.check_output_fields(&request.output_fields)?;

        let dim = state.schema.dim();
        if request.vector.len() != dim {
            return Err(BackendError::InvalidRequest {
                reason: format!(
                    "query vector dimension {} does not match collection dimension {}",
                    request.vector.len(),
                    dim
                ),
            });
        }

        let filter = FilterExpr::compile(&request.expr, &state.schema)?;
        let metric = request.metric;

        let mut scored: Vec<(i64, f32)> = state
            .rows
            .iter()
            .filter(|(id, row)| filter.is_empty() || filter.matches(&state.filter_view(**id, row)))
            .filter_map(|(id, row)| {
                row.get(&request.anns_field)
                    .and_then(FieldValue::as_vector)
                    .map(|v| (*id, metric.score(&request.vector, v)))
            })
            .collect();

        scored.sort_by(|a, b| {
            let ord = if metric.ascending() {
                a.1.partial_cmp(&b.1)
            } else {
                b.1.partial_cmp(&a.1)
            };
            ord.unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0))
        });
        scored.truncate(request.limit);

        let hits = scored
            .into_iter()
            .filter_map(|(id, distance)| {
                state.rows.get(&id).map(|row| Hit {
                    id,
                    distance,
                    entity: state.project(id, row, &request.output_fields),
                })
            })
            .collect();

        Ok(hits)
    }

    async fn query(&self, name: &str, request: &QueryRequest) -> BackendResult<Vec<Entity>> {
        let collection = self.get(name)?;
        let state = collection.read().await;
        state.ensure_loaded()?;
        check_limit(request.limit)?;
        state.check_output_fields(&request.output_fields)?;

        let filter = FilterExpr::compile(&request.expr, &state.schema)?;

        let rows = state
            .rows
            .iter()
            .filter(|(id, row)| filter.is_empty() || filter.matches(&state.filter_view(**id, row)))
            .take(request.limit)
            .map(|(id, row)| state.project(*id, row, &request.output_fields))
            .collect();

        Ok(rows)
    }
}
