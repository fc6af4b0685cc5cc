//! Tests for the document store client

use super::*;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, EmbeddingResult};
use async_trait::async_trait;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// In-memory client with the tenant collection already loaded
async fn loaded_store(name: &str) -> (Arc<MemoryServer>, DocumentStore, LoadedCollection) {
    let server = Arc::new(MemoryServer::new());
    let store = DocumentStore::with_backend(StoreConfig::default(), server.clone());
    let collection = store.ensure_loaded(name).await.unwrap();
    (server, store, collection)
}

/// Unit vector along `axis`, scaled by `scale`
fn axis_vector(axis: usize, scale: f32) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIM];
    v[axis % EMBEDDING_DIM] = scale;
    v
}

fn random_vector(rng: &mut impl Rng) -> Vec<f32> {
    (0..EMBEDDING_DIM).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn headers() -> Headers {
    let mut map = Map::new();
    map.insert("h1".to_string(), Value::String("Intro".to_string()));
    map
}

fn tenant_doc(user_id: &str, doc_id: &str, content: &str) -> Document {
    Document::new(content)
        .with_user_id(user_id)
        .with_kb_id("kb1")
        .with_file_id("f1")
        .with_doc_id(doc_id)
        .with_headers(headers())
}

/// Embedder returning a fixed axis vector per text length
struct AxisEmbedder {
    dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for AxisEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut v = vec![0.0; self.dimension];
        if let Some(slot) = v.get_mut(text.len() % self.dimension.max(1)) {
            *slot = 1.0;
        }
        Ok(v)
    }
}

struct DownEmbedder;

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed(&self, _text: &str) -> EmbeddingResult<Vec<f32>> {
        Err(EmbeddingError::ServiceUnavailable {
            reason: "model not reachable".to_string(),
        })
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_ensure_loaded_creates_indexes_and_loads() {
    let (server, store, collection) = loaded_store("tenant_42").await;

    assert_eq!(collection.name(), "tenant_42");
    assert!(collection.is_loaded().await.unwrap());
    assert!(store.has_collection("tenant_42").await.unwrap());
    assert_eq!(store.list_collections().await.unwrap(), vec!["tenant_42"]);

    let info = server.describe_collection("tenant_42").await.unwrap();
    assert_eq!(info.schema, CollectionSchema::documents());
    let index = info.index.unwrap();
    assert_eq!(index.field_name, fields::EMBEDDING);
    assert_eq!(index.params.metric, MetricType::L2);
    assert_eq!(index.params.index_type, IndexType::IvfFlat);
    assert_eq!(index.params.nlist, 1024);
}

#[tokio::test]
async fn test_ensure_loaded_twice_attaches() {
    let (_server, store, first) = loaded_store("tenant_42").await;
    first
        .store(&tenant_doc("tenant_42", "d1", "hello"), &axis_vector(0, 1.0))
        .await
        .unwrap();

    let second = store.ensure_loaded("tenant_42").await.unwrap();
    assert_eq!(second.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_attach_builds_missing_index() {
    let server = Arc::new(MemoryServer::new());
    server
        .create_collection("bare", &CollectionSchema::documents())
        .await
        .unwrap();

    let store = DocumentStore::with_backend(StoreConfig::default(), server.clone());
    let collection = store.ensure_loaded("bare").await.unwrap();

    assert!(collection.is_loaded().await.unwrap());
    let info = server.describe_collection("bare").await.unwrap();
    assert!(info.index.is_some());
}

#[tokio::test]
async fn test_schema_version_mismatch_detected() {
    let server = Arc::new(MemoryServer::new());
    let mut schema = CollectionSchema::documents();
    schema.version = SCHEMA_VERSION + 1;
    server.create_collection("legacy", &schema).await.unwrap();

    let store = DocumentStore::with_backend(StoreConfig::default(), server);
    let err = store.ensure_loaded("legacy").await.unwrap_err();
    match err {
        VectorError::SchemaMismatch {
            collection,
            expected,
            found,
        } => {
            assert_eq!(collection, "legacy");
            assert_eq!(expected, SCHEMA_VERSION);
            assert_eq!(found, SCHEMA_VERSION + 1);
        }
        other => panic!("expected SchemaMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_collection_name_is_lifecycle_error() {
    let server = Arc::new(MemoryServer::new());
    let store = DocumentStore::with_backend(StoreConfig::default(), server);
    let err = store.ensure_loaded("tenant-42").await.unwrap_err();
    assert!(matches!(err, VectorError::Lifecycle { .. }));
}

#[tokio::test]
async fn test_operations_before_load_report_not_loaded() {
    let server = Arc::new(MemoryServer::new());
    let store = DocumentStore::with_backend(StoreConfig::default(), server);
    assert!(store.active_collection().is_none());

    let err = store
        .store(&tenant_doc("tenant_42", "d1", "hello"), &axis_vector(0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::NotLoaded { .. }));

    let err = store
        .search(Some(&axis_vector(0, 1.0)), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::NotLoaded { .. }));
}

#[tokio::test]
async fn test_release_unloads_handles_and_active_slot() {
    let (_server, store, collection) = loaded_store("tenant_42").await;
    store.release("tenant_42").await.unwrap();

    assert!(!collection.is_loaded().await.unwrap());
    assert!(store.active_collection().is_none());

    let err = collection
        .store(&tenant_doc("tenant_42", "d1", "hello"), &axis_vector(0, 1.0))
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::NotLoaded { ref collection } if collection == "tenant_42"));

    let err = collection
        .search(Some(&axis_vector(0, 1.0)), None, 10)
        .await
        .unwrap_err();
    assert!(matches!(err, VectorError::NotLoaded { .. }));

    // loading again restores access
    let reloaded = store.ensure_loaded("tenant_42").await.unwrap();
    assert!(reloaded.is_loaded().await.unwrap());
}

#[tokio::test]
async fn test_service_refuses_inserts_into_released_collection() {
    let (server, store, collection) = loaded_store("tenant_42").await;
    let row = super::document::build_row(
        &tenant_doc("tenant_42", "d1", "hello"),
        &axis_vector(0, 1.0),
        store.schema(),
    )
    .unwrap();

    store.release("tenant_42").await.unwrap();

    let err = server.insert("tenant_42", vec![row]).await.unwrap_err();
    assert!(matches!(err, BackendError::CollectionNotLoaded { .. }));
    assert_eq!(
        server.describe_collection("tenant_42").await.unwrap().num_entities,
        0
    );
    assert_eq!(collection.name(), "tenant_42");
}

#[tokio::test]
async fn test_active_collection_tracks_last_load() {
    let (_server, store, _a) = loaded_store("tenant_a").await;
    store.ensure_loaded("tenant_b").await.unwrap();
    assert_eq!(store.active_collection().unwrap().name(), "tenant_b");

    store
        .store(&tenant_doc("b", "d1", "only in b"), &axis_vector(1, 1.0))
        .await
        .unwrap();

    let a = store.ensure_loaded("tenant_a").await.unwrap();
    assert_eq!(a.count().await.unwrap(), 0);
}

// ============================================================================
// Insert path
// ============================================================================

#[tokio::test]
async fn test_hello_world_scenario() {
    let (_server, store, _collection) = loaded_store("tenant_42").await;
    let document = tenant_doc("tenant_42", "d1", "hello world");
    let embedding = axis_vector(3, 0.5);

    let id = store.store(&document, &embedding).await.unwrap();

    let hits = store
        .search(Some(&embedding), Some("user_id == \"tenant_42\""), 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);

    let hit = &hits[0];
    assert_eq!(hit.id, id);
    assert_eq!(hit.user_id, "tenant_42");
    assert_eq!(hit.kb_id, "kb1");
    assert_eq!(hit.file_id, "f1");
    assert_eq!(hit.doc_id, "d1");
    assert_eq!(hit.content, "hello world");
    assert_eq!(hit.headers, headers());
    assert_eq!(hit.embedding, embedding);
    assert_eq!(hit.distance, Some(0.0));
}

#[tokio::test]
async fn test_empty_embedding_rejected_nothing_written() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    let err = collection
        .store(&tenant_doc("tenant_42", "d1", "hello"), &[])
        .await
        .unwrap_err();
    match err {
        VectorError::Validation { reason } => assert!(reason.contains("embedding")),
        other => panic!("expected Validation, got {:?}", other),
    }
    assert_eq!(collection.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_each_missing_field_rejected() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    for key in [
        metadata_keys::USER_ID,
        metadata_keys::KB_ID,
        metadata_keys::FILE_ID,
        metadata_keys::DOC_ID,
    ] {
        let mut document = tenant_doc("tenant_42", "d1", "hello");
        document.metadata.remove(key);
        let err = collection
            .store(&document, &axis_vector(0, 1.0))
            .await
            .unwrap_err();
        match err {
            VectorError::Validation { reason } => assert!(reason.contains(key), "{}", reason),
            other => panic!("expected Validation for {}, got {:?}", key, other),
        }

        let mut blank = tenant_doc("tenant_42", "d1", "hello");
        blank.metadata.insert(key.to_string(), json!(""));
        assert!(matches!(
            collection.store(&blank, &axis_vector(0, 1.0)).await,
            Err(VectorError::Validation { .. })
        ));
    }

    let no_content = tenant_doc("tenant_42", "d1", "");
    assert!(matches!(
        collection.store(&no_content, &axis_vector(0, 1.0)).await,
        Err(VectorError::Validation { .. })
    ));

    assert_eq!(collection.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_values_rejected() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    let long_user = tenant_doc(&"u".repeat(65), "d1", "hello");
    assert!(matches!(
        collection.store(&long_user, &axis_vector(0, 1.0)).await,
        Err(VectorError::Validation { .. })
    ));

    let mut big_headers = Map::new();
    big_headers.insert("h1".to_string(), Value::String("x".repeat(300)));
    let document = tenant_doc("tenant_42", "d1", "hello").with_headers(big_headers);
    assert!(matches!(
        collection.store(&document, &axis_vector(0, 1.0)).await,
        Err(VectorError::Validation { .. })
    ));

    // limits count characters, not bytes
    let wide = tenant_doc("tenant_42", "d1", &"é".repeat(4000));
    collection.store(&wide, &axis_vector(0, 1.0)).await.unwrap();

    assert_eq!(collection.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_bad_embedding_values_rejected() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let document = tenant_doc("tenant_42", "d1", "hello");

    assert!(matches!(
        collection.store(&document, &[0.1; 4]).await,
        Err(VectorError::Validation { .. })
    ));

    let mut nan = axis_vector(0, 1.0);
    nan[7] = f32::NAN;
    assert!(matches!(
        collection.store(&document, &nan).await,
        Err(VectorError::Validation { .. })
    ));

    let not_object = document.clone().with_metadata(metadata_keys::HEADERS, json!([1, 2]));
    assert!(matches!(
        collection.store(&not_object, &axis_vector(0, 1.0)).await,
        Err(VectorError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_absent_headers_stored_as_empty_map() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let mut document = tenant_doc("tenant_42", "d1", "hello");
    document.metadata.remove(metadata_keys::HEADERS);

    collection.store(&document, &axis_vector(0, 1.0)).await.unwrap();
    let hits = collection
        .search(Some(&axis_vector(0, 1.0)), None, 1)
        .await
        .unwrap();
    assert!(hits[0].headers.is_empty());
}

#[tokio::test]
async fn test_store_batch_is_all_or_nothing() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    let good: Vec<(Document, Vec<f32>)> = (0..3)
        .map(|i| {
            (
                tenant_doc("tenant_42", &format!("d{}", i), "chunk"),
                axis_vector(i, 1.0),
            )
        })
        .collect();
    let ids = collection.store_batch(&good).await.unwrap();
    assert_eq!(ids.len(), 3);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let mut bad = good.clone();
    bad[1].1.clear();
    match collection.store_batch(&bad).await.unwrap_err() {
        VectorError::Validation { reason } => assert!(reason.starts_with("document 1")),
        other => panic!("expected Validation, got {:?}", other),
    }
    assert_eq!(collection.count().await.unwrap(), 3);

    assert!(collection.store_batch(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_store_text_uses_provider() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let embedder = AxisEmbedder {
        dimension: EMBEDDING_DIM,
    };

    let document = tenant_doc("tenant_42", "d1", "hello");
    collection.store_text(&document, &embedder).await.unwrap();

    let hits = collection
        .search_text("hello", &embedder, None, 5)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].distance, Some(0.0));
}

#[tokio::test]
async fn test_embedding_failures_surface() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let document = tenant_doc("tenant_42", "d1", "hello");

    let err = collection.store_text(&document, &DownEmbedder).await.unwrap_err();
    assert!(matches!(
        err,
        VectorError::Embedding(EmbeddingError::ServiceUnavailable { .. })
    ));
    assert_eq!(collection.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_provider_dimension_must_match_schema() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let document = tenant_doc("tenant_42", "d1", "hello");
    let small = AxisEmbedder { dimension: 8 };

    let err = collection.store_text(&document, &small).await.unwrap_err();
    assert!(matches!(
        err,
        VectorError::Embedding(EmbeddingError::DimensionMismatch { expected: 768, actual: 8 })
    ));

    let err = collection
        .search_text("hello", &small, None, 10)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VectorError::Embedding(EmbeddingError::DimensionMismatch { expected: 768, actual: 8 })
    ));
    assert_eq!(collection.count().await.unwrap(), 0);
}

// ============================================================================
// Query path
// ============================================================================

#[tokio::test]
async fn test_search_orders_by_distance_then_id() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    let far = collection
        .store(&tenant_doc("t", "far", "far"), &axis_vector(0, 3.0))
        .await
        .unwrap();
    let near_a = collection
        .store(&tenant_doc("t", "near_a", "near"), &axis_vector(0, 1.0))
        .await
        .unwrap();
    let near_b = collection
        .store(&tenant_doc("t", "near_b", "near"), &axis_vector(0, 1.0))
        .await
        .unwrap();

    let hits = collection
        .search(Some(&axis_vector(0, 1.0)), None, 10)
        .await
        .unwrap();
    let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![near_a, near_b, far]);
    assert_eq!(hits[2].distance, Some(2.0));
}

#[tokio::test]
async fn test_filter_restricts_hits() {
    let (_server, _store, collection) = loaded_store("kb_shared").await;
    for (user, doc) in [("alice", "d1"), ("bob", "d2"), ("alice", "d3")] {
        collection
            .store(&tenant_doc(user, doc, "text"), &axis_vector(1, 1.0))
            .await
            .unwrap();
    }

    let query = axis_vector(1, 1.0);
    let alice = collection
        .search(Some(&query), Some("user_id == 'alice'"), 10)
        .await
        .unwrap();
    assert_eq!(alice.len(), 2);
    assert!(alice.iter().all(|h| h.user_id == "alice"));

    let some = collection
        .search(Some(&query), Some("doc_id in ['d2', 'd3'] and not user_id == 'bob'"), 10)
        .await
        .unwrap();
    assert_eq!(some.len(), 1);
    assert_eq!(some[0].doc_id, "d3");

    let all = collection.search(Some(&query), Some("   "), 10).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_bad_filters_are_query_errors() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let query = axis_vector(0, 1.0);

    for filter in ["user_id ==", "owner == 'x'", "embedding == 1", "user_id == 5"] {
        let err = collection
            .search(Some(&query), Some(filter), 10)
            .await
            .unwrap_err();
        assert!(
            matches!(err, VectorError::Query { .. }),
            "filter {:?} gave {:?}",
            filter,
            err
        );
    }
}

#[tokio::test]
async fn test_search_argument_errors() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;

    assert!(matches!(
        collection.search(Some(&axis_vector(0, 1.0)), None, 0).await,
        Err(VectorError::Query { .. })
    ));
    assert!(matches!(
        collection.search(Some(&[1.0, 2.0]), None, 10).await,
        Err(VectorError::Query { .. })
    ));
    assert!(matches!(
        collection.search(None, None, 10).await,
        Err(VectorError::Query { .. })
    ));
    assert!(matches!(
        collection.search(None, Some("  "), 10).await,
        Err(VectorError::Query { .. })
    ));
}

#[tokio::test]
async fn test_filter_only_search_without_vector() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    let mut ids = Vec::new();
    for i in 0..4 {
        let user = if i % 2 == 0 { "even" } else { "odd" };
        ids.push(
            collection
                .store(&tenant_doc(user, &format!("d{}", i), "x"), &axis_vector(i, 1.0))
                .await
                .unwrap(),
        );
    }

    let hits = collection
        .search(None, Some("user_id == \"even\""), 10)
        .await
        .unwrap();
    assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![ids[0], ids[2]]);
    assert!(hits.iter().all(|h| h.distance.is_none()));

    let limited = collection.query("id >= 0", 3).await.unwrap();
    assert_eq!(limited.len(), 3);
}

#[tokio::test]
async fn test_like_filter() {
    let (_server, _store, collection) = loaded_store("tenant_42").await;
    for doc in ["report_2023", "report_2024", "memo_2024"] {
        collection
            .store(&tenant_doc("t", doc, "x"), &axis_vector(0, 1.0))
            .await
            .unwrap();
    }

    let hits = collection.query("doc_id like 'report%'", 10).await.unwrap();
    assert_eq!(hits.len(), 2);
}

// ============================================================================
// Connection and service failures
// ============================================================================

fn fast_config() -> StoreConfig {
    StoreConfig::default().with_connection(
        ConnectionConfig::default().with_retries(2, Duration::from_millis(10)),
    )
}

#[tokio::test]
async fn test_unreachable_service_leaves_client_disconnected() {
    let server = Arc::new(MemoryServer::new());
    server.set_online(false);
    let connector = MemoryConnector::new(server);

    let store = DocumentStore::connect(fast_config(), &connector).await;
    assert!(!store.is_connected());

    let err = store.ensure_loaded("tenant_42").await.unwrap_err();
    assert!(matches!(err, VectorError::Connection { .. }));
    assert!(err.is_retryable());
    assert!(matches!(
        store.list_collections().await,
        Err(VectorError::Connection { .. })
    ));
}

#[tokio::test]
async fn test_connect_succeeds_when_online() {
    let server = Arc::new(MemoryServer::new());
    let connector = MemoryConnector::new(server);

    let store = DocumentStore::connect(fast_config(), &connector).await;
    assert!(store.is_connected());
    store.ensure_loaded("tenant_42").await.unwrap();
}

#[tokio::test]
async fn test_service_outage_maps_per_operation() {
    let (server, store, collection) = loaded_store("tenant_42").await;
    server.set_online(false);

    assert!(matches!(
        collection
            .store(&tenant_doc("t", "d1", "x"), &axis_vector(0, 1.0))
            .await,
        Err(VectorError::StoreWrite {
            transient: true,
            ..
        })
    ));
    assert!(matches!(
        collection.search(Some(&axis_vector(0, 1.0)), None, 5).await,
        Err(VectorError::Query {
            transient: true,
            ..
        })
    ));
    assert!(matches!(
        store.ensure_loaded("tenant_42").await,
        Err(VectorError::Connection { .. })
    ));

    server.set_online(true);
    collection
        .store(&tenant_doc("t", "d1", "x"), &axis_vector(0, 1.0))
        .await
        .unwrap();

    let bad_filter = collection
        .search(Some(&axis_vector(0, 1.0)), Some("tenant == 'x'"), 5)
        .await
        .unwrap_err();
    assert!(!bad_filter.is_retryable());
}

// ============================================================================
// Persistence and sharing
// ============================================================================

#[tokio::test]
async fn test_second_client_sees_stored_documents() {
    let (server, _store, collection) = loaded_store("tenant_42").await;
    collection
        .store(&tenant_doc("tenant_42", "d1", "shared"), &axis_vector(5, 1.0))
        .await
        .unwrap();

    let other = DocumentStore::with_backend(StoreConfig::default(), server);
    let attached = other.ensure_loaded("tenant_42").await.unwrap();
    let hits = attached
        .search(Some(&axis_vector(5, 1.0)), None, 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "shared");
}

#[tokio::test]
async fn test_collections_survive_snapshot_reload() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let embedding = axis_vector(9, 2.0);

    let stored_id = {
        let server = Arc::new(MemoryServer::open(temp_dir.path()).unwrap());
        let store = DocumentStore::with_backend(StoreConfig::default(), server);
        let collection = store.ensure_loaded("tenant_42").await.unwrap();
        collection
            .store(&tenant_doc("tenant_42", "d1", "persisted"), &embedding)
            .await
            .unwrap()
    };

    let server = Arc::new(MemoryServer::open(temp_dir.path()).unwrap());
    let info = server.describe_collection("tenant_42").await.unwrap();
    assert!(!info.loaded);
    assert_eq!(info.num_entities, 1);

    let store = DocumentStore::with_backend(StoreConfig::default(), server);
    let collection = store.ensure_loaded("tenant_42").await.unwrap();
    let hits = collection.search(Some(&embedding), None, 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, stored_id);
    assert_eq!(hits[0].headers, headers());

    let next = collection
        .store(&tenant_doc("tenant_42", "d2", "after reload"), &embedding)
        .await
        .unwrap();
    assert!(next > stored_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_inserts_all_reach_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    {
        let server = Arc::new(MemoryServer::open(temp_dir.path()).unwrap());
        let store = DocumentStore::with_backend(StoreConfig::default(), server);
        let collection = store.ensure_loaded("tenant_42").await.unwrap();

        let writes = (0..8).map(|i| {
            let collection = collection.clone();
            async move {
                collection
                    .store(&tenant_doc("tenant_42", &format!("d{}", i), "x"), &axis_vector(i, 1.0))
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }
    }

    let server = MemoryServer::open(temp_dir.path()).unwrap();
    let info = server.describe_collection("tenant_42").await.unwrap();
    assert_eq!(info.num_entities, 8);
}

// ============================================================================
// Concurrency and metrics
// ============================================================================

#[tokio::test]
async fn test_worker_pool_drives_independent_tenants() {
    let server = Arc::new(MemoryServer::new());
    let store = DocumentStore::with_backend(StoreConfig::default(), server);

    let mut handles = Vec::new();
    for tenant in ["tenant_a", "tenant_b", "tenant_c"] {
        handles.push(store.ensure_loaded(tenant).await.unwrap());
    }

    let pool = WorkerPool::new(2).unwrap();
    let tasks: Vec<_> = handles
        .iter()
        .cloned()
        .flat_map(|collection| {
            (0..4).map(move |i| {
                let collection = collection.clone();
                async move {
                    let user = collection.name().to_string();
                    collection
                        .store(&tenant_doc(&user, &format!("d{}", i), "x"), &axis_vector(i, 1.0))
                        .await
                }
            })
        })
        .collect();

    let results = pool.run_all(tasks).await;
    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| matches!(r, Ok(Ok(_)))));

    for collection in &handles {
        assert_eq!(collection.count().await.unwrap(), 4);
        let filter = format!("user_id == '{}'", collection.name());
        let hits = collection.query(&filter, 10).await.unwrap();
        assert_eq!(hits.len(), 4);
    }
}

#[tokio::test]
async fn test_operations_record_metrics() {
    let (_server, store, collection) = loaded_store("tenant_42").await;
    collection
        .store(&tenant_doc("t", "d1", "x"), &axis_vector(0, 1.0))
        .await
        .unwrap();
    collection
        .search(Some(&axis_vector(0, 1.0)), None, 3)
        .await
        .unwrap();

    let metrics = store.metrics();
    assert_eq!(metrics.get_stats("vector.ensure_loaded").unwrap().count, 1);
    assert_eq!(metrics.get_stats("vector.store").unwrap().count, 1);
    assert_eq!(metrics.get_stats("vector.search").unwrap().count, 1);
    assert_eq!(metrics.get_stats("vector.rows_stored").unwrap().sum, 1.0);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Search never returns more than `limit` hits and hits come back in
    /// non-decreasing L2 distance.
    #[test]
    fn prop_search_capped_and_ordered(
        num_docs in 1usize..24,
        limit in 1usize..16,
        seed in any::<u64>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_server, _store, collection) = loaded_store("prop").await;
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

            let batch: Vec<(Document, Vec<f32>)> = (0..num_docs)
                .map(|i| (tenant_doc("p", &format!("d{}", i), "x"), random_vector(&mut rng)))
                .collect();
            collection.store_batch(&batch).await.unwrap();

            let query = random_vector(&mut rng);
            let hits = collection.search(Some(&query), None, limit).await.unwrap();

            prop_assert_eq!(hits.len(), num_docs.min(limit));
            for pair in hits.windows(2) {
                let (a, b) = (pair[0].distance.unwrap(), pair[1].distance.unwrap());
                prop_assert!(a <= b, "distance {} before {}", a, b);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Dropping any required field fails validation and writes nothing
    #[test]
    fn prop_missing_field_never_written(
        field in prop::sample::select(vec![
            metadata_keys::USER_ID,
            metadata_keys::KB_ID,
            metadata_keys::FILE_ID,
            metadata_keys::DOC_ID,
        ]),
        user in "[a-z0-9_]{1,64}",
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_server, _store, collection) = loaded_store("prop").await;
            let mut document = tenant_doc(&user, "d1", "content");
            document.metadata.remove(field);

            let result = collection.store(&document, &axis_vector(0, 1.0)).await;
            let is_validation_error = matches!(result, Err(VectorError::Validation { .. }));
            prop_assert!(is_validation_error);
            prop_assert_eq!(collection.count().await.unwrap(), 0);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
