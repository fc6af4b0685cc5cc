//! Connection establishment with timeout and bounded retries

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::backend::VectorBackend;
use super::config::ConnectionConfig;
use super::error::{BackendError, BackendResult, VectorError};
use super::memory::MemoryServer;

/// Produces a live backend handle for a connection configuration
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> BackendResult<Arc<dyn VectorBackend>>;
}

/// Connects clients to a shared in-process [`MemoryServer`]
#[derive(Clone)]
pub struct MemoryConnector {
    server: Arc<MemoryServer>,
}

impl MemoryConnector {
    pub fn new(server: Arc<MemoryServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<MemoryServer> {
        &self.server
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, config: &ConnectionConfig) -> BackendResult<Arc<dyn VectorBackend>> {
        self.server.ping().await?;
        debug!("Attached to in-process vector service as {}", config.address());
        Ok(self.server.clone() as Arc<dyn VectorBackend>)
    }
}

/// Connect, retrying up to `config.retries` attempts
///
/// Each attempt is bounded by `config.timeout()`; failed attempts wait
/// `config.retry_wait()` before the next one.
pub async fn connect_with_retry(
    connector: &dyn Connector,
    config: &ConnectionConfig,
) -> Result<Arc<dyn VectorBackend>, VectorError> {
    let attempts = config.retries.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(config.timeout(), connector.connect(config)).await;

        let error = match outcome {
            Ok(Ok(backend)) => {
                info!("Connected to vector service at {}", config.address());
                return Ok(backend);
            }
            Ok(Err(e)) => e,
            Err(_) => BackendError::Unavailable {
                reason: format!("connect timed out after {}s", config.timeout_secs),
            },
        };

        warn!(
            "Connection attempt {}/{} to {} failed: {}",
            attempt,
            attempts,
            config.address(),
            error
        );
        last_error = error.to_string();

        if attempt < attempts {
            tokio::time::sleep(config.retry_wait()).await;
        }
    }

    Err(VectorError::Connection {
        reason: format!(
            "could not reach {} after {} attempt(s): {}",
            config.address(),
            attempts,
            last_error
        ),
    })
}
