//! Vector store configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Distance metric for vector similarity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MetricType {
    /// Euclidean distance, smaller is closer
    #[default]
    #[serde(rename = "L2")]
    L2,
    /// Inner product, larger is closer
    #[serde(rename = "IP")]
    Ip,
    /// Cosine similarity, larger is closer
    #[serde(rename = "COSINE")]
    Cosine,
}

impl MetricType {
    /// Whether a smaller score ranks first
    pub fn ascending(&self) -> bool {
        matches!(self, MetricType::L2)
    }

    /// Score `b` against `a` under this metric
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            MetricType::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).powi(2))
                .sum::<f32>()
                .sqrt(),
            MetricType::Ip => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
            MetricType::Cosine => {
                let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::L2 => write!(f, "L2"),
            MetricType::Ip => write!(f, "IP"),
            MetricType::Cosine => write!(f, "COSINE"),
        }
    }
}

/// Index algorithm built on the vector field
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum IndexType {
    #[default]
    #[serde(rename = "IVF_FLAT")]
    IvfFlat,
    #[serde(rename = "FLAT")]
    Flat,
}

impl std::fmt::Display for IndexType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexType::IvfFlat => write!(f, "IVF_FLAT"),
            IndexType::Flat => write!(f, "FLAT"),
        }
    }
}

/// Build-time index parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    #[serde(default)]
    pub index_type: IndexType,

    #[serde(default)]
    pub metric: MetricType,

    /// Number of IVF partitions
    #[serde(default = "default_nlist")]
    pub nlist: u32,
}

fn default_nlist() -> u32 {
    1024
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            index_type: IndexType::IvfFlat,
            metric: MetricType::L2,
            nlist: default_nlist(),
        }
    }
}

impl IndexParams {
    pub fn with_nlist(mut self, nlist: u32) -> Self {
        self.nlist = nlist;
        self
    }

    pub fn with_metric(mut self, metric: MetricType) -> Self {
        self.metric = metric;
        self
    }
}

/// Query-time search parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub metric: MetricType,

    /// Number of IVF partitions probed per query
    #[serde(default = "default_nprobe")]
    pub nprobe: u32,

    /// Result cap used when the caller does not pass one
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_nprobe() -> u32 {
    128
}

fn default_limit() -> usize {
    10
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            metric: MetricType::L2,
            nprobe: default_nprobe(),
            default_limit: default_limit(),
        }
    }
}

impl SearchParams {
    pub fn with_nprobe(mut self, nprobe: u32) -> Self {
        self.nprobe = nprobe;
        self
    }

    pub fn with_metric(mut self, metric: MetricType) -> Self {
        self.metric = metric;
        self
    }
}

/// Database connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-attempt connect timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect attempts before giving up
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Wait between failed attempts
    #[serde(default = "default_retry_wait_ms")]
    pub retry_wait_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    19530
}

fn default_timeout_secs() -> u64 {
    3
}

fn default_retries() -> u32 {
    3
}

fn default_retry_wait_ms() -> u64 {
    1000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            retry_wait_ms: default_retry_wait_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_retries(mut self, retries: u32, wait: Duration) -> Self {
        self.retries = retries;
        self.retry_wait_ms = wait.as_millis() as u64;
        self
    }
}

/// Settings a [`super::DocumentStore`] is constructed with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub index: IndexParams,

    #[serde(default)]
    pub search: SearchParams,
}

impl StoreConfig {
    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_index(mut self, index: IndexParams) -> Self {
        self.index = index;
        self
    }

    pub fn with_search(mut self, search: SearchParams) -> Self {
        self.search = search;
        self
    }
}
