//! Per-operation timing and counters for the document store

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metric names recorded by the store client
pub mod names {
    pub const ENSURE_LOADED: &str = "vector.ensure_loaded";
    pub const STORE: &str = "vector.store";
    pub const SEARCH: &str = "vector.search";
    pub const QUERY: &str = "vector.query";
    pub const ROWS_STORED: &str = "vector.rows_stored";
    pub const EMBED: &str = "vector.embed";
}

/// Type of metric being recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricType {
    /// Duration of an operation
    Duration(Duration),
    Counter(u64),
    /// Gauge value (can go up or down)
    Gauge(f64),
}

impl MetricType {
    /// Value folded into aggregates; durations in milliseconds
    pub fn numeric(&self) -> f64 {
        match self {
            MetricType::Duration(d) => d.as_secs_f64() * 1000.0,
            MetricType::Counter(c) => *c as f64,
            MetricType::Gauge(g) => *g,
        }
    }
}

/// A single metric entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEntry {
    pub name: String,
    pub value: MetricType,
    pub timestamp: DateTime<Utc>,
    /// Optional labels/tags
    pub labels: HashMap<String, String>,
}

/// Aggregated statistics for a metric
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricStats {
    /// Number of samples
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Last recorded value
    pub last: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl MetricStats {
    fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
            mean: 0.0,
            last: 0.0,
            last_updated: None,
        }
    }

    fn update(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean = self.sum / self.count as f64;
        self.last = value;
        self.last_updated = Some(Utc::now());
    }
}

/// Snapshot of the store client's own metrics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreMetricsSummary {
    pub ensure_loaded_ms: MetricStats,
    pub store_ms: MetricStats,
    pub search_ms: MetricStats,
    pub query_ms: MetricStats,
    pub rows_stored: MetricStats,
}

/// Metrics collector for recording and aggregating performance data
pub struct MetricsCollector {
    /// Aggregated metrics by name
    metrics: RwLock<HashMap<String, MetricStats>>,
    recent_entries: RwLock<VecDeque<MetricEntry>>,
    max_recent_entries: usize,
    total_recorded: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Keep at most `max_recent_entries` raw entries
    pub fn with_capacity(max_recent_entries: usize) -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            recent_entries: RwLock::new(VecDeque::with_capacity(max_recent_entries)),
            max_recent_entries,
            total_recorded: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, name: &str, value: MetricType) {
        self.record_with_labels(name, value, HashMap::new());
    }

    /// Record a metric with labels
    pub fn record_with_labels(
        &self,
        name: &str,
        value: MetricType,
        labels: HashMap<String, String>,
    ) {
        let numeric_value = value.numeric();

        {
            let mut metrics = self.metrics.write();
            let stats = metrics.entry(name.to_string()).or_insert_with(MetricStats::new);
            stats.update(numeric_value);
        }

        if self.max_recent_entries > 0 {
            let mut recent = self.recent_entries.write();
            if recent.len() >= self.max_recent_entries {
                recent.pop_front();
            }
            recent.push_back(MetricEntry {
                name: name.to_string(),
                value,
                timestamp: Utc::now(),
                labels,
            });
        }

        self.total_recorded.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(
            target: "metrics",
            metric_name = name,
            metric_value = numeric_value,
            "Metric recorded"
        );
    }

    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.record(name, MetricType::Duration(duration));
    }

    pub fn record_counter(&self, name: &str, value: u64) {
        self.record(name, MetricType::Counter(value));
    }

    pub fn record_gauge(&self, name: &str, value: f64) {
        self.record(name, MetricType::Gauge(value));
    }

    pub fn get_stats(&self, name: &str) -> Option<MetricStats> {
        self.metrics.read().get(name).cloned()
    }

    pub fn get_all_stats(&self) -> HashMap<String, MetricStats> {
        self.metrics.read().clone()
    }

    /// Recent raw entries, oldest first
    pub fn get_recent_entries(&self) -> Vec<MetricEntry> {
        self.recent_entries.read().iter().cloned().collect()
    }

    pub fn get_recent_entries_for(&self, name: &str) -> Vec<MetricEntry> {
        self.recent_entries
            .read()
            .iter()
            .filter(|e| e.name == name)
            .cloned()
            .collect()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn clear(&self) {
        self.metrics.write().clear();
        self.recent_entries.write().clear();
        self.total_recorded.store(0, Ordering::Relaxed);
    }

    pub fn summary(&self) -> StoreMetricsSummary {
        let metrics = self.metrics.read();
        let get = |name: &str| metrics.get(name).cloned().unwrap_or_default();

        StoreMetricsSummary {
            ensure_loaded_ms: get(names::ENSURE_LOADED),
            store_ms: get(names::STORE),
            search_ms: get(names::SEARCH),
            query_ms: get(names::QUERY),
            rows_stored: get(names::ROWS_STORED),
        }
    }

    /// Aggregates as pretty JSON
    pub fn export_json(&self) -> String {
        let stats = self.get_all_stats();
        serde_json::to_string_pretty(&stats).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the elapsed time under `name` when dropped
pub struct TimerGuard<'a> {
    collector: &'a MetricsCollector,
    name: String,
    start: Instant,
    labels: HashMap<String, String>,
}

impl<'a> TimerGuard<'a> {
    pub fn new(collector: &'a MetricsCollector, name: impl Into<String>) -> Self {
        Self {
            collector,
            name: name.into(),
            start: Instant::now(),
            labels: HashMap::new(),
        }
    }

    pub fn add_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

impl<'a> Drop for TimerGuard<'a> {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.collector.record_with_labels(
            &self.name,
            MetricType::Duration(duration),
            std::mem::take(&mut self.labels),
        );
    }
}

pub fn time_operation<'a>(collector: &'a MetricsCollector, name: &str) -> TimerGuard<'a> {
    TimerGuard::new(collector, name)
}
