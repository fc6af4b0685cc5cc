//! Logging and metrics for the document store
//!
//! Provides:
//! - Structured logs with configurable verbosity levels
//! - Console and rolled file output
//! - Per-operation timing for bottleneck identification

mod config;
mod metrics;


pub use self::config::{
    default_log_directory, LogFormat, LogLevel, LogOutput, LoggingConfig, RotationStrategy,
};
pub use metrics::{
    names, time_operation, MetricEntry, MetricStats, MetricType, MetricsCollector,
    StoreMetricsSummary, TimerGuard,
};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging system errors
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to initialize logging: {0}")]
    InitializationError(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationError(String),

    #[error("Invalid filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for logging operations
pub type LoggingResult<T> = Result<T, LoggingError>;

/// Installed subscriber plus the state that must outlive it
pub struct LoggingSystem {
    config: LoggingConfig,
    metrics: Arc<MetricsCollector>,
    _guards: Vec<WorkerGuard>,
}

impl LoggingSystem {
    /// Install the global subscriber described by `config`
    ///
    /// Fails if a global subscriber is already set.
    pub fn init(config: LoggingConfig) -> LoggingResult<Self> {
        let mut guards = Vec::new();
        let env_filter = Self::build_env_filter(&config)?;
        let registry = tracing_subscriber::registry();

        match config.output {
            LogOutput::Console => {
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::File => {
                let (file_layer, guard) = Self::create_file_layer(&config)?;
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
            LogOutput::Both => {
                let (file_layer, guard) = Self::create_file_layer(&config)?;
                guards.push(guard);
                registry
                    .with(env_filter)
                    .with(Self::create_console_layer(&config))
                    .with(file_layer)
                    .try_init()
                    .map_err(|e| LoggingError::InitializationError(e.to_string()))?;
            }
        }

        Ok(Self {
            config,
            metrics: Arc::new(MetricsCollector::new()),
            _guards: guards,
        })
    }

    /// Base level plus per-module directives
    ///
    /// `RUST_LOG` directives, when set, are appended and win over the
    /// configured ones.
    pub fn build_env_filter(config: &LoggingConfig) -> LoggingResult<EnvFilter> {
        let mut filter = EnvFilter::new(config.level.as_str());

        let mut modules: Vec<_> = config.module_levels.iter().collect();
        modules.sort_by(|a, b| a.0.cmp(b.0));
        for (module, level) in modules {
            let directive = format!("{}={}", module, level);
            let parsed = directive.parse::<Directive>().map_err(|e| {
                LoggingError::InvalidDirective {
                    directive: directive.clone(),
                    reason: e.to_string(),
                }
            })?;
            filter = filter.add_directive(parsed);
        }

        if let Ok(env) = std::env::var(EnvFilter::DEFAULT_ENV) {
            for directive in env.split(',').filter(|d| !d.trim().is_empty()) {
                if let Ok(parsed) = directive.trim().parse::<Directive>() {
                    filter = filter.add_directive(parsed);
                }
            }
        }

        Ok(filter)
    }

    fn create_console_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info);

        if config.format == LogFormat::Json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    }

    fn create_file_layer<S>(
        config: &LoggingConfig,
    ) -> LoggingResult<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard)>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    {
        let log_dir = config.resolved_log_directory();
        std::fs::create_dir_all(&log_dir).map_err(|e| {
            LoggingError::DirectoryCreationError(format!(
                "Failed to create log directory {:?}: {}",
                log_dir, e
            ))
        })?;

        let rotation = match config.rotation {
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
            RotationStrategy::Never => Rotation::NEVER,
        };

        let file_appender = RollingFileAppender::new(rotation, &log_dir, &config.file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_target(config.include_target)
            .with_thread_ids(config.include_thread_id)
            .with_file(config.include_file_info)
            .with_line_number(config.include_file_info)
            .with_ansi(false);

        if config.format == LogFormat::Json {
            Ok((layer.json().boxed(), guard))
        } else {
            Ok((layer.boxed(), guard))
        }
    }

    /// Collector for callers that want to share one across clients
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        Arc::clone(&self.metrics)
    }

    /// Directory file output goes to, if file output is enabled
    pub fn log_directory(&self) -> Option<PathBuf> {
        self.config
            .output
            .writes_file()
            .then(|| self.config.resolved_log_directory())
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.level
    }
}

/// Initialize logging with default configuration
pub fn init_default_logging() -> LoggingResult<LoggingSystem> {
    LoggingSystem::init(LoggingConfig::default())
}

/// Time a block, record it in `$metrics` and log it at debug level
#[macro_export]
macro_rules! timed_debug {
    ($metrics:expr, $name:expr, $($arg:tt)*) => {{
        let start = std::time::Instant::now();
        let result = { $($arg)* };
        let duration = start.elapsed();
        $metrics.record($name, $crate::logging::MetricType::Duration(duration));
        tracing::debug!(
            target: "performance",
            operation = $name,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        result
    }};
}
