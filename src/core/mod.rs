//! Core module
//!
//! Client configuration and the crate-level error type.

pub mod config;
pub mod error;


pub use self::config::{
    default_config_path, ClientConfig, ConfigError, ConfigResult, PoolConfig, ENV_PREFIX,
    ENV_SEPARATOR,
};
pub use error::{DocStoreError, Result};
