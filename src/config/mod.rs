//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, UpstreamConfig, LifecycleConfig)
//! - [`listen`]: Subscriber listener configuration (ListenConfig)
//! - [`defaults`]: Serde default value functions
//! - [`validation`]: Startup validation

mod defaults;
mod listen;
mod types;
pub mod validation;

pub use listen::ListenConfig;
pub use types::{
    Config, ConfigError, HttpConfig, LifecycleConfig, LogFormat, LoggingConfig, UpstreamConfig,
};
