//! Builders
//!
//! Fluent builders for token service configuration.

pub mod config;

pub use config::{token_services_config, TokenServicesConfigBuilder};
