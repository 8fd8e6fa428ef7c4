//! Service registry
//!
//! Maps service names to concrete implementations.

pub mod http;
pub mod mock;

use crate::config::FableConfig;
use crate::service::GenerationService;
use fable_core::{FableError, Result};

/// Create a generation service by name with configuration
pub fn create_service(name: &str, config: &FableConfig) -> Result<Box<dyn GenerationService>> {
    match name {
        "mock" => Ok(Box::new(mock::MockService::new(
            config.generation.scratch_dir.join("mock"),
        ))),
        "http" => Ok(Box::new(http::HttpGenerationClient::from_config(config))),
        _ => Err(FableError::ConfigError(format!(
            "Unknown generation service '{}'. Available: {}",
            name,
            available_services().join(", ")
        ))),
    }
}

/// List all available service names
pub fn available_services() -> Vec<&'static str> {
    vec!["http", "mock"]
}
