//! Request boundary over the lineage core.
//!
//! # Responsibility
//! - Route method/path/JSON requests to core use cases.
//! - Resolve runtime configuration from the environment.

pub mod api;
pub mod config;

pub use api::{Api, ApiError, ApiRequest, ApiResponse, Method, UnknownMethod};
pub use config::{ApiConfig, ConfigError};
