//! MMR Admin Core Library
//!
//! This crate provides the domain models, error types and connection configuration
//! shared by the API client, the task monitor and the CLI.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{ConfigPaths, ConfigResolver, ConnectionConfig, FlatSettings, StructuredConfig};
pub use error::{AdminError, AdminResult, ErrorMetadata, LogLevel};
