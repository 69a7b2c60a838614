// forge-cli/src/error.rs
// ============================================================================
// Module: CLI Error
// Description: The top-level error type `main` reports on exit.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Any failure that can stop the CLI before it starts serving.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] forge_config::ConfigError),
    /// A persistence backend could not be opened.
    #[error("store error: {0}")]
    Store(#[from] forge_store_sqlite::SqliteStoreError),
    /// The object store root could not be created.
    #[error("object store error: {0}")]
    ObjectStore(#[from] forge_core::interfaces::ObjectStoreError),
    /// A provider client could not be constructed.
    #[error("provider error: {0}")]
    Provider(#[from] forge_providers::ProviderError),
    /// Procedure definitions could not be loaded from disk.
    #[error("procedure definitions error: {0}")]
    Procedures(String),
    /// A required environment variable was missing.
    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),
    /// The HTTP server failed to bind or serve.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Result type every fallible CLI operation returns.
pub type CliResult<T> = Result<T, CliError>;
