// forge-config/src/error.rs
// ============================================================================
// Module: Config Error
// Description: Error type for configuration loading and validation.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors raised loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// The configuration file is not valid YAML.
    #[error("config parse error: {0}")]
    Parse(String),
    /// The configuration parsed but failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
