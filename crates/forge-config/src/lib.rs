// forge-config/src/lib.rs
// ============================================================================
// Crate: forge-config
// Description: Canonical YAML configuration model, loading, and validation
//              (§6.5).
// Dependencies: forge-queue, serde, serde_yaml
// ============================================================================

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, missing_docs))]

//! ## Overview
//! `forge-config` is the single source of truth for `forge.yaml` semantics:
//! the LLM task table, the ordered extraction engine registry, per-queue
//! parameter overrides consumed by `forge_queue::QueueRegistry`, optional
//! SharePoint sync defaults, object-store locations, and the search-index
//! toggle. Loading fails closed — a malformed or inconsistent file is a
//! startup error, not a best-effort default.

pub mod config;
pub mod error;

pub use config::Config;
pub use config::ExtractionEngineConfig;
pub use config::LlmConfig;
pub use config::LlmTaskConfig;
pub use config::SearchConfig;
pub use config::SharePointDefaultsConfig;
pub use config::StorageConfig;
pub use config::CONFIG_ENV_VAR;
pub use error::ConfigError;
