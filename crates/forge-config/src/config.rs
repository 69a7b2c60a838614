// forge-config/src/config.rs
// ============================================================================
// Module: Configuration Model
// Description: The single YAML configuration document (§6.5): LLM task
//              table, extraction engine registry, queue parameter
//              overrides, optional SharePoint defaults, storage locations,
//              and the search-index toggle.
// Dependencies: forge-queue, serde, serde_yaml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a single YAML file. Missing or invalid
//! configuration fails closed: [`Config::load`] parses, then layers
//! environment-variable overrides for secrets and URLs on top (environment
//! always wins), then validates the result before returning it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use forge_queue::QueueParameters;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ConfigError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is given.
const DEFAULT_CONFIG_NAME: &str = "forge.yaml";
/// Environment variable overriding the config file path.
pub const CONFIG_ENV_VAR: &str = "FORGE_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// ============================================================================
// SECTION: Top-Level Config
// ============================================================================

/// The root configuration document (§6.5).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// LLM task table and connection settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Ordered extraction engines, exactly one marked `default`.
    #[serde(default)]
    pub extraction_engines: Vec<ExtractionEngineConfig>,
    /// Per-queue parameter overrides, keyed by `queue_type`.
    #[serde(default)]
    pub queues: BTreeMap<String, QueueParameters>,
    /// Optional SharePoint sync defaults applied to new sync configs.
    #[serde(default)]
    pub sharepoint: Option<SharePointDefaultsConfig>,
    /// Object-store bucket and base-directory settings.
    pub storage: StorageConfig,
    /// Search-index toggle.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Loads configuration from disk, applies environment overrides, and
    /// validates the result.
    ///
    /// Resolution order for the file path: `path`, then the
    /// [`CONFIG_ENV_VAR`] environment variable, then [`DEFAULT_CONFIG_NAME`]
    /// in the current directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, is not valid
    /// YAML, or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path);
        let metadata = fs::metadata(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = fs::read_to_string(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        let mut config: Self = serde_yaml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `FORGE_<SECTION>_<KEY>`-named environment variable overrides
    /// for secrets and URLs, read after the YAML file so environment always
    /// wins (§6.5, §C).
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies overrides from an arbitrary key lookup. Factored out from
    /// [`Config::apply_env_overrides`] so the override wiring is testable
    /// without touching real process environment variables.
    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("FORGE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = lookup("FORGE_LLM_API_KEY") {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = lookup("FORGE_SEARCH_BASE_URL") {
            self.search.base_url = Some(value);
        }
        if let Some(value) = lookup("FORGE_STORAGE_BASE_DIR") {
            self.storage.object_store_base_dir = value;
        }
        if let Some(sharepoint) = &mut self.sharepoint {
            if let Some(value) = lookup("FORGE_SHAREPOINT_SITE_ID") {
                sharepoint.site_id = value;
            }
            if let Some(value) = lookup("FORGE_SHAREPOINT_DRIVE_ID") {
                sharepoint.drive_id = value;
            }
        }
        for engine in &mut self.extraction_engines {
            let var_name = format!("FORGE_EXTRACTION_ENGINE_{}_BASE_URL", shout_case(&engine.name));
            if let Some(value) = lookup(&var_name) {
                engine.base_url = value;
            }
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.validate()?;
        if self.extraction_engines.is_empty() {
            return Err(ConfigError::Invalid("extraction_engines must have at least one entry".to_string()));
        }
        let default_count = self.extraction_engines.iter().filter(|engine| engine.default).count();
        if default_count != 1 {
            return Err(ConfigError::Invalid(format!(
                "extraction_engines must mark exactly one entry as default, found {default_count}"
            )));
        }
        for engine in &self.extraction_engines {
            engine.validate()?;
        }
        if let Some(sharepoint) = &self.sharepoint {
            sharepoint.validate()?;
        }
        self.storage.validate()?;
        self.search.validate()?;
        Ok(())
    }

    /// Returns the extraction engine marked `default`, if one is present.
    /// A [`Config`] that has passed [`Config::validate`] always has exactly
    /// one.
    #[must_use]
    pub fn default_extraction_engine(&self) -> Option<&ExtractionEngineConfig> {
        self.extraction_engines.iter().find(|engine| engine.default)
    }
}

/// Resolves the config file path: explicit argument, then `FORGE_CONFIG`,
/// then the default filename.
fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(from_env) = env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(from_env);
    }
    PathBuf::from(DEFAULT_CONFIG_NAME)
}

/// Uppercases alphanumerics and replaces everything else with `_`, the
/// naming convention per-engine environment overrides use.
fn shout_case(name: &str) -> String {
    name.chars().map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_uppercase() } else { '_' }).collect()
}

// ============================================================================
// SECTION: LLM Task Table
// ============================================================================

/// LLM connection settings and per-task model selection (§6.5).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmConfig {
    /// Base URL of the chat-completions endpoint.
    #[serde(default)]
    pub base_url: String,
    /// Optional bearer token, normally supplied via `FORGE_LLM_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model and temperature per task type (e.g. `summarization`,
    /// `metadata_extraction`).
    #[serde(default)]
    pub tasks: BTreeMap<String, LlmTaskConfig>,
}

impl LlmConfig {
    /// Validates LLM configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.tasks.is_empty() && self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.base_url is required when llm.tasks is non-empty".to_string()));
        }
        for (task, settings) in &self.tasks {
            settings.validate(task)?;
        }
        Ok(())
    }

    /// Looks up the configured model/temperature for a task type.
    #[must_use]
    pub fn task(&self, task_type: &str) -> Option<&LlmTaskConfig> {
        self.tasks.get(task_type)
    }
}

/// Model and sampling settings for one LLM task type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmTaskConfig {
    /// Model identifier as understood by the configured endpoint.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl LlmTaskConfig {
    fn validate(&self, task_type: &str) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("llm.tasks.{task_type}.model must be non-empty")));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!("llm.tasks.{task_type}.temperature must be between 0.0 and 2.0")));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Extraction Engines
// ============================================================================

/// One configured extraction engine entry (§6.5, §4.4 step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionEngineConfig {
    /// Stable engine identifier, matches `ExtractorClient::engine_name`.
    pub name: String,
    /// Base URL of the engine's HTTP endpoint.
    pub base_url: String,
    /// Per-call timeout.
    pub timeout_seconds: u64,
    /// File extensions this engine accepts, lowercase, without the dot.
    pub formats: Vec<String>,
    /// Whether this is the registry's fallback-of-last-resort engine.
    #[serde(default)]
    pub default: bool,
}

impl ExtractionEngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("extraction_engines[].name must be non-empty".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("extraction_engines.{}.base_url must be non-empty", self.name)));
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::Invalid(format!("extraction_engines.{}.timeout_seconds must be > 0", self.name)));
        }
        if self.formats.is_empty() {
            return Err(ConfigError::Invalid(format!("extraction_engines.{}.formats must be non-empty", self.name)));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: SharePoint Defaults
// ============================================================================

/// Default SharePoint sync settings applied when a tenant creates a new
/// sync config without overriding them (§4.9).
#[derive(Debug, Clone, Deserialize)]
pub struct SharePointDefaultsConfig {
    /// Default Microsoft Graph site id.
    pub site_id: String,
    /// Default Microsoft Graph drive id.
    pub drive_id: String,
    /// Default recursive-descent setting.
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Default maximum synced file size.
    #[serde(default)]
    pub max_file_size_bytes: Option<u64>,
    /// Default include-path glob patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,
    /// Default exclude-path glob patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl SharePointDefaultsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.site_id.trim().is_empty() {
            return Err(ConfigError::Invalid("sharepoint.site_id must be non-empty".to_string()));
        }
        if self.drive_id.trim().is_empty() {
            return Err(ConfigError::Invalid("sharepoint.drive_id must be non-empty".to_string()));
        }
        Ok(())
    }
}

const fn default_true() -> bool {
    true
}

// ============================================================================
// SECTION: Storage
// ============================================================================

/// Object-store bucket names and the filesystem base directory backing them
/// (§6.3, `forge-objectstore`).
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket name for raw uploaded/downloaded content.
    #[serde(default = "default_raw_bucket")]
    pub raw_bucket: String,
    /// Bucket name for processed markdown.
    #[serde(default = "default_processed_bucket")]
    pub processed_bucket: String,
    /// Base directory the filesystem object store resolves bucket/key pairs
    /// against.
    pub object_store_base_dir: String,
}

impl StorageConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.raw_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.raw_bucket must be non-empty".to_string()));
        }
        if self.processed_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.processed_bucket must be non-empty".to_string()));
        }
        if self.object_store_base_dir.trim().is_empty() {
            return Err(ConfigError::Invalid("storage.object_store_base_dir must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// Default `storage.raw_bucket`, reusing `forge-queue`'s own constant.
fn default_raw_bucket() -> String {
    forge_queue::RAW_BUCKET.to_string()
}

/// Default `storage.processed_bucket`, reusing `forge-queue`'s own
/// constant.
fn default_processed_bucket() -> String {
    forge_queue::PROCESSED_BUCKET.to_string()
}

// ============================================================================
// SECTION: Search
// ============================================================================

/// Search-index toggle (§6.5: "search toggle").
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchConfig {
    /// Whether search indexing is enabled. When `false`, the composition
    /// root wires a no-op [`forge_providers::NullSearchIndexClient`]
    /// instead of an HTTP-backed one.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the search-index service, required when `enabled`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl SearchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.base_url.as_deref().unwrap_or_default().trim().is_empty() {
            return Err(ConfigError::Invalid("search.base_url is required when search.enabled is true".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL_YAML: &str = r"
extraction_engines:
  - name: primary
    base_url: http://extractor.local
    timeout_seconds: 30
    formats: [pdf, docx]
    default: true
storage:
  object_store_base_dir: /var/forge/objects
";

    #[test]
    fn minimal_config_parses_and_validates() {
        let config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.storage.raw_bucket, forge_queue::RAW_BUCKET);
        assert_eq!(config.default_extraction_engine().map(|engine| engine.name.as_str()), Some("primary"));
    }

    #[test]
    fn missing_default_engine_fails_validation() {
        let yaml = r"
extraction_engines:
  - name: primary
    base_url: http://extractor.local
    timeout_seconds: 30
    formats: [pdf]
storage:
  object_store_base_dir: /var/forge/objects
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn two_default_engines_fails_validation() {
        let yaml = r"
extraction_engines:
  - name: primary
    base_url: http://a.local
    timeout_seconds: 30
    formats: [pdf]
    default: true
  - name: secondary
    base_url: http://b.local
    timeout_seconds: 30
    formats: [docx]
    default: true
storage:
  object_store_base_dir: /var/forge/objects
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn search_enabled_without_base_url_fails_validation() {
        let mut config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.search = SearchConfig { enabled: true, base_url: None };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let mut config: Config = serde_yaml::from_str(MINIMAL_YAML).unwrap();
        config.apply_overrides_from(|key| {
            (key == "FORGE_LLM_BASE_URL").then(|| "http://overridden.local".to_string())
        });
        assert_eq!(config.llm.base_url, "http://overridden.local");
    }

    #[test]
    fn load_rejects_file_over_size_limit() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let oversized = "a".repeat(usize::try_from(MAX_CONFIG_FILE_SIZE).unwrap() + 1);
        file.write_all(oversized.as_bytes()).unwrap();
        let error = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn shout_case_uppercases_and_replaces_non_alphanumeric() {
        assert_eq!(shout_case("doc-intel"), "DOC_INTEL");
    }
}
