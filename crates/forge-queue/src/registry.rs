// forge-queue/src/registry.rs
// ============================================================================
// Module: Queue Registry
// Description: Code-defined queue identities with configuration-overridable
//              parameters (§4.11).
// Dependencies: none (pure domain data)
// ============================================================================

//! ## Overview
//! Queue *identity* and *capabilities* are fixed in code; only the
//! parameters (`max_concurrent`, `timeout_seconds`, `submission_interval`,
//! `duplicate_cooldown`, `enabled`) are overridable from configuration at
//! runtime (§4.11, §6.5).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// UI-facing metadata for a queue, not consulted by dispatch logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDisplay {
    /// Human-readable label.
    pub label: String,
    /// Icon identifier.
    pub icon: String,
    /// Hex color.
    pub color: String,
}

/// What operators are allowed to do to runs in this queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueCapabilities {
    /// Whether a queued run can be cancelled before it starts.
    pub can_cancel: bool,
    /// Whether a queued run's priority can be boosted.
    pub can_boost: bool,
    /// Whether a failed run in this queue can be retried.
    pub can_retry: bool,
}

/// Runtime-overridable parameters for a queue (§4.11, §6.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueParameters {
    /// Maximum runs in `{submitted, running}` simultaneously.
    pub max_concurrent: u32,
    /// Wall-clock budget before a running run is moved to `timed_out`.
    pub timeout_seconds: u64,
    /// Minimum interval between submitter ticks for this queue.
    pub submission_interval_seconds: u64,
    /// Minimum time between duplicate-suppressed resubmissions.
    pub duplicate_cooldown_seconds: u64,
    /// Whether the submitter considers this queue at all.
    pub enabled: bool,
}

/// One entry in the queue registry: fixed identity, fixed capabilities,
/// overridable parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueDefinition {
    /// Stable identifier, e.g. `"extraction"`, `"extraction_enhancement"`,
    /// `"maintenance"`.
    pub queue_type: String,
    /// Worker routing key.
    pub worker_queue: String,
    /// Display metadata.
    pub display: QueueDisplay,
    /// Operator capabilities.
    pub capabilities: QueueCapabilities,
    /// Current (possibly overridden) parameters.
    pub parameters: QueueParameters,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// The code-defined set of queues, with configuration overrides applied.
#[derive(Debug, Clone, Default)]
pub struct QueueRegistry {
    queues: BTreeMap<String, QueueDefinition>,
}

impl QueueRegistry {
    /// Builds the registry's fixed identities and capabilities. Parameters
    /// are the compiled-in defaults until [`QueueRegistry::apply_overrides`]
    /// is called with configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut queues = BTreeMap::new();
        queues.insert(
            "extraction".to_string(),
            QueueDefinition {
                queue_type: "extraction".to_string(),
                worker_queue: "forge.extraction".to_string(),
                display: QueueDisplay { label: "Extraction".into(), icon: "file-text".into(), color: "#2563eb".into() },
                capabilities: QueueCapabilities { can_cancel: true, can_boost: true, can_retry: true },
                parameters: QueueParameters {
                    max_concurrent: 10,
                    timeout_seconds: 600,
                    submission_interval_seconds: 5,
                    duplicate_cooldown_seconds: 0,
                    enabled: true,
                },
            },
        );
        queues.insert(
            "maintenance".to_string(),
            QueueDefinition {
                queue_type: "maintenance".to_string(),
                worker_queue: "forge.maintenance".to_string(),
                display: QueueDisplay { label: "Maintenance".into(), icon: "wrench".into(), color: "#6b7280".into() },
                capabilities: QueueCapabilities { can_cancel: true, can_boost: false, can_retry: true },
                parameters: QueueParameters {
                    max_concurrent: 3,
                    timeout_seconds: 1800,
                    submission_interval_seconds: 30,
                    duplicate_cooldown_seconds: 0,
                    enabled: true,
                },
            },
        );
        queues.insert(
            "crawl".to_string(),
            QueueDefinition {
                queue_type: "crawl".to_string(),
                worker_queue: "forge.crawl".to_string(),
                display: QueueDisplay { label: "Web crawl".into(), icon: "globe".into(), color: "#059669".into() },
                capabilities: QueueCapabilities { can_cancel: true, can_boost: false, can_retry: true },
                parameters: QueueParameters {
                    max_concurrent: 2,
                    timeout_seconds: 3600,
                    submission_interval_seconds: 30,
                    duplicate_cooldown_seconds: 0,
                    enabled: true,
                },
            },
        );
        queues.insert(
            "sharepoint_sync".to_string(),
            QueueDefinition {
                queue_type: "sharepoint_sync".to_string(),
                worker_queue: "forge.sharepoint_sync".to_string(),
                display: QueueDisplay { label: "SharePoint sync".into(), icon: "folder-sync".into(), color: "#0ea5e9".into() },
                capabilities: QueueCapabilities { can_cancel: true, can_boost: false, can_retry: true },
                parameters: QueueParameters {
                    max_concurrent: 2,
                    timeout_seconds: 3600,
                    submission_interval_seconds: 30,
                    duplicate_cooldown_seconds: 0,
                    enabled: true,
                },
            },
        );
        queues.insert(
            "sam_pull".to_string(),
            QueueDefinition {
                queue_type: "sam_pull".to_string(),
                worker_queue: "forge.sam_pull".to_string(),
                display: QueueDisplay { label: "SAM.gov pull".into(), icon: "landmark".into(), color: "#7c3aed".into() },
                capabilities: QueueCapabilities { can_cancel: true, can_boost: false, can_retry: true },
                parameters: QueueParameters {
                    max_concurrent: 1,
                    timeout_seconds: 7200,
                    submission_interval_seconds: 60,
                    duplicate_cooldown_seconds: 0,
                    enabled: true,
                },
            },
        );
        Self { queues }
    }

    /// Applies configuration overrides for parameters only; identities and
    /// capabilities stay code-defined.
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, QueueParameters>) {
        for (queue_type, parameters) in overrides {
            if let Some(queue) = self.queues.get_mut(queue_type) {
                queue.parameters = *parameters;
            }
        }
    }

    /// Looks up a queue by type.
    #[must_use]
    pub fn get(&self, queue_type: &str) -> Option<&QueueDefinition> {
        self.queues.get(queue_type)
    }

    /// Every enabled queue, for the submitter's sweep (§4.3).
    pub fn enabled_queues(&self) -> impl Iterator<Item = &QueueDefinition> {
        self.queues.values().filter(|queue| queue.parameters.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_extraction_and_maintenance() {
        let registry = QueueRegistry::with_defaults();
        assert!(registry.get("extraction").is_some());
        assert!(registry.get("maintenance").is_some());
    }

    #[test]
    fn override_changes_parameters_not_capabilities() {
        let mut registry = QueueRegistry::with_defaults();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "extraction".to_string(),
            QueueParameters {
                max_concurrent: 50,
                timeout_seconds: 600,
                submission_interval_seconds: 5,
                duplicate_cooldown_seconds: 0,
                enabled: true,
            },
        );
        registry.apply_overrides(&overrides);
        let queue = registry.get("extraction").unwrap();
        assert_eq!(queue.parameters.max_concurrent, 50);
        assert!(queue.capabilities.can_cancel);
    }

    #[test]
    fn disabled_queue_is_excluded_from_enabled_queues() {
        let mut registry = QueueRegistry::with_defaults();
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "maintenance".to_string(),
            QueueParameters {
                max_concurrent: 3,
                timeout_seconds: 1800,
                submission_interval_seconds: 30,
                duplicate_cooldown_seconds: 0,
                enabled: false,
            },
        );
        registry.apply_overrides(&overrides);
        let enabled: Vec<_> = registry.enabled_queues().map(|q| q.queue_type.as_str()).collect();
        assert_eq!(enabled, vec!["extraction"]);
    }
}
