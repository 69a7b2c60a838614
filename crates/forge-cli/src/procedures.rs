// forge-cli/src/procedures.rs
// ============================================================================
// Module: Procedure Cache
// Description: In-memory ProcedureStore/EventTriggerIndex backed by a
//              directory of YAML definition files, loaded once at startup.
// Purpose: forge-executor and forge-scheduler only define the trait
//          surfaces C5/C7 need against procedure storage; something has to
//          actually hold the definitions loaded from disk, and this is the
//          composition root's job, not a library concern.
// Dependencies: async-trait, forge-core, forge-executor, forge-scheduler,
//               serde, serde_yaml
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use forge_core::ids::OrganizationId;
use forge_core::interfaces::StoreError;
use forge_core::procedure::ProcedureDefinition;
use forge_core::procedure::Trigger;
use forge_core::procedure::TriggerType;
use forge_executor::ports::ProcedureStore;
use forge_scheduler::ports::EventMatch;
use forge_scheduler::ports::EventTriggerIndex;
use serde::Deserialize;

/// One procedure definition file on disk. [`ProcedureDefinition`] itself
/// carries no tenant — a definition is shared data loaded once, and the
/// file it comes from is what says which organization owns it.
#[derive(Debug, Clone, Deserialize)]
struct ProcedureFile {
    /// Owning tenant; not part of [`ProcedureDefinition`] itself.
    organization_id: OrganizationId,
    /// The definition proper, flattened into the same YAML document.
    #[serde(flatten)]
    definition: ProcedureDefinition,
}

/// Key a cached definition is addressed by.
type Key = (OrganizationId, String);

/// In-memory procedure definition store, loaded from a directory of YAML
/// files at startup and mutated only by trigger reconciliation afterward.
pub struct ProcedureCache {
    /// Loaded definitions, keyed by `(organization_id, slug)`.
    definitions: Mutex<BTreeMap<Key, ProcedureDefinition>>,
}

impl ProcedureCache {
    /// Builds an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self { definitions: Mutex::new(BTreeMap::new()) }
    }

    /// Loads every `*.yaml`/`*.yml` file in `dir` as a [`ProcedureFile`].
    /// A directory that does not exist yields an empty cache rather than
    /// an error, so deployments with no procedures configured yet don't
    /// have to create the directory first.
    ///
    /// # Errors
    ///
    /// Returns an error message when a file exists but is not valid YAML,
    /// or fails [`ProcedureDefinition::validate`].
    pub fn load_dir(dir: &Path) -> Result<Self, String> {
        let cache = Self::new();
        if !dir.is_dir() {
            return Ok(cache);
        }
        let entries = std::fs::read_dir(dir).map_err(|error| format!("reading {}: {error}", dir.display()))?;
        let mut definitions = cache.definitions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for entry in entries {
            let entry = entry.map_err(|error| format!("reading {}: {error}", dir.display()))?;
            let path = entry.path();
            let is_yaml = path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|error| format!("reading {}: {error}", path.display()))?;
            let file: ProcedureFile = serde_yaml::from_str(&content).map_err(|error| format!("parsing {}: {error}", path.display()))?;
            file.definition.validate().map_err(|error| format!("{}: {error}", path.display()))?;
            definitions.insert((file.organization_id, file.definition.slug.clone()), file.definition);
        }
        drop(definitions);
        Ok(cache)
    }
}

impl Default for ProcedureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcedureStore for ProcedureCache {
    async fn get_by_slug(&self, organization_id: OrganizationId, slug: &str) -> Result<ProcedureDefinition, StoreError> {
        let definitions = self.definitions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        definitions
            .get(&(organization_id, slug.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("procedure {slug:?}")))
    }

    async fn save_triggers(&self, organization_id: OrganizationId, slug: &str, triggers: Vec<Trigger>) -> Result<(), StoreError> {
        let mut definitions = self.definitions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(definition) = definitions.get_mut(&(organization_id, slug.to_string())) {
            definition.triggers = triggers;
        }
        Ok(())
    }
}

#[async_trait]
impl EventTriggerIndex for ProcedureCache {
    async fn find_by_event_name(&self, organization_id: OrganizationId, event_name: &str) -> Result<Vec<EventMatch>, StoreError> {
        let definitions = self.definitions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut matches = Vec::new();
        for ((org, _slug), definition) in definitions.iter() {
            if *org != organization_id {
                continue;
            }
            for trigger in &definition.triggers {
                if trigger.trigger_type == TriggerType::Event
                    && trigger.is_active
                    && trigger.event_name.as_deref() == Some(event_name)
                {
                    matches.push(EventMatch { slug: definition.slug.clone(), definition: definition.clone(), trigger_id: trigger.id });
                }
            }
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn missing_directory_loads_empty_cache() {
        let cache = ProcedureCache::load_dir(Path::new("/nonexistent/forge-procedures")).expect("empty cache");
        let definitions = cache.definitions.lock().expect("lock");
        assert!(definitions.is_empty());
    }

    #[test]
    fn loads_a_valid_definition_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let org = OrganizationId::new();
        let content = format!(
            "organization_id: {org}\nslug: nightly-report\nversion: 1\nsteps:\n  - name: step1\n    function: echo\n    params: {{}}\n"
        );
        let path = dir.path().join("nightly-report.yaml");
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(content.as_bytes()).expect("write file");

        let cache = ProcedureCache::load_dir(dir.path()).expect("load cache");
        let definitions = cache.definitions.lock().expect("lock");
        assert!(definitions.contains_key(&(org, "nightly-report".to_string())));
    }
}
