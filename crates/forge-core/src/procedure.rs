// forge-core/src/procedure.rs
// ============================================================================
// Module: Procedure Definition
// Description: Declarative step-graph workflow definitions and their
//              attached triggers.
// Purpose: Model what the definition loader parses and what the executor
//          (forge-executor) walks, without embedding any execution logic
//          here.
// Dependencies: chrono, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ProcedureDefinition`] is pure data: a DAG of named [`Step`]s, each
//! invoking a `function` id with templated `params`. [`Step::branches`]
//! carries nested step lists for the four flow-control functions
//! (`if_branch`, `switch_branch`, `parallel`, `foreach`); validating that
//! shape is [`ProcedureDefinition::validate`]'s job so the executor can
//! assume a well-formed graph.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use crate::error::DomainError;
use crate::ids::TriggerId;

// ============================================================================
// SECTION: Error Policy
// ============================================================================

/// What a step or procedure does when a failure occurs within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Stop the containing scope.
    Fail,
    /// Record the failure and keep going.
    Continue,
}

impl Default for OnError {
    fn default() -> Self {
        Self::Fail
    }
}

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// A declared procedure parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name, referenced in templates as `params.<name>`.
    pub name: String,
    /// Whether execution must fail if this parameter is not supplied.
    pub required: bool,
    /// Default value applied when the caller omits this parameter.
    pub default: Option<Json>,
}

// ============================================================================
// SECTION: Steps
// ============================================================================

/// Flow-control function identifiers that carry `branches` rather than a
/// flat `params` invocation (§4.5).
pub const FLOW_CONTROL_FUNCTIONS: [&str; 4] = ["if_branch", "switch_branch", "parallel", "foreach"];

/// A single node in a procedure's step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Name, unique within its containing scope.
    pub name: String,
    /// Registered function id to invoke.
    pub function: String,
    /// Invocation parameters; string values may embed `{{expr}}` templates.
    #[serde(default)]
    pub params: Json,
    /// Optional guard; missing is treated as true.
    pub condition: Option<String>,
    /// Failure policy for this step.
    #[serde(default)]
    pub on_error: OnError,
    /// Named nested step lists, used by the four flow-control functions.
    #[serde(default)]
    pub branches: BTreeMap<String, Vec<Step>>,
    /// Legacy single-step `foreach` form: iterate `items_expr`, running
    /// `branches.each` once per item.
    #[serde(default)]
    pub foreach: Option<ForeachSpec>,
}

/// Legacy single-step `foreach` configuration (§4.5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeachSpec {
    /// Template expression yielding the items to iterate.
    pub items_expr: String,
    /// Concurrency for item execution; defaults to 1 (sequential).
    #[serde(default = "ForeachSpec::default_concurrency")]
    pub concurrency: u32,
    /// Optional per-item guard.
    pub condition: Option<String>,
}

impl ForeachSpec {
    /// Default concurrency when unspecified: sequential iteration.
    const fn default_concurrency() -> u32 {
        1
    }
}

impl Step {
    /// Whether this step's `function` is one of the four flow-control
    /// primitives.
    #[must_use]
    pub fn is_flow_control(&self) -> bool {
        FLOW_CONTROL_FUNCTIONS.contains(&self.function.as_str())
    }

    /// Validates this step's branch shape against §4.5's per-function
    /// rules, recursing into nested branches. `scope` names the
    /// containing scope for duplicate-name error messages.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] when a flow-control step's branches don't
    /// satisfy its shape rule, or a nested scope has a duplicate step
    /// name.
    pub fn validate(&self, scope: &str) -> Result<(), DomainError> {
        match self.function.as_str() {
            "if_branch" => {
                let then_branch = self.branches.get("then");
                if then_branch.is_none_or(Vec::is_empty) {
                    return Err(DomainError::InvalidProcedure(format!(
                        "step {:?}: if_branch requires a non-empty 'then' branch",
                        self.name
                    )));
                }
            }
            "switch_branch" => {
                let non_default = self.branches.keys().filter(|key| *key != "default").count();
                if non_default == 0 {
                    return Err(DomainError::InvalidProcedure(format!(
                        "step {:?}: switch_branch requires at least one non-default case",
                        self.name
                    )));
                }
                if self.branches.values().any(Vec::is_empty) {
                    return Err(DomainError::InvalidProcedure(format!(
                        "step {:?}: switch_branch cases must be non-empty",
                        self.name
                    )));
                }
            }
            "parallel" => {
                if self.branches.len() < 2 || self.branches.values().any(Vec::is_empty) {
                    return Err(DomainError::InvalidProcedure(format!(
                        "step {:?}: parallel requires at least 2 non-empty branches",
                        self.name
                    )));
                }
            }
            "foreach" => {
                if self.branches.get("each").is_none_or(Vec::is_empty) {
                    return Err(DomainError::InvalidProcedure(format!(
                        "step {:?}: foreach requires a non-empty 'each' branch",
                        self.name
                    )));
                }
            }
            _ => {}
        }
        for (branch_name, steps) in &self.branches {
            let branch_scope = format!("{scope}/{}:{branch_name}", self.name);
            validate_unique_names(steps, &branch_scope)?;
            for step in steps {
                step.validate(&branch_scope)?;
            }
        }
        Ok(())
    }
}

/// Checks that every step name in `steps` is unique within `scope`.
fn validate_unique_names(steps: &[Step], scope: &str) -> Result<(), DomainError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(DomainError::DuplicateStepName {
                name: step.name.clone(),
                scope: scope.to_string(),
            });
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Procedure Definition
// ============================================================================

/// A declarative workflow definition (§3 Procedure definition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureDefinition {
    /// Unique slug per organization.
    pub slug: String,
    /// Monotonically increasing version.
    pub version: u32,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Root-scope steps, executed in order.
    pub steps: Vec<Step>,
    /// Attached triggers.
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// Failure policy at the procedure level.
    #[serde(default)]
    pub on_error: OnError,
}

impl ProcedureDefinition {
    /// Validates root-scope step name uniqueness and recurses into every
    /// step's branch shape (§3 load-time invariants, §4.5 Validation).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError`] on the first structural violation found.
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_unique_names(&self.steps, "root")?;
        for step in &self.steps {
            step.validate("root")?;
        }
        Ok(())
    }

    /// Looks up a declared parameter by name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Applies declared defaults and checks `required` parameters against
    /// a caller-supplied argument map, returning the effective parameter
    /// map. Unexpected extra keys in `supplied` pass through unchanged
    /// (§4.5 Parameter validation forward-compatibility rule).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::MissingRequiredParameter`] for the first
    /// required parameter with neither a supplied value nor a default.
    pub fn resolve_parameters(&self, supplied: &Json) -> Result<Json, DomainError> {
        let mut effective = supplied.as_object().cloned().unwrap_or_default();
        for param in &self.parameters {
            if effective.contains_key(&param.name) {
                continue;
            }
            if let Some(default) = &param.default {
                effective.insert(param.name.clone(), default.clone());
            } else if param.required {
                return Err(DomainError::MissingRequiredParameter(param.name.clone()));
            }
        }
        Ok(Json::Object(effective))
    }
}

// ============================================================================
// SECTION: Trigger
// ============================================================================

/// How a [`Trigger`] is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Fires on a cron schedule.
    Cron,
    /// Fires when a matching event is emitted (§4.7).
    Event,
    /// Fires on an inbound webhook call.
    Webhook,
    /// Fires only when explicitly invoked.
    Manual,
}

/// Attached to procedures/pipelines (§3 Trigger).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Primary identifier.
    pub id: TriggerId,
    /// Arming mechanism.
    pub trigger_type: TriggerType,
    /// Cron schedule, required when `trigger_type == Cron`.
    pub cron_expression: Option<String>,
    /// Event name to match, required when `trigger_type == Event`.
    pub event_name: Option<String>,
    /// Optional filter DSL payload (§4.7).
    pub event_filter: Option<Json>,
    /// Whether this trigger currently fires.
    pub is_active: bool,
    /// Last time this trigger fired.
    pub last_triggered_at: Option<DateTime<Utc>>,
    /// Next scheduled fire time, for cron triggers.
    pub next_trigger_at: Option<DateTime<Utc>>,
    /// Cumulative fire count.
    pub trigger_count: u64,
}

impl Trigger {
    /// Records a firing: bumps `trigger_count` and `last_triggered_at`.
    /// `next` is the caller-recomputed next fire time (for cron triggers),
    /// or `None` to leave it unchanged (§4.5 Trigger reconciliation).
    pub fn record_fired(&mut self, now: DateTime<Utc>, next: Option<DateTime<Utc>>) {
        self.last_triggered_at = Some(now);
        self.trigger_count += 1;
        if let Some(next) = next {
            self.next_trigger_at = Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> Step {
        Step {
            name: name.to_string(),
            function: "noop".to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches: BTreeMap::new(),
            foreach: None,
        }
    }

    #[test]
    fn if_branch_requires_non_empty_then() {
        let step = Step {
            name: "check".to_string(),
            function: "if_branch".to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches: BTreeMap::new(),
            foreach: None,
        };
        assert!(step.validate("root").is_err());
    }

    #[test]
    fn if_branch_with_then_is_valid() {
        let mut branches = BTreeMap::new();
        branches.insert("then".to_string(), vec![leaf("a")]);
        let step = Step {
            name: "check".to_string(),
            function: "if_branch".to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches,
            foreach: None,
        };
        assert!(step.validate("root").is_ok());
    }

    #[test]
    fn parallel_requires_at_least_two_branches() {
        let mut branches = BTreeMap::new();
        branches.insert("a".to_string(), vec![leaf("x")]);
        let step = Step {
            name: "fanout".to_string(),
            function: "parallel".to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches,
            foreach: None,
        };
        assert!(step.validate("root").is_err());
    }

    #[test]
    fn switch_branch_requires_non_default_case() {
        let mut branches = BTreeMap::new();
        branches.insert("default".to_string(), vec![leaf("x")]);
        let step = Step {
            name: "route".to_string(),
            function: "switch_branch".to_string(),
            params: serde_json::json!({}),
            condition: None,
            on_error: OnError::Fail,
            branches,
            foreach: None,
        };
        assert!(step.validate("root").is_err());
    }

    #[test]
    fn duplicate_step_names_in_scope_are_rejected() {
        let definition = ProcedureDefinition {
            slug: "dup".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![leaf("a"), leaf("a")],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        assert!(definition.validate().is_err());
    }

    #[test]
    fn missing_required_parameter_without_default_errors() {
        let definition = ProcedureDefinition {
            slug: "needs-x".to_string(),
            version: 1,
            parameters: vec![Parameter {
                name: "x".to_string(),
                required: true,
                default: None,
            }],
            steps: vec![],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let err = definition.resolve_parameters(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, DomainError::MissingRequiredParameter(name) if name == "x"));
    }

    #[test]
    fn default_fills_in_missing_parameter() {
        let definition = ProcedureDefinition {
            slug: "has-default".to_string(),
            version: 1,
            parameters: vec![Parameter {
                name: "x".to_string(),
                required: true,
                default: Some(serde_json::json!(42)),
            }],
            steps: vec![],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let resolved = definition.resolve_parameters(&serde_json::json!({})).unwrap();
        assert_eq!(resolved.get("x"), Some(&serde_json::json!(42)));
    }

    #[test]
    fn extra_unexpected_parameters_pass_through() {
        let definition = ProcedureDefinition {
            slug: "no-params".to_string(),
            version: 1,
            parameters: vec![],
            steps: vec![],
            triggers: vec![],
            on_error: OnError::Fail,
        };
        let resolved = definition
            .resolve_parameters(&serde_json::json!({"extra": true}))
            .unwrap();
        assert_eq!(resolved.get("extra"), Some(&serde_json::json!(true)));
    }
}
