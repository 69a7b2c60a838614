// forge-executor/src/lib.rs
// ============================================================================
// Crate: forge-executor
// Description: The procedure executor (C5): step-graph interpretation,
//              templating, log truncation, and the function registry
//              procedures invoke through.
// Dependencies: forge-core
// ============================================================================

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, missing_docs))]

//! ## Overview
//! A worker that pops a procedure Run off its queue drives it to completion
//! with [`ProcedureExecutor::execute`]. The step graph itself is loaded and
//! validated by [`forge_core::procedure`]; this crate only interprets an
//! already-valid [`forge_core::procedure::ProcedureDefinition`].

pub mod context;
pub mod executor;
pub mod ports;
pub mod registry;
pub mod result;
pub mod template;
pub mod truncate;

pub use context::ExecutionContext;
pub use executor::ExecutorError;
pub use executor::ProcedureExecutor;
pub use ports::ProcedureStore;
pub use registry::ExposureProfile;
pub use registry::FunctionMeta;
pub use registry::FunctionRegistry;
pub use registry::ProcedureFunction;
pub use result::FlowResult;
pub use result::FunctionResult;
pub use result::FunctionStatus;
pub use template::TemplateError;
pub use template::evaluate;
pub use template::is_condition_met;
pub use template::render;
pub use truncate::DEFAULT_MAX_LENGTH;
pub use truncate::truncate;
