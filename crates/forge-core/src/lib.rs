#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only assertions are permitted to unwrap and panic."
    )
)]
// forge-core/src/lib.rs
// ============================================================================
// Module: Forge Core
// Description: Canonical execution records and tenant-scoped domain types.
// Purpose: Provide stable, serializable types shared by every Forge crate.
// Dependencies: chrono, serde, serde_json, sha2, thiserror, uuid
// ============================================================================

//! ## Overview
//! Forge core defines the universal [`run::Run`] execution record, the
//! [`run_group::RunGroup`] fan-out tracker, the asset/extraction/metadata
//! model, the declarative procedure definition types, and the
//! backend-agnostic interfaces ([`interfaces`]) every other Forge crate
//! programs against. Nothing in this crate performs I/O.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod asset;
pub mod error;
pub mod extraction;
pub mod hashing;
pub mod ids;
pub mod interfaces;
pub mod metadata;
pub mod procedure;
pub mod run;
pub mod run_group;
pub mod sam;
pub mod scheduled_task;
pub mod scrape;
pub mod sharepoint;
pub mod value;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use asset::Asset;
pub use asset::AssetStatus;
pub use asset::AssetVersion;
pub use asset::ExtractionTier;
pub use asset::SourceType;
pub use error::TenantScoped;
pub use extraction::ExtractionResult;
pub use extraction::ExtractionStatus;
pub use ids::AssetId;
pub use ids::ExtractionResultId;
pub use ids::OrganizationId;
pub use ids::RunGroupId;
pub use ids::RunId;
pub use ids::TraceId;
pub use ids::UserId;
pub use metadata::AssetMetadata;
pub use metadata::MetadataStatus;
pub use run::LogLevel;
pub use run::Progress;
pub use run::Run;
pub use run::RunEventType;
pub use run::RunLogEvent;
pub use run::RunOrigin;
pub use run::RunStatus;
pub use run::RunType;
pub use run::TransitionError;
pub use run_group::GroupCompletion;
pub use run_group::GroupStatus;
pub use run_group::RunGroup;
