// forge-core/src/ids.rs
// ============================================================================
// Module: Forge Identifiers
// Description: Canonical opaque identifiers for tenants, runs, and assets.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Identifiers are opaque UUID-backed wrappers. Every entity that crosses a
//! tenant boundary carries an [`OrganizationId`] so call sites cannot
//! accidentally pass a bare string where a scoped identifier is required.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Macro
// ============================================================================

/// Declares a UUID-backed newtype identifier with the common trait surface.
macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(OrganizationId, "Tenant (organization) identifier scoping every entity in the system.");
uuid_id!(RunId, "Identifier for a [`crate::run::Run`].");
uuid_id!(RunGroupId, "Identifier for a [`crate::run_group::RunGroup`].");
uuid_id!(AssetId, "Identifier for a [`crate::asset::Asset`].");
uuid_id!(ExtractionResultId, "Identifier for an [`crate::extraction::ExtractionResult`].");
uuid_id!(AssetMetadataId, "Identifier for an [`crate::metadata::AssetMetadata`].");
uuid_id!(UserId, "Identifier for the principal that created a resource.");
uuid_id!(ScrapeCollectionId, "Identifier for a [`crate::scrape::ScrapeCollection`].");
uuid_id!(ScrapeSourceId, "Identifier for a [`crate::scrape::ScrapeSource`].");
uuid_id!(ScrapedAssetId, "Identifier for a [`crate::scrape::ScrapedAsset`].");
uuid_id!(SharePointSyncConfigId, "Identifier for a [`crate::sharepoint::SharePointSyncConfig`].");
uuid_id!(TriggerId, "Identifier for a [`crate::procedure::Trigger`].");
uuid_id!(SolicitationId, "Identifier for a [`crate::sam::Solicitation`].");
uuid_id!(NoticeId, "Identifier for a [`crate::sam::Notice`].");

/// Trace identifier. Unlike the other identifiers, a trace shares its wire
/// form with the [`RunId`] of the trace's root run (see §4.1 trace
/// propagation), so it is kept as a thin alias rather than a distinct type.
pub type TraceId = RunId;
