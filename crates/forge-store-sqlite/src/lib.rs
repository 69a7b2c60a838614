// forge-store-sqlite/src/lib.rs
// ============================================================================
// Crate: forge-store-sqlite
// Description: SQLite-backed RunStore/RunGroupStore implementation.
// ============================================================================

#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "test assertions favor directness over production error discipline"
    )
)]

pub mod error;
mod ingest_store;
mod queries;
pub mod schema;
pub mod store;

pub use error::SqliteStoreError;
pub use schema::SCHEMA_VERSION;
pub use schema::initialize_schema;
pub use store::SqliteStore;
pub use store::SqliteStoreConfig;
