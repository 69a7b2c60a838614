// forge-server/src/lib.rs
// ============================================================================
// Crate: forge-server
// Description: The HTTP API surface (§6.1) — runs, assets, bulk upload,
//              scheduled tasks, and queue administration over axum.
// Dependencies: axum, forge-core, forge-ingest, forge-queue, forge-scheduler,
//               tokio, tower-http, tracing
// ============================================================================

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, missing_docs))]

//! ## Overview
//! Every route resolves a [`tenant::TenantContext`] before touching a
//! store (document-scoped paths never see another tenant's rows), and
//! every handler returns `Result<_, error::ApiError>` so the §7 error
//! taxonomy is enforced in one place rather than re-derived per handler.
//! [`state::AppState`] is the composition root `forge-cli` wires at
//! startup; [`router::build_router`] turns it into a servable [`axum::Router`].

pub mod error;
pub mod ports;
pub mod router;
pub mod routes;
pub mod state;
pub mod tenant;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
pub use tenant::TenantContext;
pub use tenant::ORGANIZATION_HEADER;

/// Binds `router` to `addr` and serves it until the process receives a
/// shutdown signal, the same `tokio::net::TcpListener::bind` plus
/// `axum::serve` shape `decision-gate-mcp::server::serve_http` uses for its
/// own non-TLS path.
///
/// # Errors
///
/// Returns an I/O error when the address cannot be bound or the listener
/// fails.
pub async fn serve(router: axum::Router, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "forge-server listening");
    axum::serve(listener, router.into_make_service()).await
}
