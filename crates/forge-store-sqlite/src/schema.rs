// forge-store-sqlite/src/schema.rs
// ============================================================================
// Module: Schema
// Description: SQLite DDL and connection initialization.
// Purpose: Own table/index creation so every store module shares one
//          consistent on-disk shape.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! `initialize_schema` is idempotent: it is safe to call on every process
//! start. Unique indices here are the ones named explicitly in §6.2:
//! `(raw_bucket, raw_object_key)`, `(asset_id, version_number)`,
//! `(sync_config_id, sharepoint_item_id)`, `(collection_id, normalized_url)`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;

/// Current schema version. Bump and add a migration branch in
/// [`initialize_schema`] when the DDL changes.
pub const SCHEMA_VERSION: i64 = 1;

/// Creates every table and index if missing, and sets the WAL/foreign-key
/// pragmas this store relies on.
///
/// # Errors
///
/// Returns [`rusqlite::Error`] when any DDL statement fails.
pub fn initialize_schema(connection: &Connection) -> rusqlite::Result<()> {
    connection.pragma_update(None, "journal_mode", "wal")?;
    connection.pragma_update(None, "foreign_keys", true)?;
    connection.pragma_update(None, "busy_timeout", 5_000)?;

    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id                  TEXT PRIMARY KEY,
            organization_id     TEXT NOT NULL,
            run_type            TEXT NOT NULL,
            origin              TEXT NOT NULL,
            status              TEXT NOT NULL,
            config              TEXT NOT NULL,
            input_asset_ids     TEXT NOT NULL,
            progress_current    INTEGER,
            progress_total      INTEGER,
            progress_percent    INTEGER,
            progress_unit       TEXT,
            results_summary     TEXT,
            error_message       TEXT,
            created_at          TEXT NOT NULL,
            started_at          TEXT,
            completed_at        TEXT,
            created_by          TEXT,
            group_id            TEXT,
            is_group_parent     INTEGER NOT NULL DEFAULT 0,
            trace_id            TEXT,
            procedure_slug      TEXT,
            procedure_version   INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_runs_org_status ON runs (organization_id, status);
        CREATE INDEX IF NOT EXISTS idx_runs_org_type ON runs (organization_id, run_type);
        CREATE INDEX IF NOT EXISTS idx_runs_group ON runs (group_id);

        CREATE TABLE IF NOT EXISTS run_log_events (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id      TEXT NOT NULL,
            level       TEXT NOT NULL,
            event_type  TEXT NOT NULL,
            message     TEXT NOT NULL,
            context     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_run_log_events_run ON run_log_events (run_id, seq);

        CREATE TABLE IF NOT EXISTS run_groups (
            id                  TEXT PRIMARY KEY,
            organization_id     TEXT NOT NULL,
            group_type          TEXT NOT NULL,
            parent_run_id       TEXT,
            status              TEXT NOT NULL,
            total_children      INTEGER NOT NULL,
            completed_children  INTEGER NOT NULL,
            failed_children     INTEGER NOT NULL,
            config              TEXT NOT NULL,
            results_summary     TEXT,
            started_at          TEXT NOT NULL,
            completed_at        TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_run_groups_org ON run_groups (organization_id);

        CREATE TABLE IF NOT EXISTS assets (
            id                      TEXT PRIMARY KEY,
            organization_id         TEXT NOT NULL,
            source_type             TEXT NOT NULL,
            source_metadata         TEXT NOT NULL,
            original_filename       TEXT NOT NULL,
            content_type            TEXT NOT NULL,
            file_size               INTEGER NOT NULL,
            file_hash                TEXT NOT NULL,
            raw_bucket              TEXT NOT NULL,
            raw_object_key          TEXT NOT NULL,
            status                  TEXT NOT NULL,
            current_version_number  INTEGER NOT NULL,
            extraction_tier         TEXT NOT NULL,
            enhancement_eligible    INTEGER NOT NULL,
            enhancement_queued_at   TEXT,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL,
            created_by              TEXT
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_assets_bucket_key
            ON assets (raw_bucket, raw_object_key) WHERE status != 'deleted';
        CREATE INDEX IF NOT EXISTS idx_assets_org_hash ON assets (organization_id, file_hash);

        CREATE TABLE IF NOT EXISTS asset_versions (
            asset_id        TEXT NOT NULL,
            version_number  INTEGER NOT NULL,
            raw_bucket      TEXT NOT NULL,
            raw_object_key  TEXT NOT NULL,
            file_size       INTEGER NOT NULL,
            file_hash        TEXT NOT NULL,
            content_type    TEXT NOT NULL,
            is_current      INTEGER NOT NULL,
            created_at      TEXT NOT NULL,
            created_by      TEXT,
            PRIMARY KEY (asset_id, version_number)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_asset_versions_current
            ON asset_versions (asset_id) WHERE is_current = 1;

        CREATE TABLE IF NOT EXISTS extraction_results (
            id                      TEXT PRIMARY KEY,
            asset_id                TEXT NOT NULL,
            asset_version_id        TEXT,
            run_id                  TEXT NOT NULL,
            extractor_version       TEXT NOT NULL,
            status                  TEXT NOT NULL,
            extracted_bucket        TEXT,
            extracted_object_key    TEXT,
            structure_metadata      TEXT NOT NULL,
            warnings                TEXT NOT NULL,
            errors                  TEXT NOT NULL,
            extraction_time_seconds REAL,
            extraction_tier         TEXT NOT NULL,
            created_at              TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_extraction_results_asset ON extraction_results (asset_id);
        CREATE INDEX IF NOT EXISTS idx_extraction_results_run ON extraction_results (run_id);

        CREATE TABLE IF NOT EXISTS asset_metadata (
            id                  TEXT PRIMARY KEY,
            asset_id            TEXT NOT NULL,
            metadata_type       TEXT NOT NULL,
            schema_version      INTEGER NOT NULL,
            metadata_content    TEXT NOT NULL,
            producer_run_id     TEXT,
            is_canonical        INTEGER NOT NULL,
            status              TEXT NOT NULL,
            superseded_by_id    TEXT,
            superseded_at       TEXT,
            promoted_at         TEXT,
            created_at          TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_asset_metadata_canonical
            ON asset_metadata (asset_id, metadata_type) WHERE is_canonical = 1;

        CREATE TABLE IF NOT EXISTS scrape_collections (
            id                  TEXT PRIMARY KEY,
            organization_id     TEXT NOT NULL,
            slug                TEXT NOT NULL,
            config              TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scrape_sources (
            id              TEXT PRIMARY KEY,
            collection_id   TEXT NOT NULL,
            url             TEXT NOT NULL,
            is_active       INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scraped_assets (
            id                  TEXT PRIMARY KEY,
            collection_id       TEXT NOT NULL,
            asset_id            TEXT NOT NULL,
            source_id           TEXT,
            normalized_url      TEXT NOT NULL,
            kind                TEXT NOT NULL,
            content_hash        TEXT NOT NULL,
            version_count       INTEGER NOT NULL,
            depth               INTEGER NOT NULL,
            last_crawled_at     TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_scraped_assets_collection_url
            ON scraped_assets (collection_id, normalized_url);

        CREATE TABLE IF NOT EXISTS sharepoint_sync_configs (
            id                      TEXT PRIMARY KEY,
            organization_id         TEXT NOT NULL,
            slug                    TEXT NOT NULL,
            site_id                 TEXT NOT NULL,
            drive_id                TEXT NOT NULL,
            folder_path             TEXT NOT NULL,
            recursive               INTEGER NOT NULL,
            max_file_size_bytes     INTEGER,
            include_patterns        TEXT NOT NULL,
            exclude_patterns        TEXT NOT NULL,
            stats                   TEXT NOT NULL,
            is_active               INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sharepoint_synced_documents (
            sync_config_id      TEXT NOT NULL,
            sharepoint_item_id  TEXT NOT NULL,
            asset_id            TEXT NOT NULL,
            sharepoint_etag     TEXT NOT NULL,
            content_hash        TEXT NOT NULL,
            sync_status         TEXT NOT NULL,
            deleted_detected_at TEXT,
            last_synced_at      TEXT NOT NULL,
            PRIMARY KEY (sync_config_id, sharepoint_item_id)
        );

        CREATE TABLE IF NOT EXISTS sam_solicitations (
            id                      TEXT PRIMARY KEY,
            organization_id         TEXT NOT NULL,
            notice_id               TEXT NOT NULL,
            solicitation_number     TEXT,
            title                   TEXT NOT NULL,
            raw                     TEXT NOT NULL,
            first_seen_at           TEXT NOT NULL,
            last_seen_at            TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS uq_sam_solicitations_org_notice
            ON sam_solicitations (organization_id, notice_id);

        CREATE TABLE IF NOT EXISTS sam_notices (
            id                  TEXT PRIMARY KEY,
            solicitation_id     TEXT NOT NULL,
            notice_type         TEXT NOT NULL,
            posted_date         TEXT NOT NULL,
            raw                 TEXT NOT NULL,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sam_notices_solicitation ON sam_notices (solicitation_id);

        CREATE TABLE IF NOT EXISTS sam_api_call_budgets (
            organization_id     TEXT PRIMARY KEY,
            budget              TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            name                TEXT PRIMARY KEY,
            task_type           TEXT NOT NULL,
            schedule_expression TEXT NOT NULL,
            enabled             INTEGER NOT NULL,
            scope_type          TEXT NOT NULL,
            organization_id     TEXT,
            config              TEXT NOT NULL,
            last_run_id         TEXT,
            last_run_at         TEXT,
            last_run_status     TEXT,
            next_run_at         TEXT
        );

        CREATE VIEW IF NOT EXISTS unified_forecasts AS
            SELECT id, organization_id, 'sam' AS source, created_at
            FROM assets WHERE source_type = 'sam_gov';
        ",
    )
}
