//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the ledger database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per logical page
CREATE TABLE IF NOT EXISTS page_records (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    origin TEXT NOT NULL,
    path TEXT NOT NULL,
    query_signature TEXT NOT NULL,
    host TEXT NOT NULL,
    last_scan_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_records_host ON page_records(host);
CREATE INDEX IF NOT EXISTS idx_page_records_last_scan ON page_records(last_scan_at);

-- Image snapshots belonging to a page, in insertion order
CREATE TABLE IF NOT EXISTS page_images (
    page_id TEXT NOT NULL REFERENCES page_records(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    content_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    width INTEGER NOT NULL DEFAULT 0,
    height INTEGER NOT NULL DEFAULT 0,
    alt TEXT,
    context TEXT,
    first_seen_at INTEGER NOT NULL,
    PRIMARY KEY (page_id, position)
);

CREATE INDEX IF NOT EXISTS idx_page_images_hash ON page_images(content_hash);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
