//! SQLite ledger implementation
//!
//! This module provides a SQLite-based implementation of the LedgerStore trait.

use crate::hash::ContentHash;
use crate::ledger::schema::initialize_schema;
use crate::ledger::traits::{LedgerResult, LedgerStore};
use crate::ledger::{from_millis, to_millis, ImageSnapshot, PageRecord};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite ledger backend
pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    /// Opens or creates a ledger database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_images(&self, page_id: &str) -> LedgerResult<Vec<ImageSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT content_hash, url, width, height, alt, context, first_seen_at
             FROM page_images WHERE page_id = ?1 ORDER BY position",
        )?;

        let rows = stmt.query_map(params![page_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut images = Vec::new();
        for row in rows {
            let (hash, url, width, height, alt, context, first_seen) = row?;
            images.push(ImageSnapshot {
                content_hash: ContentHash::from_hex(hash),
                url,
                width,
                height,
                alt,
                context,
                first_seen_at: from_millis(page_id, first_seen)?,
            });
        }

        Ok(images)
    }

    fn load_record(&self, id: &str) -> LedgerResult<Option<PageRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, url, origin, path, query_signature, host, last_scan_at
                 FROM page_records WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, url, origin, path, query_signature, host, last_scan)) = row else {
            return Ok(None);
        };

        let last_scan_at = from_millis(&id, last_scan)?;
        let images = self.load_images(&id)?;

        Ok(Some(PageRecord {
            id,
            url,
            origin,
            path,
            query_signature,
            host,
            last_scan_at,
            images,
        }))
    }
}

impl LedgerStore for SqliteLedger {
    fn get(&self, id: &str) -> LedgerResult<Option<PageRecord>> {
        self.load_record(id)
    }

    fn put(&mut self, record: &PageRecord) -> LedgerResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO page_records (id, url, origin, path, query_signature, host, last_scan_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                url = excluded.url,
                origin = excluded.origin,
                path = excluded.path,
                query_signature = excluded.query_signature,
                host = excluded.host,
                last_scan_at = excluded.last_scan_at",
            params![
                record.id,
                record.url,
                record.origin,
                record.path,
                record.query_signature,
                record.host,
                to_millis(record.last_scan_at),
            ],
        )?;

        tx.execute("DELETE FROM page_images WHERE page_id = ?1", params![record.id])?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO page_images
                 (page_id, position, content_hash, url, width, height, alt, context, first_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for (position, image) in record.images.iter().enumerate() {
                stmt.execute(params![
                    record.id,
                    position as i64,
                    image.content_hash.as_str(),
                    image.url,
                    image.width,
                    image.height,
                    image.alt,
                    image.context,
                    to_millis(image.first_seen_at),
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> LedgerResult<u64> {
        let removed = self.conn.execute(
            "DELETE FROM page_records WHERE last_scan_at < ?1",
            params![to_millis(cutoff)],
        )?;
        Ok(removed as u64)
    }

    fn clear(&mut self) -> LedgerResult<u64> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM page_images", [])?;
        let removed = tx.execute("DELETE FROM page_records", [])?;
        tx.commit()?;
        Ok(removed as u64)
    }

    // ===== Statistics =====

    fn count_records(&self) -> LedgerResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM page_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_images(&self) -> LedgerResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM page_images", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn records_by_host(&self, host: &str) -> LedgerResult<Vec<PageRecord>> {
        let ids: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT id FROM page_records WHERE host = ?1 ORDER BY last_scan_at DESC",
            )?;
            let rows = stmt.query_map(params![host], |row| row.get(0))?;
            rows.collect::<Result<Vec<_>, rusqlite::Error>>()?
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.load_record(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn host_counts(&self) -> LedgerResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT host, COUNT(*) FROM page_records GROUP BY host ORDER BY COUNT(*) DESC, host",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;

        Ok(rows.collect::<Result<Vec<_>, rusqlite::Error>>()?)
    }
}
