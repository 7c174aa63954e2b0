//! Ledger store trait and error types
//!
//! This module defines the trait interface for ledger backends and
//! associated error types.

use crate::ledger::PageRecord;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Trait for ledger backend implementations
///
/// A ledger maps page identities to their [`PageRecord`]. Records are
/// replaced whole on write and removed only by [`delete_older_than`] or
/// [`clear`].
///
/// [`delete_older_than`]: LedgerStore::delete_older_than
/// [`clear`]: LedgerStore::clear
pub trait LedgerStore: Send {
    /// Gets a record by page identity
    fn get(&self, id: &str) -> LedgerResult<Option<PageRecord>>;

    /// Inserts or fully replaces a record, including its image list
    fn put(&mut self, record: &PageRecord) -> LedgerResult<()>;

    /// Deletes every record whose `last_scan_at` is strictly before `cutoff`
    ///
    /// # Returns
    ///
    /// The number of records removed
    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> LedgerResult<u64>;

    /// Deletes every record
    ///
    /// # Returns
    ///
    /// The number of records removed
    fn clear(&mut self) -> LedgerResult<u64>;

    // ===== Statistics =====

    /// Gets total record count
    fn count_records(&self) -> LedgerResult<u64>;

    /// Gets total image snapshot count across all records
    fn count_images(&self) -> LedgerResult<u64>;

    /// Gets every record for a host, most recently scanned first
    fn records_by_host(&self, host: &str) -> LedgerResult<Vec<PageRecord>>;

    /// Gets `(host, record count)` pairs, largest first
    fn host_counts(&self) -> LedgerResult<Vec<(String, u64)>>;
}
