//! Ledger module for persisting per-page image history
//!
//! This module handles:
//! - The page record and image snapshot data model
//! - The `LedgerStore` trait with SQLite and in-memory backends
//! - Cross-visit diffing and age-based cleanup
//! - Summary statistics for reporting

mod diff;
mod memory;
mod schema;
mod sqlite;
pub mod stats;
mod traits;

pub use diff::{DiffEngine, DiffResult};
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{LedgerError, LedgerResult, LedgerStore};

use crate::hash::ContentHash;
use crate::url::PageIdentity;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Opens or creates a ledger database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_ledger(path: &Path) -> LedgerResult<SqliteLedger> {
    SqliteLedger::new(path)
}

/// One image as recorded against a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSnapshot {
    pub content_hash: ContentHash,
    pub url: String,

    /// Declared width, 0 when unknown
    pub width: u32,

    /// Declared height, 0 when unknown
    pub height: u32,

    pub alt: Option<String>,

    /// Where on the page the image was found
    pub context: Option<String>,

    pub first_seen_at: DateTime<Utc>,
}

/// Everything the ledger knows about one logical page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: String,
    pub url: String,
    pub origin: String,
    pub path: String,
    pub query_signature: String,
    pub host: String,
    pub last_scan_at: DateTime<Utc>,
    pub images: Vec<ImageSnapshot>,
}

impl PageRecord {
    /// Creates an empty record for `identity`, scanned at `now`
    pub fn new(identity: &PageIdentity, now: DateTime<Utc>) -> Self {
        Self {
            id: identity.id.clone(),
            url: identity.url.clone(),
            origin: identity.origin.clone(),
            path: identity.path.clone(),
            query_signature: identity.query_signature.clone(),
            host: identity.host.clone(),
            last_scan_at: now,
            images: Vec::new(),
        }
    }

    /// Indexes stored snapshots by hash; the earliest stored snapshot wins
    /// when a hash was appended more than once
    pub fn snapshots_by_hash(&self) -> HashMap<&ContentHash, &ImageSnapshot> {
        let mut index = HashMap::with_capacity(self.images.len());
        for snapshot in &self.images {
            index.entry(&snapshot.content_hash).or_insert(snapshot);
        }
        index
    }
}

/// Converts a timestamp to its stored form, UTC epoch milliseconds
pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Converts stored epoch milliseconds back to a timestamp
pub(crate) fn from_millis(id: &str, millis: i64) -> LedgerResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| LedgerError::Corrupt {
            id: id.to_string(),
            reason: format!("timestamp {} out of range", millis),
        })
}
