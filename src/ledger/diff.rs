//! Cross-visit diffing
//!
//! The diff engine classifies a page's images as new or already seen by
//! comparing content hashes against the page's ledger record, appends newly
//! seen snapshots, and expires records that have not been scanned recently.

use crate::config::IdentityConfig;
use crate::ledger::traits::{LedgerError, LedgerResult, LedgerStore};
use crate::ledger::{ImageSnapshot, PageRecord};
use crate::url::{derive_page_identity, PageIdentity};
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex, MutexGuard};

/// Classification of one page's images against its history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Images whose hash the page has never shown before
    pub new: Vec<ImageSnapshot>,

    /// Images already recorded, as originally stored
    pub existing: Vec<ImageSnapshot>,

    /// True when the page had no record at all
    pub is_first_visit: bool,
}

/// Compares collections with the ledger and keeps it up to date
pub struct DiffEngine<S: LedgerStore> {
    store: Arc<Mutex<S>>,
    identity: IdentityConfig,
}

impl<S: LedgerStore> Clone for DiffEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            identity: self.identity.clone(),
        }
    }
}

impl<S: LedgerStore> DiffEngine<S> {
    /// Creates an engine that owns `store`
    pub fn new(store: S, identity: IdentityConfig) -> Self {
        Self::shared(Arc::new(Mutex::new(store)), identity)
    }

    /// Creates an engine over a store shared with other callers
    pub fn shared(store: Arc<Mutex<S>>, identity: IdentityConfig) -> Self {
        Self { store, identity }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Derives the identity `page_url` is recorded under
    pub fn identify(&self, page_url: &str) -> Option<PageIdentity> {
        match derive_page_identity(page_url, &self.identity) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(page_url, error = %e, "Cannot derive page identity");
                None
            }
        }
    }

    /// Splits `snapshots` into new and existing for the page at `page_url`
    ///
    /// An underivable page identity yields an empty result with
    /// `is_first_visit == false`.
    ///
    /// # Errors
    ///
    /// Only storage failures are returned as errors.
    pub fn compute_diff(
        &self,
        page_url: &str,
        snapshots: &[ImageSnapshot],
    ) -> LedgerResult<DiffResult> {
        let Some(identity) = self.identify(page_url) else {
            return Ok(DiffResult::default());
        };

        let record = self.lock()?.get(&identity.id)?;

        let Some(record) = record else {
            tracing::debug!(page_id = %identity.id, images = snapshots.len(), "First visit");
            return Ok(DiffResult {
                new: snapshots.to_vec(),
                existing: Vec::new(),
                is_first_visit: true,
            });
        };

        let stored = record.snapshots_by_hash();
        let mut diff = DiffResult::default();
        for snapshot in snapshots {
            match stored.get(&snapshot.content_hash) {
                Some(stored) => diff.existing.push((*stored).clone()),
                None => diff.new.push(snapshot.clone()),
            }
        }

        tracing::debug!(
            page_id = %identity.id,
            new = diff.new.len(),
            existing = diff.existing.len(),
            "Diff computed"
        );

        Ok(diff)
    }

    /// Appends `snapshots` to the page's record and refreshes its scan time,
    /// creating the record when absent
    ///
    /// Snapshots are appended as given; callers pass only the `new` half of
    /// a diff. Returns `None` when the page identity cannot be derived.
    pub fn update_record(
        &self,
        page_url: &str,
        snapshots: &[ImageSnapshot],
    ) -> LedgerResult<Option<PageRecord>> {
        let Some(identity) = self.identify(page_url) else {
            return Ok(None);
        };

        let now = Utc::now();
        let mut store = self.lock()?;

        let mut record = match store.get(&identity.id)? {
            Some(record) => record,
            None => PageRecord::new(&identity, now),
        };
        record.url = identity.url.clone();
        record.last_scan_at = now;
        record.images.extend_from_slice(snapshots);

        store.put(&record)?;

        tracing::debug!(
            page_id = %record.id,
            appended = snapshots.len(),
            total = record.images.len(),
            "Record updated"
        );

        Ok(Some(record))
    }

    /// Removes records not scanned within `max_age_days`
    ///
    /// # Returns
    ///
    /// The number of records removed. An age reaching past the earliest
    /// representable time removes nothing.
    pub fn cleanup(&self, max_age_days: u32) -> LedgerResult<u64> {
        let max_age = Duration::days(i64::from(max_age_days));
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            tracing::info!(max_age_days, "Cutoff predates the earliest timestamp; nothing removed");
            return Ok(0);
        };
        let removed = self.lock()?.delete_older_than(cutoff)?;

        tracing::info!(max_age_days, removed, "Ledger cleanup complete");
        Ok(removed)
    }

    /// Removes every record
    pub fn clear_all(&self) -> LedgerResult<u64> {
        let removed = self.lock()?.clear()?;
        tracing::info!(removed, "Ledger cleared");
        Ok(removed)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, S>> {
        self.store.lock().map_err(|_| LedgerError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;
    use crate::ledger::MemoryLedger;

    const PAGE: &str = "https://shop.example/item?id=7";

    fn engine() -> DiffEngine<MemoryLedger> {
        DiffEngine::new(MemoryLedger::new(), IdentityConfig::default())
    }

    fn snapshot(bytes: &[u8], url: &str) -> ImageSnapshot {
        ImageSnapshot {
            content_hash: digest(bytes),
            url: url.to_string(),
            width: 0,
            height: 0,
            alt: None,
            context: Some("img".to_string()),
            first_seen_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_visit_everything_new() {
        let engine = engine();
        let diff = engine
            .compute_diff(PAGE, &[snapshot(b"a", "https://cdn/a"), snapshot(b"b", "https://cdn/b")])
            .unwrap();

        assert!(diff.is_first_visit);
        assert_eq!(diff.new.len(), 2);
        assert!(diff.existing.is_empty());
    }

    #[test]
    fn test_existing_returns_stored_snapshot() {
        let engine = engine();
        let original = snapshot(b"a", "https://cdn/a-original.png");
        engine.update_record(PAGE, &[original.clone()]).unwrap();

        // Same bytes, served from a different URL
        let moved = snapshot(b"a", "https://cdn/a-moved.png");
        let diff = engine.compute_diff(PAGE, &[moved]).unwrap();

        assert!(!diff.is_first_visit);
        assert!(diff.new.is_empty());
        assert_eq!(diff.existing, vec![original]);
    }

    #[test]
    fn test_tracking_noise_hits_same_record() {
        let engine = engine();
        engine
            .update_record(PAGE, &[snapshot(b"a", "https://cdn/a")])
            .unwrap();

        let diff = engine
            .compute_diff(
                "https://www.shop.example/item/?utm_source=mail&id=7#top",
                &[snapshot(b"a", "https://cdn/a")],
            )
            .unwrap();
        assert!(!diff.is_first_visit);
        assert_eq!(diff.existing.len(), 1);
    }

    #[test]
    fn test_update_appends_without_dedup() {
        let engine = engine();
        let a = snapshot(b"a", "https://cdn/a");

        engine.update_record(PAGE, &[a.clone()]).unwrap();
        let record = engine.update_record(PAGE, &[a]).unwrap().unwrap();

        assert_eq!(record.images.len(), 2);
    }

    #[test]
    fn test_update_refreshes_scan_time() {
        let engine = engine();
        let first = engine.update_record(PAGE, &[]).unwrap().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = engine.update_record(PAGE, &[]).unwrap().unwrap();

        assert!(second.last_scan_at > first.last_scan_at);
    }

    #[test]
    fn test_invalid_identity_is_empty_and_not_first_visit() {
        let engine = engine();
        let diff = engine
            .compute_diff("not-a-url", &[snapshot(b"a", "https://cdn/a")])
            .unwrap();

        assert_eq!(diff, DiffResult::default());
        assert!(!diff.is_first_visit);
        assert!(engine.update_record("not-a-url", &[]).unwrap().is_none());
    }

    #[test]
    fn test_cleanup_with_huge_retention_keeps_everything() {
        let engine = engine();
        engine.update_record(PAGE, &[snapshot(b"a", "https://cdn/a")]).unwrap();

        assert_eq!(engine.cleanup(u32::MAX).unwrap(), 0);
        assert!(!engine.compute_diff(PAGE, &[]).unwrap().is_first_visit);
    }

    #[test]
    fn test_existing_matches_first_stored_copy() {
        let engine = engine();
        let original = snapshot(b"a", "https://cdn/a-original.png");
        engine.update_record(PAGE, &[original.clone()]).unwrap();
        engine
            .update_record(PAGE, &[snapshot(b"a", "https://cdn/a-second.png")])
            .unwrap();

        let diff = engine
            .compute_diff(PAGE, &[snapshot(b"a", "https://cdn/a-third.png")])
            .unwrap();
        assert_eq!(diff.existing, vec![original]);
    }

    #[test]
    fn test_clear_all() {
        let engine = engine();
        engine.update_record(PAGE, &[]).unwrap();
        engine.update_record("https://shop.example/other", &[]).unwrap();

        assert_eq!(engine.clear_all().unwrap(), 2);
        assert!(engine.compute_diff(PAGE, &[]).unwrap().is_first_visit);
    }
}
