//! In-memory [`LedgerStore`] implementation
//!
//! Records live in a `HashMap` keyed by page identity. Nothing survives the
//! process, which makes it the store of choice for tests and dry runs.

use crate::ledger::traits::{LedgerResult, LedgerStore};
use crate::ledger::PageRecord;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Non-durable ledger
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: HashMap<String, PageRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerStore for MemoryLedger {
    fn get(&self, id: &str) -> LedgerResult<Option<PageRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn put(&mut self, record: &PageRecord) -> LedgerResult<()> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> LedgerResult<u64> {
        let before = self.records.len();
        self.records.retain(|_, r| r.last_scan_at >= cutoff);
        Ok((before - self.records.len()) as u64)
    }

    fn clear(&mut self) -> LedgerResult<u64> {
        let removed = self.records.len() as u64;
        self.records.clear();
        Ok(removed)
    }

    fn count_records(&self) -> LedgerResult<u64> {
        Ok(self.records.len() as u64)
    }

    fn count_images(&self) -> LedgerResult<u64> {
        Ok(self.records.values().map(|r| r.images.len() as u64).sum())
    }

    fn records_by_host(&self, host: &str) -> LedgerResult<Vec<PageRecord>> {
        let mut records: Vec<PageRecord> = self
            .records
            .values()
            .filter(|r| r.host == host)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_scan_at.cmp(&a.last_scan_at));
        Ok(records)
    }

    fn host_counts(&self) -> LedgerResult<Vec<(String, u64)>> {
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for record in self.records.values() {
            *counts.entry(record.host.as_str()).or_default() += 1;
        }

        let mut counts: Vec<(String, u64)> = counts
            .into_iter()
            .map(|(host, n)| (host.to_string(), n))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}
