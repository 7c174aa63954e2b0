//! Statistics generation from the ledger
//!
//! This module provides functionality for extracting and displaying
//! ledger statistics from a store.

use crate::ledger::traits::{LedgerResult, LedgerStore};
use chrono::{DateTime, Utc};
use std::fmt;

/// Hosts listed in the summary
const TOP_HOSTS: usize = 10;

/// Ledger statistics summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerStatistics {
    /// Number of page records
    pub total_records: u64,

    /// Number of image snapshots across all records
    pub total_images: u64,

    /// Distinct hosts with at least one record
    pub unique_hosts: u64,

    /// Hosts with the most records, largest first
    pub top_hosts: Vec<(String, u64)>,
}

/// Loads statistics from a store
pub fn load_statistics(store: &dyn LedgerStore) -> LedgerResult<LedgerStatistics> {
    let total_records = store.count_records()?;
    let total_images = store.count_images()?;

    let mut hosts = store.host_counts()?;
    let unique_hosts = hosts.len() as u64;
    hosts.truncate(TOP_HOSTS);

    Ok(LedgerStatistics {
        total_records,
        total_images,
        unique_hosts,
        top_hosts: hosts,
    })
}

impl fmt::Display for LedgerStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Ledger Statistics ===")?;
        writeln!(f)?;

        writeln!(f, "Overview:")?;
        writeln!(f, "  Page records: {}", self.total_records)?;
        writeln!(f, "  Image snapshots: {}", self.total_images)?;
        writeln!(f, "  Unique hosts: {}", self.unique_hosts)?;

        let average = if self.total_records > 0 {
            self.total_images as f64 / self.total_records as f64
        } else {
            0.0
        };
        writeln!(f, "  Images per page: {:.1}", average)?;

        if !self.top_hosts.is_empty() {
            writeln!(f)?;
            writeln!(f, "Top Hosts:")?;
            for (host, count) in &self.top_hosts {
                let percentage = (*count as f64 / self.total_records.max(1) as f64) * 100.0;
                writeln!(f, "  {}: {} ({:.1}%)", host, count, percentage)?;
            }
        }

        Ok(())
    }
}

/// One page in a host listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub url: String,
    pub last_scan_at: DateTime<Utc>,
    pub images: usize,
}

/// Pages recorded for one host, most recently scanned first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostListing {
    pub host: String,
    pub pages: Vec<PageSummary>,
}

/// Lists the pages recorded under `host`
pub fn load_host_listing(store: &dyn LedgerStore, host: &str) -> LedgerResult<HostListing> {
    let host = host.to_lowercase();
    let pages = store
        .records_by_host(&host)?
        .into_iter()
        .map(|record| PageSummary {
            url: record.url,
            last_scan_at: record.last_scan_at,
            images: record.images.len(),
        })
        .collect();

    Ok(HostListing { host, pages })
}

impl fmt::Display for HostListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pages for {} ({}):", self.host, self.pages.len())?;
        for page in &self.pages {
            writeln!(
                f,
                "  {}  {} images  last scan {}",
                page.url,
                page.images,
                page.last_scan_at.format("%Y-%m-%d %H:%M")
            )?;
        }
        Ok(())
    }
}
