//! Collect module for turning retrieval outcomes into a page's image set
//!
//! This module handles:
//! - Content-hash deduplication within a single run
//! - Capturing failures with their candidate metadata
//! - Progress reporting through pluggable sinks
//! - Resubmitting a saved failure list

mod collector;
mod progress;

pub use collector::Collector;
pub use progress::{ChannelSink, CollectEvent, NullSink, ProgressReport, ProgressSink, TracingSink};

use crate::fetch::{Candidate, ErrorKind};
use crate::ledger::ImageSnapshot;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A retrieved image, unique by content hash within its run
#[derive(Debug, Clone)]
pub struct CollectedImage {
    pub snapshot: ImageSnapshot,
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// A candidate that could not be retrieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FailedImage {
    pub error_kind: ErrorKind,
    pub detail: String,
    pub attempts: u32,
    pub candidate: Candidate,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Candidates submitted
    pub total: usize,

    /// Unique images kept
    pub collected: usize,

    pub failed: usize,

    /// Successes dropped because their hash was already kept
    pub deduplicated: usize,
}

/// Everything one run produced
#[derive(Debug, Clone, Default)]
pub struct CollectionResult {
    pub images: Vec<CollectedImage>,
    pub failures: Vec<FailedImage>,
    pub stats: CollectionStats,
}

impl CollectionResult {
    pub fn snapshots(&self) -> Vec<ImageSnapshot> {
        self.images.iter().map(|i| i.snapshot.clone()).collect()
    }
}

/// On-disk shape of a saved failure list
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FailureList {
    #[serde(default, rename = "failure")]
    pub failures: Vec<FailedImage>,
}

impl FailureList {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = toml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.failures.iter().map(|f| f.candidate.clone()).collect()
    }
}

/// On-disk shape of a candidate file
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CandidateList {
    #[serde(default, rename = "candidate")]
    pub candidates: Vec<Candidate>,
}

impl CandidateList {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
