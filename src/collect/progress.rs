//! Progress events
//!
//! A collection reports through a [`ProgressSink`]: one `Started`, a
//! `Progress` after every `progress_interval` completions, and one
//! `Finished`.

use crate::collect::FailedImage;
use tokio::sync::mpsc;

/// Running totals for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressReport {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub deduplicated: usize,
    pub failed_images: Vec<FailedImage>,
}

impl ProgressReport {
    /// Fraction of candidates that have an outcome, 0.0 to 1.0
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectEvent {
    Started { total: usize },
    Progress(ProgressReport),
    Finished(ProgressReport),
}

/// Receives progress events from a collector
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: CollectEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: CollectEvent) {}
}

/// Logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: CollectEvent) {
        match event {
            CollectEvent::Started { total } => {
                tracing::info!(total, "Collection started");
            }
            CollectEvent::Progress(report) => {
                tracing::info!(
                    completed = report.completed,
                    total = report.total,
                    failed = report.failed,
                    deduplicated = report.deduplicated,
                    "Progress: {:.0}%",
                    report.fraction() * 100.0
                );
            }
            CollectEvent::Finished(report) => {
                tracing::info!(
                    total = report.total,
                    failed = report.failed,
                    deduplicated = report.deduplicated,
                    "Collection finished"
                );
                for failure in &report.failed_images {
                    tracing::warn!(
                        url = %failure.candidate.url,
                        kind = %failure.error_kind,
                        attempts = failure.attempts,
                        "{}",
                        failure.detail
                    );
                }
            }
        }
    }
}

/// Forwards events to an unbounded channel
///
/// Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CollectEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CollectEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: CollectEvent) {
        let _ = self.tx.send(event);
    }
}
