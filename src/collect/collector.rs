//! Collector implementation
//!
//! The collector runs one scheduler batch and is the only consumer of its
//! outcome stream, so the hash lookup and insert for deduplication never
//! race.

use crate::collect::progress::{CollectEvent, NullSink, ProgressReport, ProgressSink};
use crate::collect::{CollectedImage, CollectionResult, CollectionStats, FailedImage};
use crate::fetch::{Candidate, FetchScheduler, Outcome};
use crate::hash::{digest, ContentHash};
use crate::ledger::ImageSnapshot;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const DEFAULT_PROGRESS_INTERVAL: usize = 10;

/// Collects a page's images into a deduplicated set
pub struct Collector {
    scheduler: FetchScheduler,
    sink: Arc<dyn ProgressSink>,
    progress_interval: usize,
}

impl Collector {
    /// Creates a collector that reports to nobody
    pub fn new(scheduler: FetchScheduler) -> Self {
        Self {
            scheduler,
            sink: Arc::new(NullSink),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Emits a progress event after every `interval` completions
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Retrieves every candidate and keeps one image per distinct content
    pub async fn collect(&self, candidates: Vec<Candidate>) -> CollectionResult {
        self.collect_with_cancel(candidates, CancellationToken::new()).await
    }

    /// Resubmits exactly the candidates of a saved failure list
    pub async fn retry_failed(&self, failed: &[FailedImage]) -> CollectionResult {
        let candidates = failed.iter().map(|f| f.candidate.clone()).collect();
        self.collect(candidates).await
    }

    /// Like [`collect`](Self::collect); candidates not finished when
    /// `cancel` fires come back as `CANCELLED` failures
    pub async fn collect_with_cancel(
        &self,
        candidates: Vec<Candidate>,
        cancel: CancellationToken,
    ) -> CollectionResult {
        let total = candidates.len();
        let batch_time = Utc::now();

        self.sink.emit(CollectEvent::Started { total });

        let mut report = ProgressReport {
            total,
            ..Default::default()
        };

        if total == 0 {
            self.sink.emit(CollectEvent::Finished(report));
            return CollectionResult::default();
        }

        // Kept images tagged with their input index; `kept` maps hash to slot.
        let mut images: Vec<(usize, CollectedImage)> = Vec::new();
        let mut kept: HashMap<ContentHash, usize> = HashMap::new();

        let mut rx = self.scheduler.run_streaming(candidates, cancel);

        while let Some((index, outcome)) = rx.recv().await {
            match outcome.hashed() {
                Outcome::Success {
                    candidate,
                    bytes,
                    media_type,
                    content_hash,
                } => {
                    let content_hash = content_hash.unwrap_or_else(|| digest(&bytes));
                    let image = CollectedImage {
                        snapshot: snapshot(&candidate, content_hash.clone(), batch_time),
                        bytes,
                        media_type,
                    };

                    match kept.get(&content_hash) {
                        None => {
                            kept.insert(content_hash, images.len());
                            images.push((index, image));
                        }
                        Some(&slot) => {
                            report.deduplicated += 1;
                            tracing::debug!(
                                url = %candidate.url,
                                hash = content_hash.short(),
                                "Duplicate content"
                            );
                            // The earliest candidate in input order wins.
                            if index < images[slot].0 {
                                images[slot] = (index, image);
                            }
                        }
                    }
                }
                Outcome::Failure {
                    candidate,
                    error_kind,
                    detail,
                    attempts,
                } => {
                    report.failed += 1;
                    report.failed_images.push(FailedImage {
                        error_kind,
                        detail,
                        attempts,
                        candidate,
                    });
                }
            }

            report.completed += 1;
            if report.completed % self.progress_interval == 0 && report.completed < total {
                self.sink.emit(CollectEvent::Progress(report.clone()));
            }
        }

        images.sort_by_key(|(index, _)| *index);
        let images: Vec<CollectedImage> = images.into_iter().map(|(_, image)| image).collect();

        let stats = CollectionStats {
            total,
            collected: images.len(),
            failed: report.failed,
            deduplicated: report.deduplicated,
        };

        tracing::debug!(
            total,
            collected = stats.collected,
            failed = stats.failed,
            deduplicated = stats.deduplicated,
            "Batch complete"
        );

        let failures = report.failed_images.clone();
        self.sink.emit(CollectEvent::Finished(report));

        CollectionResult {
            images,
            failures,
            stats,
        }
    }
}

fn snapshot(candidate: &Candidate, content_hash: ContentHash, at: DateTime<Utc>) -> ImageSnapshot {
    ImageSnapshot {
        content_hash,
        url: candidate.url.clone(),
        width: candidate.width.unwrap_or(0),
        height: candidate.height.unwrap_or(0),
        alt: candidate.alt.clone(),
        context: Some(candidate.source_hint.as_str().to_string()),
        first_seen_at: at,
    }
}
