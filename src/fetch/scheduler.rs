//! Scheduler for dispatching a batch of candidates
//!
//! This module handles:
//! - Deriving the admission host key for each candidate
//! - Acquiring a slot before any network activity
//! - The per-candidate attempt loop (execute, classify, back off, retry)
//! - Releasing the slot once the loop exits
//!
//! Every candidate is dispatched at once; the admission controller is what
//! bounds how many actually run.

use crate::fetch::admission::AdmissionController;
use crate::fetch::executor::Retriever;
use crate::fetch::retry::RetryPolicy;
use crate::fetch::{Candidate, ErrorKind, Outcome};
use crate::url::{host_key, is_inline};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Runs candidates through admission, retrieval and retry
#[derive(Clone)]
pub struct FetchScheduler {
    admission: Arc<AdmissionController>,
    retriever: Arc<dyn Retriever>,
    policy: RetryPolicy,
}

impl FetchScheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `admission` - Shared ceilings; may be shared by several schedulers
    /// * `retriever` - Performs single attempts
    /// * `policy` - Retry decisions and backoff
    pub fn new(
        admission: Arc<AdmissionController>,
        retriever: Arc<dyn Retriever>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            admission,
            retriever,
            policy,
        }
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Retrieves every candidate and returns one outcome per candidate, in
    /// input order
    pub async fn run(&self, candidates: Vec<Candidate>) -> Vec<Outcome> {
        self.run_with_cancel(candidates, CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but candidates still queued or backing off
    /// when `cancel` fires finish as `CANCELLED` failures
    pub async fn run_with_cancel(
        &self,
        candidates: Vec<Candidate>,
        cancel: CancellationToken,
    ) -> Vec<Outcome> {
        let mut slots: Vec<Option<Outcome>> = vec![None; candidates.len()];
        let mut rx = self.run_streaming(candidates, cancel);

        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }

        // `run_streaming` reports every index exactly once.
        slots.into_iter().flatten().collect()
    }

    /// Dispatches every candidate and streams `(input index, outcome)` pairs
    /// in completion order
    ///
    /// Exactly one pair is sent per candidate. A task that dies without an
    /// outcome (a panicking retriever, for instance) is reported as an
    /// `UNKNOWN` failure with zero attempts. The channel closes once every
    /// candidate has been reported.
    pub fn run_streaming(
        &self,
        candidates: Vec<Candidate>,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<(usize, Outcome)> {
        let (tx, rx) = mpsc::channel(candidates.len().max(1));

        tracing::debug!(
            candidates = candidates.len(),
            max_concurrent = self.admission.max_concurrent(),
            max_per_host = self.admission.max_per_host(),
            "Dispatching batch"
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut tasks = JoinSet::new();
            let mut pending: Vec<Option<Candidate>> = Vec::with_capacity(candidates.len());

            for (index, candidate) in candidates.into_iter().enumerate() {
                pending.push(Some(candidate.clone()));

                let scheduler = scheduler.clone();
                let tx = tx.clone();
                let cancel = cancel.clone();
                tasks.spawn(async move {
                    let outcome = scheduler.fetch_one(candidate, cancel).await;
                    // The receiver may be gone if the caller stopped listening.
                    let _ = tx.send((index, outcome)).await;
                    index
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(index) => {
                        if let Some(slot) = pending.get_mut(index) {
                            *slot = None;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Retrieval task failed"),
                }
            }

            for (index, candidate) in pending.into_iter().enumerate() {
                if let Some(candidate) = candidate {
                    let outcome = Outcome::failure(
                        candidate,
                        ErrorKind::Unknown,
                        "Retrieval task ended without an outcome",
                        0,
                    );
                    let _ = tx.send((index, outcome)).await;
                }
            }
        });

        rx
    }

    async fn fetch_one(&self, candidate: Candidate, cancel: CancellationToken) -> Outcome {
        if cancel.is_cancelled() {
            return Outcome::failure(candidate, ErrorKind::Cancelled, "Collection cancelled", 0);
        }

        // Inline data needs no network, so it takes no slot.
        if is_inline(&candidate.url) {
            return self.attempt_loop(candidate, cancel).await;
        }

        let host = match Url::parse(&candidate.url)
            .ok()
            .filter(|u| u.scheme() == "http" || u.scheme() == "https")
            .and_then(|u| host_key(&u))
        {
            Some(host) => host,
            None => {
                return Outcome::failure(
                    candidate,
                    ErrorKind::Malformed,
                    "URL has no fetchable host",
                    0,
                );
            }
        };

        let slot = tokio::select! {
            acquired = self.admission.acquire(&host) => match acquired {
                Ok(slot) => slot,
                Err(e) => {
                    return Outcome::failure(candidate, ErrorKind::Cancelled, e.to_string(), 0);
                }
            },
            _ = cancel.cancelled() => {
                tracing::debug!(url = %candidate.url, host = %host, "Cancelled while queued");
                return Outcome::failure(
                    candidate,
                    ErrorKind::Cancelled,
                    "Collection cancelled while waiting for a slot",
                    0,
                );
            }
        };

        let outcome = self.attempt_loop(candidate, cancel).await;
        self.admission.release(slot);
        outcome
    }

    async fn attempt_loop(&self, candidate: Candidate, cancel: CancellationToken) -> Outcome {
        let mut attempt = 1;

        loop {
            let failure = match self.retriever.execute(&candidate).await {
                Ok(fetched) => {
                    tracing::debug!(
                        url = %candidate.url,
                        attempt,
                        bytes = fetched.bytes.len(),
                        media_type = %fetched.media_type,
                        "Retrieved"
                    );
                    return Outcome::Success {
                        candidate,
                        bytes: fetched.bytes,
                        media_type: fetched.media_type,
                        content_hash: None,
                    };
                }
                Err(failure) => failure,
            };

            if !self.policy.should_retry(failure.kind, attempt) {
                tracing::debug!(
                    url = %candidate.url,
                    attempt,
                    kind = %failure.kind,
                    detail = %failure.detail,
                    "Giving up"
                );
                return Outcome::failure(candidate, failure.kind, failure.detail, attempt);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::debug!(
                url = %candidate.url,
                attempt,
                kind = %failure.kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying after backoff"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Outcome::failure(
                        candidate,
                        ErrorKind::Cancelled,
                        format!("Cancelled during backoff after {}: {}", failure.kind, failure.detail),
                        attempt,
                    );
                }
            }

            attempt += 1;
        }
    }
}
