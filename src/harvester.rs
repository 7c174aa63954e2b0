//! Harvester: one page from candidates to ledger update
//!
//! This module handles:
//! - Refusing a second concurrent collection for the same page
//! - Running the collector with the page's cross-origin scope
//! - Diffing the collection against the ledger
//! - Appending the newly seen images to the page's record

use crate::collect::{CollectionResult, Collector, FailedImage, NullSink, ProgressSink};
use crate::config::Config;
use crate::fetch::{
    build_http_client, AdmissionController, Candidate, FetchScheduler, HttpRetriever, Retriever,
    RetryPolicy,
};
use crate::ledger::{DiffEngine, DiffResult, LedgerStore};
use crate::url::derive_page_identity;
use crate::{HarvestError, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// Result of harvesting one page
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub page_id: String,
    pub collection: CollectionResult,
    pub diff: DiffResult,
}

/// Page identities with a collection in progress
///
/// Cloning shares the underlying set.
#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `page_id` active until the returned guard is dropped
    ///
    /// Returns None if it is already active.
    pub fn try_register(&self, page_id: &str) -> Option<Registration> {
        if !self.lock().insert(page_id.to_string()) {
            return None;
        }
        Some(Registration {
            registry: self.clone(),
            page_id: page_id.to_string(),
        })
    }

    pub fn is_active(&self, page_id: &str) -> bool {
        self.lock().contains(page_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps a page registered as active
#[derive(Debug)]
pub struct Registration {
    registry: CollectionRegistry,
    page_id: String,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.page_id);
    }
}

/// Runs the full pipeline for one page at a time, sharing admission
/// ceilings across pages
pub struct Harvester<S: LedgerStore> {
    config: Arc<Config>,
    http: HttpRetriever,
    retriever: Option<Arc<dyn Retriever>>,
    admission: Arc<AdmissionController>,
    ledger: DiffEngine<S>,
    registry: CollectionRegistry,
    sink: Arc<dyn ProgressSink>,
}

impl<S: LedgerStore> Harvester<S> {
    /// Creates a harvester over `store`
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn new(config: Config, store: S) -> Result<Self> {
        let client = build_http_client(&config.user_agent)?;
        let http = HttpRetriever::new(client, config.fetch.timeout());
        let admission = Arc::new(AdmissionController::from_config(&config.fetch));
        let ledger = DiffEngine::new(store, config.identity.clone());

        Ok(Self {
            config: Arc::new(config),
            http,
            retriever: None,
            admission,
            ledger,
            registry: CollectionRegistry::new(),
            sink: Arc::new(NullSink),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares the active-collection set with other harvesters
    pub fn with_registry(mut self, registry: CollectionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Replaces HTTP retrieval for every page
    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn ledger(&self) -> &DiffEngine<S> {
        &self.ledger
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub async fn harvest(&self, page_url: &str, candidates: Vec<Candidate>) -> Result<HarvestReport> {
        self.harvest_with_cancel(page_url, candidates, CancellationToken::new()).await
    }

    /// Resubmits a saved failure list for `page_url`
    pub async fn retry(&self, page_url: &str, failed: &[FailedImage]) -> Result<HarvestReport> {
        let candidates = failed.iter().map(|f| f.candidate.clone()).collect();
        self.harvest(page_url, candidates).await
    }

    /// Collects, diffs and records one page
    ///
    /// # Errors
    ///
    /// * `HarvestError::InvalidIdentity` - `page_url` has no page identity
    /// * `HarvestError::CollectionActive` - the page is already being harvested
    /// * `HarvestError::Ledger` - the ledger could not be read or written
    pub async fn harvest_with_cancel(
        &self,
        page_url: &str,
        candidates: Vec<Candidate>,
        cancel: CancellationToken,
    ) -> Result<HarvestReport> {
        let identity = derive_page_identity(page_url, &self.config.identity)?;

        let _registration = self.registry.try_register(&identity.id).ok_or_else(|| {
            HarvestError::CollectionActive {
                page_id: identity.id.clone(),
            }
        })?;

        tracing::info!(
            page = %identity.url,
            page_id = %identity.id,
            candidates = candidates.len(),
            "Harvesting page"
        );

        let collection = self
            .collector(page_url)
            .collect_with_cancel(candidates, cancel)
            .await;

        let diff = self.ledger.compute_diff(page_url, &collection.snapshots())?;
        self.ledger.update_record(page_url, &diff.new)?;

        tracing::info!(
            page_id = %identity.id,
            new = diff.new.len(),
            existing = diff.existing.len(),
            failed = collection.stats.failed,
            first_visit = diff.is_first_visit,
            "Harvest complete"
        );

        Ok(HarvestReport {
            page_id: identity.id,
            collection,
            diff,
        })
    }

    fn collector(&self, page_url: &str) -> Collector {
        let retriever: Arc<dyn Retriever> = match &self.retriever {
            Some(retriever) => Arc::clone(retriever),
            None => Arc::new(self.http.for_page(page_url)),
        };

        let scheduler = FetchScheduler::new(
            Arc::clone(&self.admission),
            retriever,
            RetryPolicy::from_config(&self.config.fetch),
        );

        Collector::new(scheduler)
            .with_sink(Arc::clone(&self.sink))
            .with_progress_interval(self.config.fetch.progress_interval as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchFailure, Fetched};
    use crate::ledger::{LedgerStore, MemoryLedger};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Every URL's body is its own path, after an optional delay
    struct PathBodies {
        delay: Duration,
    }

    #[async_trait]
    impl Retriever for PathBodies {
        async fn execute(&self, candidate: &Candidate) -> std::result::Result<Fetched, FetchFailure> {
            tokio::time::sleep(self.delay).await;
            let body = candidate.url.rsplit('/').next().unwrap_or("").as_bytes().to_vec();
            Ok(Fetched {
                bytes: body,
                media_type: "image/png".to_string(),
            })
        }
    }

    fn harvester(delay: Duration) -> Harvester<MemoryLedger> {
        Harvester::new(Config::default(), MemoryLedger::new())
            .unwrap()
            .with_retriever(Arc::new(PathBodies { delay }))
    }

    fn candidates(names: &[&str]) -> Vec<Candidate> {
        names
            .iter()
            .map(|n| Candidate::new(format!("https://cdn.example/{}", n)))
            .collect()
    }

    #[test]
    fn test_registry_guard_releases() {
        let registry = CollectionRegistry::new();
        let guard = registry.try_register("p1").unwrap();

        assert!(registry.is_active("p1"));
        assert!(registry.try_register("p1").is_none());
        assert!(registry.try_register("p2").is_some());

        drop(guard);
        assert!(!registry.is_active("p1"));
        assert!(registry.try_register("p1").is_some());
    }

    #[tokio::test]
    async fn test_second_visit_reports_only_new() {
        let harvester = harvester(Duration::ZERO);
        let page = "https://shop.example/item?id=7";

        let first = harvester.harvest(page, candidates(&["a", "b"])).await.unwrap();
        assert!(first.diff.is_first_visit);
        assert_eq!(first.diff.new.len(), 2);

        let second = harvester
            .harvest("https://shop.example/item?id=7&utm_campaign=x", candidates(&["a", "b", "c"]))
            .await
            .unwrap();
        assert_eq!(second.page_id, first.page_id);
        assert!(!second.diff.is_first_visit);
        assert_eq!(second.diff.new.len(), 1);
        assert_eq!(second.diff.existing.len(), 2);

        let store = harvester.ledger().store().lock().unwrap();
        assert_eq!(store.count_images().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_harvest_of_same_page_rejected() {
        let harvester = Arc::new(harvester(Duration::from_millis(200)));
        let page = "https://shop.example/item?id=7";

        let running = {
            let harvester = Arc::clone(&harvester);
            tokio::spawn(async move { harvester.harvest(page, candidates(&["a"])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = harvester.harvest(page, candidates(&["b"])).await.unwrap_err();
        assert!(matches!(err, HarvestError::CollectionActive { .. }));

        // A different page is unaffected
        assert!(harvester
            .harvest("https://shop.example/other", candidates(&["c"]))
            .await
            .is_ok());

        assert!(running.await.unwrap().is_ok());
        assert!(harvester.harvest(page, candidates(&["b"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_page_url() {
        let harvester = harvester(Duration::ZERO);
        let err = harvester
            .harvest("not-a-url", candidates(&["a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, HarvestError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn test_cancelled_harvest_records_nothing_new() {
        let harvester = harvester(Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();

        let report = harvester
            .harvest_with_cancel("https://shop.example/item?id=7", candidates(&["a", "b"]), token)
            .await
            .unwrap();

        assert!(report.collection.images.is_empty());
        assert_eq!(report.collection.failures.len(), 2);
        assert!(report
            .collection
            .failures
            .iter()
            .all(|f| f.error_kind == crate::fetch::ErrorKind::Cancelled));
        assert!(report.diff.new.is_empty());
    }
}
