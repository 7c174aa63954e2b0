//! Admission control for in-flight retrievals
//!
//! This module enforces two ceilings at once:
//! - A global ceiling over all reserved slots
//! - A per-host ceiling so no single server sees more than a few requests
//!
//! Both are tokio semaphores, which queue waiters in FIFO order. A caller
//! first queues on its host, then on the global ceiling, so a request blocked
//! behind a busy host never holds a global slot another host could use.

use crate::config::FetchConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Host semaphores beyond this count are pruned once idle
const MAX_IDLE_HOSTS: usize = 256;

/// Errors returned while waiting for a slot
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Admission controller closed while waiting for a slot on {host}")]
    Closed { host: String },
}

/// One reserved unit of capacity on a host
///
/// Holds a per-host permit and a global permit. Dropping the slot releases
/// both.
#[derive(Debug)]
pub struct Slot {
    host: String,
    _host_permit: OwnedSemaphorePermit,
    _global_permit: OwnedSemaphorePermit,
}

impl Slot {
    pub fn host(&self) -> &str {
        &self.host
    }
}

/// Global and per-host concurrency ceilings
pub struct AdmissionController {
    global: Arc<Semaphore>,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
    max_concurrent: usize,
    max_per_host: usize,
}

impl AdmissionController {
    /// Creates a controller with the given ceilings
    ///
    /// # Arguments
    ///
    /// * `max_concurrent` - Maximum slots reserved across all hosts
    /// * `max_per_host` - Maximum slots reserved for any single host
    pub fn new(max_concurrent: usize, max_per_host: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent)),
            hosts: Mutex::new(HashMap::new()),
            max_concurrent,
            max_per_host,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_concurrent as usize, config.max_per_host as usize)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn max_per_host(&self) -> usize {
        self.max_per_host
    }

    /// Waits until both the host and the global ceiling have room
    ///
    /// Dropping the returned future while it waits removes the caller from
    /// the queue.
    ///
    /// # Errors
    ///
    /// Returns `AdmissionError::Closed` if [`close`](Self::close) is called
    /// before a slot is granted.
    pub async fn acquire(&self, host: &str) -> Result<Slot, AdmissionError> {
        let closed = || AdmissionError::Closed {
            host: host.to_string(),
        };

        if self.global.is_closed() {
            return Err(closed());
        }

        let host_semaphore = self.host_semaphore(host);

        let host_permit = host_semaphore.acquire_owned().await.map_err(|_| closed())?;
        let global_permit = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .map_err(|_| closed())?;

        tracing::trace!(host, in_flight = self.in_flight(), "Slot granted");

        Ok(Slot {
            host: host.to_string(),
            _host_permit: host_permit,
            _global_permit: global_permit,
        })
    }

    /// Returns a slot to both ceilings
    pub fn release(&self, slot: Slot) {
        tracing::trace!(host = slot.host(), "Slot released");
        drop(slot);
    }

    /// Slots currently reserved across all hosts
    pub fn in_flight(&self) -> usize {
        self.max_concurrent - self.global.available_permits()
    }

    /// Host permits currently held for `host`
    ///
    /// Includes callers that hold the host permit and are still queued on the
    /// global ceiling.
    pub fn in_flight_for(&self, host: &str) -> usize {
        self.lock_hosts()
            .get(host)
            .map(|s| self.max_per_host - s.available_permits())
            .unwrap_or(0)
    }

    /// Wakes every queued waiter with `AdmissionError::Closed` and refuses
    /// further acquisitions
    pub fn close(&self) {
        self.global.close();
        for semaphore in self.lock_hosts().values() {
            semaphore.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.global.is_closed()
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.lock_hosts();

        if hosts.len() > MAX_IDLE_HOSTS {
            // Only the map holds an idle semaphore: no permits, no waiters.
            hosts.retain(|_, s| Arc::strong_count(s) > 1);
        }

        let semaphore = hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)));

        if self.global.is_closed() {
            semaphore.close();
        }

        Arc::clone(semaphore)
    }

    fn lock_hosts(&self) -> MutexGuard<'_, HashMap<String, Arc<Semaphore>>> {
        // The map is never left half-updated, so a poisoned lock is still usable.
        self.hosts.lock().unwrap_or_else(|e| e.into_inner())
    }
}
