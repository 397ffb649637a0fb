//! Single-flight coalescing.
//!
//! At most one evaluation per key is in progress at a time. The first caller
//! spawns the work on the runtime; everyone arriving while it runs
//! subscribes to the same `watch` channel. Because the work lives in its own
//! task, a caller that gives up (timeout or cancellation) never cancels the
//! shared evaluation.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

/// Why a caller did not get a value out of a flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlightError {
    /// The caller stopped waiting before the work finished.
    #[error("Timed out waiting for in-flight evaluation")]
    Timeout,

    /// The work ended without producing a value (it panicked).
    #[error("In-flight evaluation was abandoned")]
    Abandoned,
}

type Flights<K, V> = DashMap<K, watch::Receiver<Option<V>>>;

/// Table of in-progress evaluations keyed by `K`.
pub struct SingleFlight<K, V> {
    flights: Arc<Flights<K, V>>,
    joins: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            joins: AtomicU64::new(0),
        }
    }
}

impl<K, V> std::fmt::Debug for SingleFlight<K, V>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.flights.len())
            .field("joins", &self.joins.load(Ordering::Relaxed))
            .finish()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` for `key` unless an evaluation is already in flight, in
    /// which case this call joins it. Waits at most `wait` for the value.
    ///
    /// `work` is only called by the leader. Its future runs in a spawned task
    /// and completes even if every caller stops waiting.
    ///
    /// # Errors
    ///
    /// - [`FlightError::Timeout`] if the value is not ready within `wait`.
    /// - [`FlightError::Abandoned`] if the work panicked.
    pub async fn run<F, Fut>(&self, key: K, wait: Duration, work: F) -> Result<V, FlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let (mut rx, leader) = match self.flights.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.joins.fetch_add(1, Ordering::Relaxed);
                (entry.get().clone(), None)
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = watch::channel(None);
                entry.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        if let Some(tx) = leader {
            // Built before calling `work` so the slot is released even if
            // building the future panics.
            let guard = FlightGuard {
                flights: Arc::clone(&self.flights),
                key,
                rx: rx.clone(),
            };
            let fut = work();
            tokio::spawn(async move {
                let _guard = guard;
                let value = fut.await;
                tx.send_replace(Some(value));
            });
        }

        match tokio::time::timeout(wait, rx.wait_for(Option::is_some)).await {
            Ok(Ok(value)) => value.as_ref().cloned().ok_or(FlightError::Abandoned),
            Ok(Err(_)) => Err(FlightError::Abandoned),
            Err(_) => Err(FlightError::Timeout),
        }
    }

    /// Number of evaluations currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }

    /// Number of calls that joined an existing evaluation.
    #[must_use]
    pub fn joins(&self) -> u64 {
        self.joins.load(Ordering::Relaxed)
    }
}

/// Releases a flight slot when the owning task finishes or unwinds.
struct FlightGuard<K, V>
where
    K: Eq + Hash,
{
    flights: Arc<Flights<K, V>>,
    key: K,
    rx: watch::Receiver<Option<V>>,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        self.flights
            .remove_if(&self.key, |_, current| current.same_channel(&self.rx));
    }
}
