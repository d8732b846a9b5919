//! A lazily initialized, single-flight cache for the prover's setup artifacts.
//!
//! Loading the circuit program and proving key means fetching and parsing
//! megabytes of data, so it happens at most once per cache no matter how many
//! callers race for it. Callers that arrive during a load share its outcome,
//! failures included. A failed load leaves the cache empty, and the next
//! caller starts over.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crisp_common::errors::VoteError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::prover::CryptoContext;

/// The cache holding the prover's [`CryptoContext`]
pub type CryptoContextCache = ContextCache<CryptoContext>;

/// The outcome of a load as seen by the callers sharing it, `None` while the
/// load runs
type SharedOutcome<T> = Option<Result<Arc<T>, String>>;

/// The contents of a cache
enum Slot<T> {
    /// Nothing is cached and no load is running
    Empty,
    /// A load is running, publishing its outcome on the channel
    Loading(watch::Receiver<SharedOutcome<T>>),
    /// The value is cached
    Ready(Arc<T>),
}

/// The cache's state behind its lock
struct Inner<T> {
    /// The cached value or the load in flight
    slot: Slot<T>,
    /// Bumped on every load and reset, so that a stale load cannot overwrite
    /// the slot
    generation: u64,
}

/// What a caller of [`ContextCache::get_or_init`] has to do
enum Role<T> {
    /// Return the cached value
    Cached(Arc<T>),
    /// Wait for the load of the given generation
    Follow(u64, watch::Receiver<SharedOutcome<T>>),
    /// Run the load of the given generation, publishing its outcome
    Lead(u64, watch::Sender<SharedOutcome<T>>),
}

/// A memoized value that is initialized on first use.
///
/// Concurrent callers of [`ContextCache::get_or_init`] share one in-flight
/// initialization and its result. [`ContextCache::reset`] empties the cache,
/// while callers already holding the old value keep a consistent view of it
pub struct ContextCache<T> {
    /// The slot and its generation
    inner: Mutex<Inner<T>>,
}

impl<T> Default for ContextCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ContextCache<T> {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slot: Slot::Empty,
                generation: 0,
            }),
        }
    }

    /// Locks the cache's state.
    ///
    /// No panic can happen while the lock is held, so a poisoned lock still
    /// guards a valid slot
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decides whether the caller returns, waits, or loads
    fn claim(&self) -> Role<T> {
        let mut inner = self.lock();
        match &inner.slot {
            Slot::Ready(value) => Role::Cached(value.clone()),
            Slot::Loading(outcome) => Role::Follow(inner.generation, outcome.clone()),
            Slot::Empty => {
                let (sender, outcome) = watch::channel(None);
                inner.generation += 1;
                inner.slot = Slot::Loading(outcome);
                Role::Lead(inner.generation, sender)
            }
        }
    }

    /// Stores the outcome of the load of `generation`, unless the cache was
    /// reset or reloaded since
    fn settle(&self, generation: u64, result: &Result<Arc<T>, VoteError>) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        inner.slot = match result {
            Ok(value) => Slot::Ready(value.clone()),
            Err(_) => Slot::Empty,
        };
    }

    /// Empties the slot of a load that was dropped before it finished
    fn release(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && matches!(inner.slot, Slot::Loading(_)) {
            inner.slot = Slot::Empty;
        }
    }

    /// Returns the cached value, running `loader` to produce it if the cache
    /// is empty.
    ///
    /// Only one loader runs at a time; callers arriving while it runs receive
    /// its result, success or failure, without running their own. Loader
    /// failures are surfaced as [`VoteError::Initialization`] and are not
    /// cached
    pub async fn get_or_init<F, Fut>(&self, loader: F) -> Result<Arc<T>, VoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, VoteError>>,
    {
        loop {
            match self.claim() {
                Role::Cached(value) => return Ok(value),
                Role::Follow(generation, mut outcome) => {
                    let shared = match outcome.wait_for(Option::is_some).await {
                        Ok(shared) => (*shared).clone(),
                        Err(_) => None,
                    };
                    match shared {
                        Some(Ok(value)) => return Ok(value),
                        Some(Err(msg)) => return Err(VoteError::Initialization(msg)),
                        // The leading caller was dropped mid-load
                        None => self.release(generation),
                    }
                }
                Role::Lead(generation, sender) => {
                    info!("initializing crypto context");
                    let result = match loader().await {
                        Ok(value) => {
                            debug!("crypto context initialized");
                            Ok(Arc::new(value))
                        }
                        Err(e) => {
                            warn!(error = %e, "crypto context initialization failed");
                            match e {
                                e @ VoteError::Initialization(_) => Err(e),
                                e => Err(VoteError::Initialization(e.to_string())),
                            }
                        }
                    };

                    self.settle(generation, &result);
                    sender.send_replace(Some(match &result {
                        Ok(value) => Ok(value.clone()),
                        Err(VoteError::Initialization(msg)) => Err(msg.clone()),
                        Err(e) => Err(e.to_string()),
                    }));
                    return result;
                }
            }
        }
    }

    /// Returns the cached value, if it has been initialized
    pub fn get(&self) -> Option<Arc<T>> {
        match &self.lock().slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether the cache holds a value
    pub fn is_initialized(&self) -> bool {
        matches!(self.lock().slot, Slot::Ready(_))
    }

    /// Drops the cached value, so that the next caller re-initializes it.
    ///
    /// An initialization already in flight still completes for the callers
    /// waiting on it, but its value is not stored
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.slot = Slot::Empty;
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use crisp_common::errors::VoteError;
    use eyre::Result;
    use tokio::time::sleep;

    use super::ContextCache;

    /// A loader that counts its invocations and takes a while to finish
    async fn counting_loader(calls: Arc<AtomicUsize>) -> Result<u64, VoteError> {
        calls.fetch_add(1, Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        Ok(42)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() -> Result<()> {
        let cache = Arc::new(ContextCache::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move { cache.get_or_init(|| counting_loader(calls)).await })
            })
            .collect();

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await??);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert_eq!(*values[0], 42);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() -> Result<()> {
        let cache = Arc::new(ContextCache::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_init(|| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_millis(50)).await;
                            Err(VoteError::Network("connection refused".to_string()))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let res = handle.await?;
            assert!(matches!(res, Err(VoteError::Initialization(msg)) if msg.contains("connection refused")));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_initialized());

        // The failure is not cached
        let value = cache.get_or_init(|| counting_loader(calls.clone())).await?;
        assert_eq!(*value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_load_is_taken_over() -> Result<()> {
        let cache = Arc::new(ContextCache::<u64>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let stalled = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_init(|| async {
                        sleep(Duration::from_secs(60)).await;
                        Ok(0)
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(10)).await;

        let waiting = {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move { cache.get_or_init(|| counting_loader(calls)).await })
        };
        sleep(Duration::from_millis(10)).await;
        stalled.abort();

        assert_eq!(*waiting.await??, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get().as_deref(), Some(&42));

        Ok(())
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() -> Result<()> {
        let cache = ContextCache::<u64>::new();

        let res = cache
            .get_or_init(|| async { Err(VoteError::Network("connection refused".to_string())) })
            .await;
        assert!(matches!(res, Err(VoteError::Initialization(msg)) if msg.contains("connection refused")));
        assert!(!cache.is_initialized());

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get_or_init(|| counting_loader(calls.clone())).await?;
        assert_eq!(*value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_later_callers_skip_the_loader() -> Result<()> {
        let cache = ContextCache::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_init(|| counting_loader(calls.clone())).await?;
        let second = cache.get_or_init(|| counting_loader(calls.clone())).await?;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get().as_deref(), Some(&42));

        Ok(())
    }

    #[tokio::test]
    async fn test_reset_forces_reload() -> Result<()> {
        let cache = ContextCache::<u64>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let before = cache.get_or_init(|| counting_loader(calls.clone())).await?;
        cache.reset();
        assert!(cache.get().is_none());

        let after = cache.get_or_init(|| counting_loader(calls.clone())).await?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!Arc::ptr_eq(&before, &after));

        Ok(())
    }
}
