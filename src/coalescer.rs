//! In-flight request coalescing.
//!
//! Concurrent identical requests (same cache key) share one underlying
//! execution: the first caller registers a shared future, later callers with
//! the same key await the same future and receive the same outcome. The
//! registry entry is removed on settlement so a later call performs fresh
//! work. Different keys are never serialized against each other.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

/// The shared outcome of a coalesced execution. Cloneable so every waiter
/// receives it; the original error is flattened to its display string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalesceError(pub String);

impl fmt::Display for CoalesceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "coalesced request failed: {}", self.0)
    }
}

impl std::error::Error for CoalesceError {}

type InFlight<T> = Shared<BoxFuture<'static, Result<T, CoalesceError>>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Executions actually started.
    pub unique_calls: u64,
    /// Callers that piggybacked on an already in-flight execution.
    pub coalesced_calls: u64,
}

pub struct RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    unique_calls: AtomicU64,
    coalesced_calls: AtomicU64,
}

impl<T> Default for RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            unique_calls: AtomicU64::new(0),
            coalesced_calls: AtomicU64::new(0),
        }
    }

    /// Returns the in-flight result for `key` if one exists, otherwise
    /// invokes `factory` exactly once and registers its future under `key`
    /// until it settles.
    pub async fn request<F, Fut>(&self, key: &str, factory: F) -> Result<T, CoalesceError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = {
            let mut map = self.in_flight.lock().expect("coalescer registry poisoned");
            if let Some(existing) = map.get(key) {
                self.coalesced_calls.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(key, "coalesced onto in-flight request");
                existing.clone()
            } else {
                self.unique_calls.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.in_flight);
                let owned_key = key.to_string();
                let inner = factory();
                let settled: BoxFuture<'static, Result<T, CoalesceError>> = async move {
                    let result = inner.await.map_err(|e| CoalesceError(e.to_string()));
                    // Settlement (success or failure) clears the entry so the
                    // next caller performs fresh work.
                    registry
                        .lock()
                        .expect("coalescer registry poisoned")
                        .remove(&owned_key);
                    result
                }
                .boxed();
                let shared = settled.shared();
                map.insert(key.to_string(), shared.clone());
                shared
            }
        };
        shared.await
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            unique_calls: self.unique_calls.load(Ordering::Relaxed),
            coalesced_calls: self.coalesced_calls.load(Ordering::Relaxed),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("coalescer registry poisoned")
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn concurrent_same_key_executes_factory_once() {
        let coalescer = Arc::new(RequestCoalescer::<u32>::new());
        let executions = Arc::new(AtomicU32::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = Arc::clone(&coalescer);
            let executions = Arc::clone(&executions);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coalescer
                    .request("dishes:veg", move || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Ok(99)
                    })
                    .await
            }));
        }

        // Let every caller reach the registry before the factory completes.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        release.notify_waiters();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(99));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        let stats = coalescer.stats();
        assert_eq!(stats.unique_calls, 1);
        assert_eq!(stats.coalesced_calls, 7);
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn settlement_clears_key_for_fresh_work() {
        let coalescer = RequestCoalescer::<u32>::new();
        let executions = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let executions = Arc::clone(&executions);
            let result = coalescer
                .request("k", move || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                })
                .await;
            assert_eq!(result, Ok(1));
        }
        // sequential calls are separate generations
        assert_eq!(executions.load(Ordering::SeqCst), 2);
        assert_eq!(coalescer.stats().unique_calls, 2);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let coalescer = Arc::new(RequestCoalescer::<&'static str>::new());
        let gate_a = Arc::new(Notify::new());
        let gate_b = Arc::new(Notify::new());

        // a completes only after b has completed; if keys serialized each
        // other this would deadlock.
        let a = {
            let coalescer = Arc::clone(&coalescer);
            let gate_a = Arc::clone(&gate_a);
            tokio::spawn(async move {
                coalescer
                    .request("a", move || async move {
                        gate_a.notified().await;
                        Ok("a done")
                    })
                    .await
            })
        };
        let b = {
            let coalescer = Arc::clone(&coalescer);
            let gate_b = Arc::clone(&gate_b);
            tokio::spawn(async move {
                coalescer
                    .request("b", move || async move {
                        gate_b.notified().await;
                        Ok("b done")
                    })
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(coalescer.in_flight_count(), 2);
        gate_b.notify_waiters();
        assert_eq!(b.await.unwrap(), Ok("b done"));
        gate_a.notify_waiters();
        assert_eq!(a.await.unwrap(), Ok("a done"));
    }

    #[tokio::test]
    async fn failure_is_shared_and_then_cleared() {
        let coalescer = Arc::new(RequestCoalescer::<u32>::new());
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..3 {
            let coalescer = Arc::clone(&coalescer);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coalescer
                    .request("boom", move || async move {
                        release.notified().await;
                        Err(anyhow!("quota exhausted"))
                    })
                    .await
            }));
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        release.notify_waiters();

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(err.0.contains("quota exhausted"));
        }
        assert_eq!(coalescer.in_flight_count(), 0);

        // a fresh call after failure gets fresh work
        let ok = coalescer.request("boom", || async { Ok(5) }).await;
        assert_eq!(ok, Ok(5));
    }
}
