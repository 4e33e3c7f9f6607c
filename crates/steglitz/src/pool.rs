//! Bounded pool of reusable OCR engine instances.
//!
//! The pool is a fixed-capacity slot arena: `max_pool_size` slots, each
//! either empty or holding one worker. String worker ids exist only for log
//! correlation; all bookkeeping is by slot index. Workers are created lazily
//! through the [`EngineFactory`] and destroyed by idle eviction or shutdown.
//!
//! Waiting for a freed worker uses a notify-on-release primitive with a
//! deadline rather than polling. Acquisition is fair only in the sense of
//! "first free wins": there is no FIFO ordering across waiters, which is a
//! deliberate, documented relaxation.

use crate::config::PoolConfig;
use crate::error::{Result, SteglitzError};
use crate::ocr::{EngineFactory, OcrEngine};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinSet;

struct PooledWorker {
    id: String,
    engine: Arc<dyn OcrEngine>,
    busy: bool,
    last_used_at: Instant,
    created_at: Instant,
}

struct PoolState {
    slots: Vec<Option<PooledWorker>>,
    /// Engines currently being constructed; counted against capacity so
    /// concurrent creators cannot overshoot `max_pool_size`.
    creating: usize,
}

impl PoolState {
    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

struct PoolInner {
    state: Mutex<PoolState>,
    released: Notify,
    factory: Arc<dyn EngineFactory>,
    config: PoolConfig,
}

/// Bounded set of stateful OCR engines. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// Exclusive lease on one pooled worker. Dropping the lease marks the worker
/// idle, stamps its last-used time, and wakes one waiter; release never
/// fails.
pub struct WorkerLease {
    inner: Arc<PoolInner>,
    slot: usize,
    worker_id: String,
    engine: Arc<dyn OcrEngine>,
}

impl WorkerLease {
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }
}

impl std::ops::Deref for WorkerLease {
    type Target = dyn OcrEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        if let Some(worker) = state.slots[self.slot].as_mut() {
            worker.busy = false;
            worker.last_used_at = Instant::now();
        }
        drop(state);
        self.inner.released.notify_one();
    }
}

impl WorkerPool {
    pub fn new(factory: Arc<dyn EngineFactory>, config: PoolConfig) -> Self {
        let mut slots = Vec::with_capacity(config.max_pool_size);
        slots.resize_with(config.max_pool_size, || None);

        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState { slots, creating: 0 }),
                released: Notify::new(),
                factory,
                config,
            }),
        }
    }

    /// Acquire an exclusive lease on a worker.
    ///
    /// Hands out an idle worker when one exists; otherwise creates one if
    /// capacity allows (a factory failure leaves the pool size unchanged);
    /// otherwise waits for a release until `acquire_timeout_ms` elapses and
    /// fails with `PoolExhausted`.
    pub async fn acquire(&self) -> Result<WorkerLease> {
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.inner.config.acquire_timeout_ms);

        loop {
            if let Some(lease) = self.try_checkout() {
                return Ok(lease);
            }

            if self.try_reserve() {
                return self.create_worker().await;
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(SteglitzError::PoolExhausted {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            };

            if tokio::time::timeout(remaining, self.inner.released.notified())
                .await
                .is_err()
            {
                return Err(SteglitzError::PoolExhausted {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
        }
    }

    fn try_checkout(&self) -> Option<WorkerLease> {
        let mut state = self.inner.state.lock();
        for (slot, entry) in state.slots.iter_mut().enumerate() {
            if let Some(worker) = entry
                && !worker.busy
            {
                worker.busy = true;
                worker.last_used_at = Instant::now();
                return Some(WorkerLease {
                    inner: Arc::clone(&self.inner),
                    slot,
                    worker_id: worker.id.clone(),
                    engine: Arc::clone(&worker.engine),
                });
            }
        }
        None
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.live() + state.creating < self.inner.config.max_pool_size {
            state.creating += 1;
            true
        } else {
            false
        }
    }

    /// Runs with one creation reservation held; the reservation is returned
    /// on failure so the pool size is unchanged.
    async fn create_worker(&self) -> Result<WorkerLease> {
        let engine = match self.inner.factory.create().await {
            Ok(engine) => engine,
            Err(e) => {
                {
                    let mut state = self.inner.state.lock();
                    state.creating -= 1;
                }
                // A waiter can now take over the freed capacity.
                self.inner.released.notify_one();
                return Err(match e {
                    err @ SteglitzError::WorkerInit { .. } => err,
                    other => SteglitzError::WorkerInit {
                        message: format!("engine factory failed: {}", other),
                        source: Some(Box::new(other)),
                    },
                });
            }
        };

        let id = short_id();
        let now = Instant::now();
        let mut state = self.inner.state.lock();
        state.creating -= 1;

        let slot = state
            .slots
            .iter()
            .position(|s| s.is_none())
            .expect("reservation guarantees a free slot");
        state.slots[slot] = Some(PooledWorker {
            id: id.clone(),
            engine: Arc::clone(&engine),
            busy: true,
            last_used_at: now,
            created_at: now,
        });
        drop(state);

        tracing::debug!(worker = %id, slot, "created pool worker");
        Ok(WorkerLease {
            inner: Arc::clone(&self.inner),
            slot,
            worker_id: id,
            engine,
        })
    }

    /// Destroy idle workers past the idle timeout, at most `evict_batch_limit`
    /// per call, never dropping the pool below one live worker.
    pub fn evict_idle(&self) -> usize {
        let idle_timeout = Duration::from_millis(self.inner.config.idle_timeout_ms);
        let mut evicted_engines = Vec::new();

        {
            let mut state = self.inner.state.lock();
            let mut live = state.live();
            for entry in state.slots.iter_mut() {
                if live <= 1 || evicted_engines.len() >= self.inner.config.evict_batch_limit {
                    break;
                }
                let expired = matches!(
                    entry,
                    Some(worker) if !worker.busy && worker.last_used_at.elapsed() > idle_timeout
                );
                if expired
                    && let Some(worker) = entry.take()
                {
                    live -= 1;
                    tracing::debug!(
                        worker = %worker.id,
                        age_ms = worker.created_at.elapsed().as_millis() as u64,
                        "evicting idle pool worker"
                    );
                    evicted_engines.push(worker.engine);
                }
            }
        }

        let evicted = evicted_engines.len();
        for engine in evicted_engines {
            tokio::spawn(async move {
                if let Err(e) = engine.shutdown().await {
                    tracing::warn!(error = %e, "idle worker shutdown failed");
                }
            });
        }
        evicted
    }

    /// Run idle eviction on its own timer, decoupled from request serving.
    pub fn spawn_evictor(&self) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        let period = Duration::from_millis(pool.inner.config.evict_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                pool.evict_idle();
            }
        })
    }

    /// Terminate every worker concurrently, awaiting all terminations.
    /// Individual failures are logged, never propagated; the pool is empty
    /// afterwards.
    pub async fn shutdown(&self) {
        let engines: Vec<(String, Arc<dyn OcrEngine>)> = {
            let mut state = self.inner.state.lock();
            state
                .slots
                .iter_mut()
                .filter_map(|slot| slot.take())
                .map(|worker| (worker.id, worker.engine))
                .collect()
        };

        let mut set = JoinSet::new();
        for (id, engine) in engines {
            set.spawn(async move {
                if let Err(e) = engine.shutdown().await {
                    tracing::warn!(worker = %id, error = %e, "worker shutdown failed");
                }
            });
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "worker shutdown task panicked");
            }
        }

        // Wake any stragglers so they fail fast instead of waiting out
        // their full timeout.
        self.inner.released.notify_waiters();
    }

    /// Number of live workers (busy or idle).
    pub fn live_workers(&self) -> usize {
        self.inner.state.lock().live()
    }

    /// Number of idle workers available for checkout.
    pub fn idle_workers(&self) -> usize {
        self.inner
            .state
            .lock()
            .slots
            .iter()
            .filter(|s| matches!(s, Some(w) if !w.busy))
            .count()
    }
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::PageSegMode;
    use crate::types::Recognition;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEngine;

    #[async_trait]
    impl OcrEngine for StubEngine {
        async fn recognize(&self, _image: &Path, _languages: &str, _mode: PageSegMode) -> Result<Recognition> {
            Ok(Recognition {
                text: "stub".to_string(),
                confidence: 90.0,
                word_count: 1,
            })
        }
    }

    struct StubFactory {
        created: AtomicUsize,
        fail: bool,
    }

    impl StubFactory {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                created: AtomicUsize::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                created: AtomicUsize::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl EngineFactory for StubFactory {
        async fn create(&self) -> Result<Arc<dyn OcrEngine>> {
            if self.fail {
                return Err(SteglitzError::worker_init("no language data"));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubEngine))
        }
    }

    fn config(max: usize, acquire_timeout_ms: u64) -> PoolConfig {
        PoolConfig {
            max_pool_size: max,
            idle_timeout_ms: 60_000,
            acquire_timeout_ms,
            evict_interval_ms: 60_000,
            evict_batch_limit: 8,
        }
    }

    #[tokio::test]
    async fn test_acquire_creates_lazily() {
        let factory = StubFactory::new();
        let pool = WorkerPool::new(factory.clone(), config(2, 100));
        assert_eq!(pool.live_workers(), 0);

        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.live_workers(), 1);
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        drop(lease);

        // Reuses the idle worker instead of creating another.
        let _lease = pool.acquire().await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_factory_failure_leaves_pool_unchanged() {
        let pool = WorkerPool::new(StubFactory::failing(), config(2, 100));
        let result = pool.acquire().await;
        assert!(matches!(result, Err(SteglitzError::WorkerInit { .. })));
        assert_eq!(pool.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_times_out() {
        let pool = WorkerPool::new(StubFactory::new(), config(1, 50));
        let held = pool.acquire().await.unwrap();

        let started = Instant::now();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(SteglitzError::PoolExhausted { .. })));
        assert!(started.elapsed() >= Duration::from_millis(50));
        drop(held);
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_release() {
        let pool = WorkerPool::new(StubFactory::new(), config(1, 5_000));
        let held = pool.acquire().await.unwrap();

        let waiter_pool = pool.clone();
        let waiter = tokio::spawn(async move { waiter_pool.acquire().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        let lease = waiter.await.unwrap().unwrap();
        assert_eq!(pool.live_workers(), 1);
        drop(lease);
    }

    #[tokio::test]
    async fn test_no_double_checkout() {
        let pool = WorkerPool::new(StubFactory::new(), config(2, 1_000));
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.worker_id(), b.worker_id());
    }

    #[tokio::test]
    async fn test_eviction_keeps_one_worker() {
        let pool = WorkerPool::new(
            StubFactory::new(),
            PoolConfig {
                idle_timeout_ms: 0,
                ..config(3, 1_000)
            },
        );

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        let c = pool.acquire().await.unwrap();
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.live_workers(), 3);

        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.evict_idle();
        assert_eq!(pool.live_workers(), 1, "eviction must never empty the pool");
    }

    #[tokio::test]
    async fn test_eviction_skips_busy_workers() {
        let pool = WorkerPool::new(
            StubFactory::new(),
            PoolConfig {
                idle_timeout_ms: 0,
                ..config(2, 1_000)
            },
        );

        let busy = pool.acquire().await.unwrap();
        let idle = pool.acquire().await.unwrap();
        drop(idle);
        tokio::time::sleep(Duration::from_millis(5)).await;

        pool.evict_idle();
        assert_eq!(pool.live_workers(), 1);
        // The survivor is the busy one.
        drop(busy);
        assert_eq!(pool.idle_workers(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_clears_pool() {
        let pool = WorkerPool::new(StubFactory::new(), config(2, 1_000));
        let a = pool.acquire().await.unwrap();
        drop(a);
        assert_eq!(pool.live_workers(), 1);

        pool.shutdown().await;
        assert_eq!(pool.live_workers(), 0);
    }
}
