//! Concurrency stress tests for the worker pool.
//!
//! The invariant under test: no two callers ever hold the same worker at the
//! same time, for any interleaving of acquires and releases, and the pool
//! never exceeds its configured capacity.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use steglitz::{EngineFactory, OcrEngine, PageSegMode, PoolConfig, Recognition, Result, WorkerPool};

/// Engine that detects overlapping use of the same instance.
struct ExclusiveEngine {
    in_use: AtomicBool,
    violations: Arc<AtomicUsize>,
}

#[async_trait]
impl OcrEngine for ExclusiveEngine {
    async fn recognize(&self, _image: &Path, _languages: &str, _mode: PageSegMode) -> Result<Recognition> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_use.store(false, Ordering::SeqCst);
        Ok(Recognition {
            text: "ok".to_string(),
            confidence: 99.0,
            word_count: 1,
        })
    }
}

struct ExclusiveFactory {
    violations: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
}

#[async_trait]
impl EngineFactory for ExclusiveFactory {
    async fn create(&self) -> Result<Arc<dyn OcrEngine>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ExclusiveEngine {
            in_use: AtomicBool::new(false),
            violations: Arc::clone(&self.violations),
        }))
    }
}

fn pool_config(max: usize) -> PoolConfig {
    PoolConfig {
        max_pool_size: max,
        idle_timeout_ms: 60_000,
        acquire_timeout_ms: 10_000,
        evict_interval_ms: 60_000,
        evict_batch_limit: 8,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_two_callers_share_a_worker() {
    let violations = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(ExclusiveFactory {
        violations: Arc::clone(&violations),
        created: Arc::clone(&created),
    });
    let pool = WorkerPool::new(factory, pool_config(3));

    let mut tasks = Vec::new();
    for _ in 0..24 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let lease = pool.acquire().await.unwrap();
                lease
                    .recognize(Path::new("stress.png"), "eng", PageSegMode::Auto)
                    .await
                    .unwrap();
                drop(lease);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(violations.load(Ordering::SeqCst), 0, "a worker was shared concurrently");
    assert!(created.load(Ordering::SeqCst) <= 3, "pool exceeded capacity");
    assert!(pool.live_workers() <= 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_leases_never_exceed_capacity() {
    let violations = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(ExclusiveFactory {
        violations: Arc::clone(&violations),
        created: Arc::clone(&created),
    });
    let pool = WorkerPool::new(factory, pool_config(2));

    let held = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let pool = pool.clone();
        let held = Arc::clone(&held);
        let peak = Arc::clone(&peak);
        tasks.push(tokio::spawn(async move {
            for _ in 0..4 {
                let lease = pool.acquire().await.unwrap();
                let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                held.fetch_sub(1, Ordering::SeqCst);
                drop(lease);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 2, "more leases than pool slots");
    assert_eq!(held.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_during_load_leaves_pool_empty() {
    let violations = Arc::new(AtomicUsize::new(0));
    let created = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(ExclusiveFactory {
        violations: Arc::clone(&violations),
        created: Arc::clone(&created),
    });
    let pool = WorkerPool::new(factory, pool_config(2));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            if let Ok(lease) = pool.acquire().await {
                tokio::time::sleep(Duration::from_millis(1)).await;
                drop(lease);
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    pool.shutdown().await;
    assert_eq!(pool.live_workers(), 0);
    assert_eq!(pool.idle_workers(), 0);
}
