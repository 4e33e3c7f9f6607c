//! Semaphore bounding concurrent page-rasterization work.
//!
//! Rasterizing a document is the most memory- and disk-hungry step of the
//! pipeline, so at most `max_concurrent_conversions` documents may be in
//! that phase at once. Waiters hold a visible spot in a FIFO pending queue
//! (the oldest wait time is exposed for monitoring) and give up after the
//! conversion timeout; the pipeline treats that as a conversion failure, not
//! a hard error.

use crate::config::GateConfig;
use crate::error::{Result, SteglitzError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

struct GateInner {
    semaphore: Arc<Semaphore>,
    pending: Mutex<VecDeque<(u64, Instant)>>,
    next_token: AtomicU64,
    active: AtomicUsize,
    max_concurrent: usize,
    timeout: Duration,
}

/// Bounds the number of concurrently running conversions. Cheap to clone;
/// clones share state.
#[derive(Clone)]
pub struct ConversionGate {
    inner: Arc<GateInner>,
}

/// RAII slot on the gate; dropping it releases the slot.
pub struct GatePermit {
    inner: Arc<GateInner>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.inner.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConversionGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            inner: Arc::new(GateInner {
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_conversions)),
                pending: Mutex::new(VecDeque::new()),
                next_token: AtomicU64::new(0),
                active: AtomicUsize::new(0),
                max_concurrent: config.max_concurrent_conversions,
                timeout: Duration::from_millis(config.conversion_timeout_ms),
            }),
        }
    }

    /// Wait for a conversion slot, up to the configured timeout.
    pub async fn acquire(&self) -> Result<GatePermit> {
        let token = self.inner.next_token.fetch_add(1, Ordering::SeqCst);
        let entered = Instant::now();
        self.inner.pending.lock().push_back((token, entered));

        let acquired = tokio::time::timeout(
            self.inner.timeout,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await;

        self.inner.pending.lock().retain(|(t, _)| *t != token);

        match acquired {
            Ok(Ok(permit)) => {
                self.inner.active.fetch_add(1, Ordering::SeqCst);
                Ok(GatePermit {
                    inner: Arc::clone(&self.inner),
                    _permit: permit,
                })
            }
            Ok(Err(_)) => Err(SteglitzError::conversion("conversion gate is closed")),
            Err(_) => Err(SteglitzError::conversion(format!(
                "timed out waiting {}ms for a conversion slot",
                entered.elapsed().as_millis()
            ))),
        }
    }

    /// Conversions currently holding a slot.
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Requests currently waiting for a slot.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// How long the oldest waiter has been queued, if any.
    pub fn oldest_pending(&self) -> Option<Duration> {
        self.inner.pending.lock().front().map(|(_, t)| t.elapsed())
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }
}
