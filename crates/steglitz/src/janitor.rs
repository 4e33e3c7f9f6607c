//! Tracking and reclamation of temporary disk resources.
//!
//! Every temp file or directory the pipeline creates is registered here
//! before first use and stays tracked until it has actually been deleted
//! (a missing file counts as deleted). Three caps bound the registry:
//! resource count, total size, and age. Count/size violations are resolved
//! immediately at registration time by evicting the oldest entries; age
//! violations are reclaimed by a periodic sweep that processes a bounded
//! batch per tick so it never starves foreground work.

use crate::config::JanitorConfig;
use crate::error::Result;
use crate::types::ResourceKind;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque handle for a tracked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

#[derive(Debug, Clone)]
struct TrackedResource {
    id: ResourceId,
    path: PathBuf,
    size: u64,
    created_at: Instant,
    session_id: String,
    kind: ResourceKind,
    cleanup_scheduled: bool,
}

/// Point-in-time view of the registry, for monitoring and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JanitorStats {
    pub tracked: usize,
    pub total_bytes: u64,
}

/// Registry of temporary resources with count/size/age caps.
pub struct ResourceJanitor {
    // Entries stay in registration order, so index 0 is always the oldest.
    entries: Mutex<Vec<TrackedResource>>,
    config: JanitorConfig,
}

impl ResourceJanitor {
    pub fn new(config: JanitorConfig) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Track a resource the pipeline just created. Registration must happen
    /// before the resource is first used. Exceeding the count or size cap
    /// evicts the oldest entries (deleting them from disk) until both caps
    /// hold again.
    pub fn register(&self, path: &Path, kind: ResourceKind, session_id: &str) -> ResourceId {
        let size = match kind {
            ResourceKind::Directory => 0,
            _ => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        };

        let id = ResourceId(Uuid::new_v4());
        let victims = {
            let mut entries = self.entries.lock();
            entries.push(TrackedResource {
                id,
                path: path.to_path_buf(),
                size,
                created_at: Instant::now(),
                session_id: session_id.to_string(),
                kind,
                cleanup_scheduled: false,
            });
            self.collect_cap_victims(&mut entries)
        };

        for victim in victims {
            tracing::debug!(path = %victim.path.display(), "evicting tracked resource over cap");
            if let Err(e) = remove_resource(&victim.path, victim.kind) {
                tracing::warn!(path = %victim.path.display(), error = %e, "failed to evict resource");
            }
        }

        id
    }

    /// Pop the oldest entries until count and total size are back under the
    /// caps. Called with the registry lock held; deletion happens outside.
    fn collect_cap_victims(&self, entries: &mut Vec<TrackedResource>) -> Vec<TrackedResource> {
        let mut victims = Vec::new();
        let mut total: u64 = entries.iter().map(|r| r.size).sum();

        while entries.len() > self.config.max_resource_count
            || (total > self.config.max_total_size_bytes && entries.len() > 1)
        {
            let victim = entries.remove(0);
            total -= victim.size;
            victims.push(victim);
        }

        victims
    }

    /// Arrange for one resource to be reclaimed after `delay`, independent of
    /// session cleanup. Idempotent per resource.
    pub fn schedule_cleanup(self: &Arc<Self>, id: ResourceId, delay: Duration) {
        {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.iter_mut().find(|r| r.id == id) else {
                return;
            };
            if entry.cleanup_scheduled {
                return;
            }
            entry.cleanup_scheduled = true;
        }

        let janitor = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            janitor.reclaim(id);
        });
    }

    /// Reclaim every resource tagged with the session. Returns how many were
    /// deleted (or already gone). Deletion errors other than "not found" are
    /// logged, and the entry stays tracked for a later sweep.
    pub fn cleanup_by_session(&self, session_id: &str) -> usize {
        let candidates: Vec<TrackedResource> = {
            let mut entries = self.entries.lock();
            let mut taken = Vec::new();
            let mut i = 0;
            while i < entries.len() {
                if entries[i].session_id == session_id {
                    taken.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            taken
        };

        let mut cleaned = 0;
        let mut retained = Vec::new();
        for resource in candidates {
            match remove_resource(&resource.path, resource.kind) {
                Ok(()) => cleaned += 1,
                Err(e) => {
                    tracing::warn!(
                        path = %resource.path.display(),
                        session = session_id,
                        error = %e,
                        "session cleanup failed for resource"
                    );
                    retained.push(resource);
                }
            }
        }

        if !retained.is_empty() {
            let mut entries = self.entries.lock();
            // Back at the front: these are still the oldest entries.
            for resource in retained.into_iter().rev() {
                entries.insert(0, resource);
            }
        }

        cleaned
    }

    /// Reclaim resources older than the age cap, at most `sweep_batch_limit`
    /// per call. Returns how many were reclaimed.
    pub fn sweep_expired(&self) -> usize {
        let max_age = Duration::from_millis(self.config.max_resource_age_ms);
        let victims: Vec<TrackedResource> = {
            let mut entries = self.entries.lock();
            let mut taken = Vec::new();
            let mut i = 0;
            while i < entries.len() && taken.len() < self.config.sweep_batch_limit {
                if entries[i].created_at.elapsed() > max_age {
                    taken.push(entries.remove(i));
                } else {
                    i += 1;
                }
            }
            taken
        };

        let mut cleaned = 0;
        for victim in victims {
            match remove_resource(&victim.path, victim.kind) {
                Ok(()) => cleaned += 1,
                Err(e) => {
                    tracing::warn!(path = %victim.path.display(), error = %e, "age sweep failed for resource");
                }
            }
        }
        cleaned
    }

    /// Run the age sweep on its own timer, decoupled from request serving.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let janitor = Arc::clone(self);
        let period = Duration::from_millis(janitor.config.sweep_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let reclaimed = janitor.sweep_expired();
                if reclaimed > 0 {
                    tracing::debug!(reclaimed, "janitor sweep reclaimed expired resources");
                }
            }
        })
    }

    fn reclaim(&self, id: ResourceId) {
        let resource = {
            let mut entries = self.entries.lock();
            let Some(pos) = entries.iter().position(|r| r.id == id) else {
                return;
            };
            entries.remove(pos)
        };

        if let Err(e) = remove_resource(&resource.path, resource.kind) {
            tracing::warn!(path = %resource.path.display(), error = %e, "scheduled cleanup failed");
        }
    }

    pub fn stats(&self) -> JanitorStats {
        let entries = self.entries.lock();
        JanitorStats {
            tracked: entries.len(),
            total_bytes: entries.iter().map(|r| r.size).sum(),
        }
    }
}

/// Delete a tracked resource from disk. A path that is already gone counts
/// as success.
fn remove_resource(path: &Path, kind: ResourceKind) -> Result<()> {
    let outcome = match kind {
        ResourceKind::Directory => std::fs::remove_dir_all(path),
        _ => std::fs::remove_file(path),
    };

    match outcome {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
