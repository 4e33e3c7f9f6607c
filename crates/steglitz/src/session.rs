//! Per-extraction session bookkeeping and telemetry events.
//!
//! A session covers one end-to-end extraction: it owns the session id used
//! for resource tagging and log correlation, and an ordered list of stage
//! records. Stage transitions and the final outcome are emitted as
//! structured `tracing` events for an external collaborator to aggregate.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One pipeline stage as it actually ran.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub name: &'static str,
    pub started_at: Instant,
    pub duration: Duration,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Bookkeeping for one extraction run. Finalized exactly once; records are
/// never mutated afterwards.
#[derive(Debug)]
pub struct ExtractionSession {
    session_id: String,
    pdf_path: PathBuf,
    page_count: usize,
    stages: Vec<StageRecord>,
    started_at: Instant,
    finalized: bool,
}

impl ExtractionSession {
    pub fn new(pdf_path: &Path) -> Self {
        let session_id = Uuid::new_v4().simple().to_string();
        tracing::info!(session = %session_id, pdf = %pdf_path.display(), "extraction session started");
        Self {
            session_id,
            pdf_path: pdf_path.to_path_buf(),
            page_count: 0,
            stages: Vec::new(),
            started_at: Instant::now(),
            finalized: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn pdf_path(&self) -> &Path {
        &self.pdf_path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn set_page_count(&mut self, page_count: usize) {
        self.page_count = page_count;
    }

    /// Mark a stage as started; pass the returned instant to
    /// [`Self::stage_finished`].
    pub fn stage_started(&self, name: &'static str) -> Instant {
        tracing::debug!(session = %self.session_id, stage = name, "stage started");
        Instant::now()
    }

    pub fn stage_finished(&mut self, name: &'static str, started_at: Instant, error: Option<&str>) {
        debug_assert!(!self.finalized, "stage recorded after finalize");
        let duration = started_at.elapsed();
        let success = error.is_none();
        tracing::info!(
            session = %self.session_id,
            stage = name,
            success,
            duration_ms = duration.as_millis() as u64,
            error = error.unwrap_or_default(),
            "stage finished"
        );
        self.stages.push(StageRecord {
            name,
            started_at,
            duration,
            success,
            error_message: error.map(str::to_string),
        });
    }

    /// Close the session. Idempotent calls are a bug; the first one wins.
    pub fn finalize(&mut self, success: bool) {
        debug_assert!(!self.finalized, "session finalized twice");
        if self.finalized {
            return;
        }
        self.finalized = true;
        tracing::info!(
            session = %self.session_id,
            success,
            page_count = self.page_count,
            stages = self.stages.len(),
            duration_ms = self.elapsed().as_millis() as u64,
            "extraction session finished"
        );
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }
}
