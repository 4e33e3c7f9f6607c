//! Document extraction pipeline.
//!
//! One [`ExtractionPipeline`] instance owns the worker pool, the conversion
//! gate, and the resource janitor, and is shared by all concurrent
//! extraction runs. Each run walks the same stages: parse the PDF, classify
//! it as text-based or scanned, then either return the embedded text layer
//! directly or rasterize pages and recognize them with pooled OCR engines.
//! Every failure on the scanned path routes through the fallback stage, and
//! cleanup runs on every exit path.

use crate::capability::{Capabilities, probe_capabilities};
use crate::classify::{Classification, classify};
use crate::config::PipelineConfig;
use crate::error::{Result, SteglitzError};
use crate::gate::ConversionGate;
use crate::janitor::ResourceJanitor;
use crate::ocr::{EngineFactory, PageSegMode, TesseractCliFactory};
use crate::pool::WorkerPool;
use crate::raster::{PageRasterizer, PdftoppmRasterizer, RasterRequest};
use crate::session::ExtractionSession;
use crate::text::{merge_pages, split_pages};
use crate::types::{
    ExtractionDiagnostics, ExtractionMethod, ExtractionResult, PageSummary, Recognition, RenderedPage, ResourceKind,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Why the scanned path gave up and degraded to the fallback stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FallbackTrigger {
    RasterizationUnavailable,
    GateTimeout,
    ConversionFailed,
    OcrFailed,
}

impl FallbackTrigger {
    /// Confidence of a fallback result: OCR that ran and failed says more
    /// about the document than OCR that never ran, so it scores lower.
    fn confidence(self) -> f64 {
        match self {
            Self::OcrFailed => 25.0,
            _ => 50.0,
        }
    }
}

/// Outcome of the scanned path, threaded between stages as a value.
enum ScanStage {
    Completed {
        pages: Vec<PageOcr>,
    },
    Fallback {
        trigger: FallbackTrigger,
        detail: String,
        attempted_pages: usize,
        pages_succeeded: usize,
    },
}

#[derive(Debug, Clone)]
struct PageOcr {
    page_number: usize,
    text: String,
    confidence: f64,
    succeeded: bool,
}

struct ParsedDocument {
    page_count: usize,
    text: String,
    page_texts: Vec<PageSummary>,
}

/// Orchestrates classification, rasterization, pooled OCR, fallback, and
/// cleanup for PDF documents.
pub struct ExtractionPipeline {
    config: PipelineConfig,
    capabilities: Capabilities,
    pool: WorkerPool,
    gate: ConversionGate,
    janitor: Arc<ResourceJanitor>,
    rasterizer: Arc<dyn PageRasterizer>,
}

impl ExtractionPipeline {
    /// Build a pipeline over explicit collaborators. The capability set is
    /// taken as given and never re-probed.
    pub fn new(
        config: PipelineConfig,
        capabilities: Capabilities,
        factory: Arc<dyn EngineFactory>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(factory, config.pool.clone());
        let gate = ConversionGate::new(&config.gate);
        let janitor = Arc::new(ResourceJanitor::new(config.janitor.clone()));
        Ok(Self {
            config,
            capabilities,
            pool,
            gate,
            janitor,
            rasterizer,
        })
    }

    /// Build a pipeline over the real toolchain: probes rasterization
    /// support once and wires the tesseract CLI engine factory.
    pub async fn connect(config: PipelineConfig) -> Result<Self> {
        let capabilities = probe_capabilities().await;
        let factory = Arc::new(TesseractCliFactory::new(
            &config.ocr.languages,
            &config.ocr.widened_languages,
            Duration::from_millis(config.ocr.ocr_timeout_ms),
        ));
        let rasterizer = Arc::new(PdftoppmRasterizer::new(Duration::from_millis(
            config.ocr.raster_timeout_ms,
        )));
        Self::new(config, capabilities, factory, rasterizer)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn gate(&self) -> &ConversionGate {
        &self.gate
    }

    pub fn janitor(&self) -> &Arc<ResourceJanitor> {
        &self.janitor
    }

    /// Start the idle-eviction and age-sweep timers. The returned handles can
    /// be aborted at shutdown.
    pub fn spawn_maintenance(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![self.pool.spawn_evictor(), self.janitor.spawn_sweeper()]
    }

    /// Terminate all pooled workers. Call once, after in-flight extractions
    /// have drained.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Extract text and per-page summaries from one PDF.
    pub async fn extract_file(&self, pdf_path: &Path) -> Result<ExtractionResult> {
        let mut session = ExtractionSession::new(pdf_path);

        let started = session.stage_started("parse");
        let parsed = match self.parse(pdf_path).await {
            Ok(parsed) => {
                session.stage_finished("parse", started, None);
                parsed
            }
            Err(e) => {
                session.stage_finished("parse", started, Some(&e.to_string()));
                self.cleanup(&mut session);
                session.finalize(false);
                return Err(e);
            }
        };
        session.set_page_count(parsed.page_count);

        let started = session.stage_started("classify");
        let classification = classify(&parsed.text, parsed.page_count, &self.config.classifier);
        session.stage_finished("classify", started, None);
        tracing::debug!(
            session = %session.session_id(),
            scanned = classification.is_scanned,
            reason = classification.reason,
            pages = parsed.page_count,
            "document classified"
        );

        if !classification.is_scanned {
            let started = session.stage_started("direct");
            let result = self.direct_result(&session, &parsed, &classification);
            session.stage_finished("direct", started, None);
            self.cleanup(&mut session);
            session.finalize(true);
            return Ok(result);
        }

        let outcome = self.convert_and_ocr(&mut session, &parsed).await;

        match outcome {
            ScanStage::Completed { pages } => {
                let result = self.ocr_result(&session, &classification, pages);
                self.cleanup(&mut session);
                session.finalize(true);
                Ok(result)
            }
            ScanStage::Fallback {
                trigger,
                detail,
                attempted_pages,
                pages_succeeded,
            } => {
                let started = session.stage_started("fallback");
                match self.fallback_result(
                    &session,
                    &parsed,
                    &classification,
                    trigger,
                    &detail,
                    attempted_pages,
                    pages_succeeded,
                ) {
                    Ok(result) => {
                        session.stage_finished("fallback", started, None);
                        self.cleanup(&mut session);
                        session.finalize(true);
                        Ok(result)
                    }
                    Err(e) => {
                        session.stage_finished("fallback", started, Some(&e.to_string()));
                        self.cleanup(&mut session);
                        session.finalize(false);
                        Err(e)
                    }
                }
            }
        }
    }

    async fn parse(&self, path: &Path) -> Result<ParsedDocument> {
        let bytes = tokio::fs::read(path).await?;
        let doc = lopdf::Document::load_mem(&bytes)
            .map_err(|e| SteglitzError::parsing_with_source(format!("failed to parse {}", path.display()), e))?;

        let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
        let mut page_texts = Vec::with_capacity(page_numbers.len());
        for number in &page_numbers {
            // A page without an extractable text layer is normal for scans;
            // it contributes an empty summary, not an error.
            let text = doc.extract_text(&[*number]).unwrap_or_default();
            page_texts.push(PageSummary {
                page_number: *number as usize,
                text: text.trim().to_string(),
            });
        }

        let text = page_texts
            .iter()
            .map(|p| p.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ParsedDocument {
            page_count: page_numbers.len(),
            text,
            page_texts,
        })
    }

    async fn convert_and_ocr(&self, session: &mut ExtractionSession, parsed: &ParsedDocument) -> ScanStage {
        if !self.capabilities.rasterization_available {
            return ScanStage::Fallback {
                trigger: FallbackTrigger::RasterizationUnavailable,
                detail: format!(
                    "page rasterization is unavailable: {}",
                    self.capabilities.reasons.join("; ")
                ),
                attempted_pages: 0,
                pages_succeeded: 0,
            };
        }

        let started = session.stage_started("convert");
        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                session.stage_finished("convert", started, Some(&e.to_string()));
                return ScanStage::Fallback {
                    trigger: FallbackTrigger::GateTimeout,
                    detail: e.to_string(),
                    attempted_pages: 0,
                    pages_succeeded: 0,
                };
            }
        };

        let scratch = std::env::temp_dir().join(format!("steglitz-{}", session.session_id()));
        if let Err(e) = tokio::fs::create_dir_all(&scratch).await {
            session.stage_finished("convert", started, Some(&e.to_string()));
            return ScanStage::Fallback {
                trigger: FallbackTrigger::ConversionFailed,
                detail: format!("failed to create scratch directory: {}", e),
                attempted_pages: 0,
                pages_succeeded: 0,
            };
        }
        self.janitor
            .register(&scratch, ResourceKind::Directory, session.session_id());

        let request = RasterRequest {
            pdf_path: session.pdf_path().to_path_buf(),
            first_page: 1,
            last_page: parsed.page_count,
            dpi: self.config.ocr.dpi,
            output_prefix: scratch.join("page"),
        };
        let rendered = match self.rasterizer.rasterize(&request).await {
            Ok(rendered) => rendered,
            Err(e) => {
                session.stage_finished("convert", started, Some(&e.to_string()));
                return ScanStage::Fallback {
                    trigger: FallbackTrigger::ConversionFailed,
                    detail: e.to_string(),
                    attempted_pages: 0,
                    pages_succeeded: 0,
                };
            }
        };
        for page in &rendered {
            self.janitor.register(&page.path, ResourceKind::Image, session.session_id());
        }
        session.stage_finished("convert", started, None);

        let started = session.stage_started("ocr");
        let mut pages = Vec::with_capacity(rendered.len());
        for page in &rendered {
            pages.push(self.ocr_page(session, page).await);
        }
        drop(permit);

        let attempted_pages = pages.len();
        let pages_succeeded = pages.iter().filter(|p| p.succeeded).count();
        if pages_succeeded == 0 {
            session.stage_finished("ocr", started, Some("no page produced usable text"));
            return ScanStage::Fallback {
                trigger: FallbackTrigger::OcrFailed,
                detail: format!("recognition failed on all {} pages", attempted_pages),
                attempted_pages,
                pages_succeeded,
            };
        }
        session.stage_finished("ocr", started, None);

        ScanStage::Completed { pages }
    }

    /// Recognize one page with a pooled worker, retrying once with a widened
    /// language set and an alternate segmentation mode when the first pass
    /// comes back short or low-confidence. The worker is released before the
    /// next page starts.
    async fn ocr_page(&self, session: &ExtractionSession, page: &RenderedPage) -> PageOcr {
        let failed = || PageOcr {
            page_number: page.page_number,
            text: String::new(),
            confidence: 0.0,
            succeeded: false,
        };

        let lease = match self.pool.acquire().await {
            Ok(lease) => lease,
            Err(e) => {
                tracing::warn!(
                    session = %session.session_id(),
                    page = page.page_number,
                    error = %e,
                    "no OCR worker available for page"
                );
                return failed();
            }
        };

        let ocr = &self.config.ocr;
        let primary_mode = PageSegMode::from_u8(ocr.primary_psm).unwrap_or(PageSegMode::Auto);
        let retry_mode = PageSegMode::from_u8(ocr.retry_psm).unwrap_or(PageSegMode::SingleBlock);

        let recognition = match lease.recognize(&page.path, &ocr.languages, primary_mode).await {
            Ok(first) if !needs_retry(&first, ocr.retry_min_text_len, ocr.retry_confidence_floor) => Some(first),
            Ok(first) => {
                tracing::debug!(
                    session = %session.session_id(),
                    page = page.page_number,
                    confidence = first.confidence,
                    "retrying page with widened language set"
                );
                match lease.recognize(&page.path, &ocr.widened_languages, retry_mode).await {
                    Ok(second) => Some(pick_better(first, second)),
                    Err(e) => {
                        tracing::debug!(page = page.page_number, error = %e, "retry pass failed, keeping first");
                        Some(first)
                    }
                }
            }
            Err(e) => {
                tracing::debug!(
                    session = %session.session_id(),
                    page = page.page_number,
                    error = %e,
                    "first OCR pass failed, retrying with widened language set"
                );
                match lease.recognize(&page.path, &ocr.widened_languages, retry_mode).await {
                    Ok(second) => Some(second),
                    Err(e2) => {
                        tracing::warn!(
                            session = %session.session_id(),
                            page = page.page_number,
                            error = %e2,
                            "both OCR passes failed for page"
                        );
                        None
                    }
                }
            }
        };

        match recognition {
            Some(r) if !r.text.trim().is_empty() => PageOcr {
                page_number: page.page_number,
                text: r.text,
                confidence: r.confidence,
                succeeded: true,
            },
            _ => failed(),
        }
    }

    fn direct_result(
        &self,
        session: &ExtractionSession,
        parsed: &ParsedDocument,
        classification: &Classification,
    ) -> ExtractionResult {
        let page_summaries = if !parsed.page_texts.is_empty() {
            parsed.page_texts.clone()
        } else if let Some(pages) = split_pages(&parsed.text) {
            pages
        } else {
            vec![PageSummary {
                page_number: 1,
                text: parsed.text.clone(),
            }]
        };

        ExtractionResult {
            text: parsed.text.clone(),
            confidence: 100.0,
            method: ExtractionMethod::Direct,
            is_scanned_pdf: false,
            page_summaries,
            diagnostics: self.diagnostics(session, classification, 0, 0, false, false),
        }
    }

    fn ocr_result(
        &self,
        session: &ExtractionSession,
        classification: &Classification,
        mut pages: Vec<PageOcr>,
    ) -> ExtractionResult {
        // Pages may have completed out of order; merge order is always
        // page-number order.
        pages.sort_by_key(|p| p.page_number);

        let attempted = pages.len();
        let succeeded = pages.iter().filter(|p| p.succeeded).count();
        let confidence = if pages.is_empty() {
            0.0
        } else {
            pages.iter().map(|p| p.confidence).sum::<f64>() / pages.len() as f64
        };

        let page_summaries: Vec<PageSummary> = pages
            .into_iter()
            .map(|p| PageSummary {
                page_number: p.page_number,
                text: p.text,
            })
            .collect();
        let text = merge_pages(&page_summaries);

        ExtractionResult {
            text,
            confidence,
            method: ExtractionMethod::ImageOcr,
            is_scanned_pdf: true,
            page_summaries,
            diagnostics: self.diagnostics(session, classification, attempted, succeeded, false, succeeded < attempted),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn fallback_result(
        &self,
        session: &ExtractionSession,
        parsed: &ParsedDocument,
        classification: &Classification,
        trigger: FallbackTrigger,
        detail: &str,
        attempted_pages: usize,
        pages_succeeded: usize,
    ) -> Result<ExtractionResult> {
        if parsed.text.trim().is_empty() {
            return Err(match trigger {
                FallbackTrigger::RasterizationUnavailable => SteglitzError::DependencyUnavailable {
                    message: detail.to_string(),
                    install_hints: self.capabilities.install_hints.clone(),
                },
                _ => SteglitzError::Ocr {
                    message: detail.to_string(),
                    attempted_pages,
                    pages_succeeded,
                    source: None,
                },
            });
        }

        tracing::info!(
            session = %session.session_id(),
            confidence = trigger.confidence(),
            detail,
            "degrading to direct text fallback"
        );

        let page_summaries = if !parsed.page_texts.is_empty() {
            parsed.page_texts.clone()
        } else {
            vec![PageSummary {
                page_number: 1,
                text: parsed.text.clone(),
            }]
        };

        Ok(ExtractionResult {
            text: parsed.text.clone(),
            confidence: trigger.confidence(),
            method: ExtractionMethod::DirectFallback,
            is_scanned_pdf: true,
            page_summaries,
            diagnostics: self.diagnostics(
                session,
                classification,
                attempted_pages,
                pages_succeeded,
                true,
                attempted_pages > 0,
            ),
        })
    }

    fn cleanup(&self, session: &mut ExtractionSession) {
        let started = session.stage_started("cleanup");
        let cleaned = self.janitor.cleanup_by_session(session.session_id());
        session.stage_finished("cleanup", started, None);
        if cleaned > 0 {
            tracing::debug!(session = %session.session_id(), cleaned, "reclaimed session resources");
        }
    }

    fn diagnostics(
        &self,
        session: &ExtractionSession,
        classification: &Classification,
        pages_attempted: usize,
        pages_succeeded: usize,
        fallback_used: bool,
        partial_processing: bool,
    ) -> ExtractionDiagnostics {
        ExtractionDiagnostics {
            session_id: session.session_id().to_string(),
            duration_ms: session.elapsed().as_millis() as u64,
            pages_attempted,
            pages_succeeded,
            fallback_used,
            partial_processing,
            classification_reason: classification.reason.to_string(),
        }
    }
}

fn needs_retry(recognition: &Recognition, min_text_len: usize, confidence_floor: f64) -> bool {
    recognition.text.trim().chars().count() < min_text_len || recognition.confidence < confidence_floor
}

/// Keep whichever pass produced more text or higher confidence.
fn pick_better(first: Recognition, second: Recognition) -> Recognition {
    if second.text.trim().len() > first.text.trim().len() || second.confidence > first.confidence {
        second
    } else {
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognition(text: &str, confidence: f64) -> Recognition {
        Recognition {
            text: text.to_string(),
            confidence,
            word_count: text.split_whitespace().count(),
        }
    }

    #[test]
    fn test_needs_retry_short_text() {
        assert!(needs_retry(&recognition("hi", 90.0), 16, 55.0));
    }

    #[test]
    fn test_needs_retry_low_confidence() {
        let r = recognition("a perfectly long line of recognized text", 40.0);
        assert!(needs_retry(&r, 16, 55.0));
    }

    #[test]
    fn test_no_retry_when_good() {
        let r = recognition("a perfectly long line of recognized text", 80.0);
        assert!(!needs_retry(&r, 16, 55.0));
    }

    #[test]
    fn test_pick_better_prefers_more_text() {
        let first = recognition("short", 90.0);
        let second = recognition("much longer recognized output", 60.0);
        assert_eq!(pick_better(first, second.clone()), second);
    }

    #[test]
    fn test_pick_better_prefers_higher_confidence() {
        let first = recognition("same length", 50.0);
        let second = recognition("same length", 70.0);
        assert_eq!(pick_better(first, second.clone()), second);
    }

    #[test]
    fn test_pick_better_keeps_first_otherwise() {
        let first = recognition("longer first pass text", 80.0);
        let second = recognition("short", 70.0);
        assert_eq!(pick_better(first.clone(), second), first);
    }

    #[test]
    fn test_fallback_confidence_mapping() {
        assert_eq!(FallbackTrigger::RasterizationUnavailable.confidence(), 50.0);
        assert_eq!(FallbackTrigger::GateTimeout.confidence(), 50.0);
        assert_eq!(FallbackTrigger::ConversionFailed.confidence(), 50.0);
        assert_eq!(FallbackTrigger::OcrFailed.confidence(), 25.0);
    }
}
