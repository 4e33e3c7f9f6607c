//! Core result and data types shared across the extraction pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How the text in an [`ExtractionResult`] was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    /// The embedded text layer was dense enough to use directly.
    Direct,
    /// Pages were rasterized and recognized by the OCR worker pool.
    ImageOcr,
    /// The OCR path was unavailable or failed; the (sparse) embedded text
    /// layer was returned instead, with reduced confidence.
    DirectFallback,
}

/// Text recovered for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub page_number: usize,
    pub text: String,
}

/// Diagnostic metadata attached to every extraction result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    /// Session id, for correlating with logs and tracked temp resources.
    pub session_id: String,
    /// Wall-clock duration of the whole extraction.
    pub duration_ms: u64,
    /// Pages handed to OCR (0 on the direct path).
    pub pages_attempted: usize,
    /// Pages that produced usable OCR output.
    pub pages_succeeded: usize,
    /// True when the preferred path failed and the result degrades to the
    /// embedded text layer.
    pub fallback_used: bool,
    /// True when some (but not all) pages failed recognition.
    pub partial_processing: bool,
    /// The reason string produced by classification.
    pub classification_reason: String,
}

/// Final output of one extraction run. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub text: String,
    /// 0-100 trust score; lower on heuristic/fallback paths.
    pub confidence: f64,
    pub method: ExtractionMethod,
    pub is_scanned_pdf: bool,
    pub page_summaries: Vec<PageSummary>,
    pub diagnostics: ExtractionDiagnostics,
}

/// Output of a single OCR recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean word confidence, 0-100.
    pub confidence: f64,
    pub word_count: usize,
}

impl Recognition {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            word_count: 0,
        }
    }
}

/// What kind of temporary resource the janitor is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Image,
    Directory,
}

/// A page image produced by the rasterizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub page_number: usize,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serde_kebab_case() {
        let json = serde_json::to_string(&ExtractionMethod::DirectFallback).unwrap();
        assert_eq!(json, "\"direct-fallback\"");
        let back: ExtractionMethod = serde_json::from_str("\"image-ocr\"").unwrap();
        assert_eq!(back, ExtractionMethod::ImageOcr);
    }

    #[test]
    fn test_empty_recognition() {
        let r = Recognition::empty();
        assert!(r.text.is_empty());
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.word_count, 0);
    }
}
