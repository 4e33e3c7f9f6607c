//! OCR engine contract and backends.
//!
//! Engines are stateful and expensive to create (the factory validates the
//! binary and its language data up front), which is why they are held by
//! pooled workers rather than constructed per page. Recognition itself is an
//! opaque external call; the pipeline only consumes `{text, confidence}`.

mod tesseract_cli;
mod tsv;

pub use tesseract_cli::{TesseractCliEngine, TesseractCliFactory};

use crate::error::Result;
use crate::types::Recognition;
use async_trait::async_trait;
use std::path::Path;

/// Tesseract page segmentation modes the pipeline uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSegMode {
    OsdOnly,
    Auto,
    SingleColumn,
    SingleBlock,
    SingleLine,
    SparseText,
    SparseTextOsd,
}

impl PageSegMode {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::OsdOnly),
            3 => Ok(Self::Auto),
            4 => Ok(Self::SingleColumn),
            6 => Ok(Self::SingleBlock),
            7 => Ok(Self::SingleLine),
            11 => Ok(Self::SparseText),
            12 => Ok(Self::SparseTextOsd),
            other => Err(crate::error::SteglitzError::validation(format!(
                "Unsupported page segmentation mode: {}",
                other
            ))),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::OsdOnly => 0,
            Self::Auto => 3,
            Self::SingleColumn => 4,
            Self::SingleBlock => 6,
            Self::SingleLine => 7,
            Self::SparseText => 11,
            Self::SparseTextOsd => 12,
        }
    }
}

/// A loaded OCR engine instance held by one pool worker.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text in one page image.
    async fn recognize(&self, image_path: &Path, languages: &str, mode: PageSegMode) -> Result<Recognition>;

    /// Release engine resources. Called once, on pool eviction or shutdown.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Creates engine instances for the worker pool. Creation may fail (missing
/// binary, missing language data); the pool reports that as a worker
/// initialization error without changing its size.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self) -> Result<std::sync::Arc<dyn OcrEngine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psm_round_trip() {
        for value in [0u8, 3, 4, 6, 7, 11, 12] {
            let mode = PageSegMode::from_u8(value).unwrap();
            assert_eq!(mode.as_u8(), value);
        }
    }

    #[test]
    fn test_psm_rejects_unknown() {
        assert!(PageSegMode::from_u8(99).is_err());
    }
}
