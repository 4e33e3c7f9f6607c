//! Steglitz - Bounded OCR Worker Pool and Document Extraction Pipeline
//!
//! Steglitz ingests PDF documents and produces extracted text with per-page
//! summaries. Each document is classified as text-based or scanned; scanned
//! documents are rasterized (bounded by a conversion gate) and recognized by
//! a pool of reusable OCR engines, degrading gracefully to whatever direct
//! text exists when the optional toolchain is missing or recognition fails.
//! Every temporary resource the pipeline creates is tracked and reclaimed.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use steglitz::{ExtractionPipeline, PipelineConfig};
//!
//! # async fn run() -> steglitz::Result<()> {
//! let pipeline = ExtractionPipeline::connect(PipelineConfig::default()).await?;
//! let result = pipeline.extract_file("document.pdf".as_ref()).await?;
//! println!("{} ({}% confidence)", result.text, result.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Pipeline** (`pipeline`): parse → classify → direct / convert+OCR →
//!   fallback → cleanup
//! - **Worker Pool** (`pool`): bounded arena of stateful OCR engines
//! - **Conversion Gate** (`gate`): semaphore bounding concurrent
//!   rasterizations
//! - **Resource Janitor** (`janitor`): count/size/age-capped temp-resource
//!   tracking
//! - **Capability Probe** (`capability`): one-shot detection of the optional
//!   rasterization toolchain

#![deny(unsafe_code)]

pub mod capability;
pub mod classify;
pub mod config;
pub mod error;
pub mod gate;
pub mod janitor;
pub mod ocr;
pub mod pipeline;
pub mod pool;
pub mod raster;
pub mod session;
pub mod text;
pub mod types;

pub use error::{Result, SteglitzError};
pub use types::*;

pub use capability::{Capabilities, probe_capabilities};
pub use classify::{Classification, classify};
pub use config::{ClassifierConfig, GateConfig, JanitorConfig, OcrConfig, PipelineConfig, PoolConfig};
pub use gate::{ConversionGate, GatePermit};
pub use janitor::{JanitorStats, ResourceId, ResourceJanitor};
pub use ocr::{EngineFactory, OcrEngine, PageSegMode, TesseractCliEngine, TesseractCliFactory};
pub use pipeline::ExtractionPipeline;
pub use pool::{WorkerLease, WorkerPool};
pub use raster::{PageRasterizer, PdftoppmRasterizer, RasterRequest};
pub use session::{ExtractionSession, StageRecord};
pub use text::{merge_pages, split_pages};
