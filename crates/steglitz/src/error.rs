//! Error types for Steglitz.
//!
//! All fallible operations in the crate return [`Result`], built on
//! [`SteglitzError`]:
//!
//! - Use `thiserror` for automatic `Error` trait implementation
//! - Preserve error chains with `#[source]` attributes
//! - Include context in error messages (file paths, timeouts, page counts)
//!
//! # Error Handling Philosophy
//!
//! **System errors MUST always bubble up unchanged:**
//! - `SteglitzError::Io` (from `std::io::Error`) - missing input files,
//!   permission errors, spawn failures
//! - These indicate real system problems that users need to know about
//!
//! **Pipeline errors are wrapped with context:**
//! - `Parsing` - corrupt or unreadable PDF input (terminal)
//! - `PoolExhausted` - no worker freed within the acquire timeout (retryable)
//! - `WorkerInit` - an OCR engine failed to come up; the pool is unaffected
//!   and the caller may retry
//! - `DependencyUnavailable` - rasterization toolchain absent and no direct
//!   text to fall back on; carries install hints for the platform
//! - `Conversion` - rasterization ran but produced no usable output
//! - `Ocr` - recognition failed for enough pages that no result is possible;
//!   carries the attempted/succeeded page counts for diagnostics
use thiserror::Error;

/// Result type alias using `SteglitzError`.
pub type Result<T> = std::result::Result<T, SteglitzError>;

/// Main error type for all Steglitz operations.
#[derive(Debug, Error)]
pub enum SteglitzError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Worker pool exhausted after {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("Worker initialization failed: {message}")]
    WorkerInit {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Dependency unavailable: {message}")]
    DependencyUnavailable {
        message: String,
        install_hints: Vec<String>,
    },

    #[error("Conversion error: {message}")]
    Conversion {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR error: {message} ({pages_succeeded}/{attempted_pages} pages succeeded)")]
    Ocr {
        message: String,
        attempted_pages: usize,
        pages_succeeded: usize,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl SteglitzError {
    /// Create a Parsing error.
    pub fn parsing<S: Into<String>>(message: S) -> Self {
        Self::Parsing {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Parsing error with source.
    pub fn parsing_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Parsing {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a WorkerInit error.
    pub fn worker_init<S: Into<String>>(message: S) -> Self {
        Self::WorkerInit {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Conversion error.
    pub fn conversion<S: Into<String>>(message: S) -> Self {
        Self::Conversion {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Conversion error with source.
    pub fn conversion_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Conversion {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an Ocr error with page accounting.
    pub fn ocr_failure<S: Into<String>>(message: S, attempted_pages: usize, pages_succeeded: usize) -> Self {
        Self::Ocr {
            message: message.into(),
            attempted_pages,
            pages_succeeded,
            source: None,
        }
    }

    /// Create a Validation error.
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    /// Whether a caller can reasonably retry the failed operation as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::WorkerInit { .. })
    }
}
