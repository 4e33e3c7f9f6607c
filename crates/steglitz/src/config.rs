//! Configuration loading and management.
//!
//! All tunables for the pipeline, worker pool, conversion gate, and resource
//! janitor live here. Configuration can be loaded from a TOML file or string,
//! or created programmatically; every field has a serde default so partial
//! files work.
//!
//! # Example
//!
//! ```rust
//! use steglitz::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Result, SteglitzError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration for one pipeline instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub gate: GateConfig,

    #[serde(default)]
    pub janitor: JanitorConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub ocr: OcrConfig,
}

/// Worker pool sizing and lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on live OCR engines (also the slot arena capacity).
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Idle workers older than this are destroyed by the eviction sweep.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// How long `acquire` waits for a freed worker before failing.
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// How often the idle-eviction sweep runs.
    #[serde(default = "default_evict_interval_ms")]
    pub evict_interval_ms: u64,

    /// Maximum workers destroyed per sweep tick.
    #[serde(default = "default_evict_batch_limit")]
    pub evict_batch_limit: usize,
}

/// Bounds on concurrent page rasterizations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_max_concurrent_conversions")]
    pub max_concurrent_conversions: usize,

    /// How long a conversion request waits for a slot before giving up.
    #[serde(default = "default_conversion_timeout_ms")]
    pub conversion_timeout_ms: u64,
}

/// Caps for the temp-resource registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JanitorConfig {
    #[serde(default = "default_max_resource_count")]
    pub max_resource_count: usize,

    #[serde(default = "default_max_total_size_bytes")]
    pub max_total_size_bytes: u64,

    #[serde(default = "default_max_resource_age_ms")]
    pub max_resource_age_ms: u64,

    /// How often the age sweep runs.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Maximum resources reclaimed per sweep tick.
    #[serde(default = "default_sweep_batch_limit")]
    pub sweep_batch_limit: usize,
}

/// Thresholds for the scanned/text-based heuristic. First matching rule wins;
/// see [`crate::classify::classify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Documents with fewer total words are treated as scanned.
    #[serde(default = "default_min_word_count")]
    pub min_word_count: usize,

    /// Documents averaging fewer words per page are treated as scanned.
    #[serde(default = "default_min_words_per_page")]
    pub min_words_per_page: f64,

    /// Documents averaging fewer characters per page are treated as scanned.
    #[serde(default = "default_min_chars_per_page")]
    pub min_chars_per_page: f64,
}

/// Recognition parameters, including the single quality retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Language set for the first recognition pass, e.g. "eng".
    #[serde(default = "default_languages")]
    pub languages: String,

    /// Widened language set used by the retry pass, e.g. "eng+deu".
    #[serde(default = "default_widened_languages")]
    pub widened_languages: String,

    /// Page segmentation mode for the first pass (tesseract PSM number).
    #[serde(default = "default_primary_psm")]
    pub primary_psm: u8,

    /// Alternate segmentation mode for the retry pass.
    #[serde(default = "default_retry_psm")]
    pub retry_psm: u8,

    /// A first pass shorter than this (trimmed chars) triggers the retry.
    #[serde(default = "default_retry_min_text_len")]
    pub retry_min_text_len: usize,

    /// A first pass below this confidence triggers the retry.
    #[serde(default = "default_retry_confidence_floor")]
    pub retry_confidence_floor: f64,

    /// Rasterization resolution.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Per-invocation timeout for the OCR subprocess.
    #[serde(default = "default_ocr_timeout_ms")]
    pub ocr_timeout_ms: u64,

    /// Timeout for one rasterization subprocess run.
    #[serde(default = "default_raster_timeout_ms")]
    pub raster_timeout_ms: u64,
}

fn default_max_pool_size() -> usize {
    num_cpus::get().clamp(1, 4)
}
fn default_idle_timeout_ms() -> u64 {
    300_000
}
fn default_acquire_timeout_ms() -> u64 {
    30_000
}
fn default_evict_interval_ms() -> u64 {
    30_000
}
fn default_evict_batch_limit() -> usize {
    4
}
fn default_max_concurrent_conversions() -> usize {
    2
}
fn default_conversion_timeout_ms() -> u64 {
    120_000
}
fn default_max_resource_count() -> usize {
    256
}
fn default_max_total_size_bytes() -> u64 {
    512 * 1024 * 1024
}
fn default_max_resource_age_ms() -> u64 {
    1_800_000
}
fn default_sweep_interval_ms() -> u64 {
    60_000
}
fn default_sweep_batch_limit() -> usize {
    32
}
fn default_min_word_count() -> usize {
    20
}
fn default_min_words_per_page() -> f64 {
    50.0
}
fn default_min_chars_per_page() -> f64 {
    200.0
}
fn default_languages() -> String {
    "eng".to_string()
}
fn default_widened_languages() -> String {
    "eng+osd".to_string()
}
fn default_primary_psm() -> u8 {
    3
}
fn default_retry_psm() -> u8 {
    6
}
fn default_retry_min_text_len() -> usize {
    16
}
fn default_retry_confidence_floor() -> f64 {
    55.0
}
fn default_dpi() -> u32 {
    300
}
fn default_ocr_timeout_ms() -> u64 {
    60_000
}
fn default_raster_timeout_ms() -> u64 {
    120_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            idle_timeout_ms: default_idle_timeout_ms(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            evict_interval_ms: default_evict_interval_ms(),
            evict_batch_limit: default_evict_batch_limit(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent_conversions: default_max_concurrent_conversions(),
            conversion_timeout_ms: default_conversion_timeout_ms(),
        }
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            max_resource_count: default_max_resource_count(),
            max_total_size_bytes: default_max_total_size_bytes(),
            max_resource_age_ms: default_max_resource_age_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            sweep_batch_limit: default_sweep_batch_limit(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_word_count: default_min_word_count(),
            min_words_per_page: default_min_words_per_page(),
            min_chars_per_page: default_min_chars_per_page(),
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            languages: default_languages(),
            widened_languages: default_widened_languages(),
            primary_psm: default_primary_psm(),
            retry_psm: default_retry_psm(),
            retry_min_text_len: default_retry_min_text_len(),
            retry_confidence_floor: default_retry_confidence_floor(),
            dpi: default_dpi(),
            ocr_timeout_ms: default_ocr_timeout_ms(),
            raster_timeout_ms: default_raster_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SteglitzError::validation(format!("Invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.max_pool_size == 0 {
            return Err(SteglitzError::validation("pool.max_pool_size must be at least 1"));
        }
        if self.gate.max_concurrent_conversions == 0 {
            return Err(SteglitzError::validation(
                "gate.max_concurrent_conversions must be at least 1",
            ));
        }
        if self.janitor.max_resource_count == 0 {
            return Err(SteglitzError::validation(
                "janitor.max_resource_count must be at least 1",
            ));
        }
        if self.janitor.sweep_batch_limit == 0 {
            return Err(SteglitzError::validation("janitor.sweep_batch_limit must be at least 1"));
        }
        if self.ocr.languages.trim().is_empty() {
            return Err(SteglitzError::validation("ocr.languages must not be empty"));
        }
        if self.ocr.dpi == 0 {
            return Err(SteglitzError::validation("ocr.dpi must be positive"));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.acquire_timeout_ms)
    }

    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_millis(self.gate.conversion_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.pool.max_pool_size >= 1);
        assert_eq!(config.classifier.min_word_count, 20);
        assert_eq!(config.classifier.min_words_per_page, 50.0);
        assert_eq!(config.classifier.min_chars_per_page, 200.0);
        assert_eq!(config.gate.max_concurrent_conversions, 2);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [pool]
            max_pool_size = 8

            [ocr]
            languages = "deu"
            "#,
        )
        .unwrap();

        assert_eq!(config.pool.max_pool_size, 8);
        assert_eq!(config.ocr.languages, "deu");
        assert_eq!(config.pool.acquire_timeout_ms, 30_000);
        assert_eq!(config.janitor.max_resource_count, 256);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.gate.conversion_timeout_ms, 120_000);
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let result = PipelineConfig::from_toml_str("[pool]\nmax_pool_size = 0\n");
        assert!(matches!(result, Err(SteglitzError::Validation(_))));
    }

    #[test]
    fn test_zero_gate_width_rejected() {
        let result = PipelineConfig::from_toml_str("[gate]\nmax_concurrent_conversions = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_languages_rejected() {
        let result = PipelineConfig::from_toml_str("[ocr]\nlanguages = \"  \"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let result = PipelineConfig::from_toml_str("not = [valid");
        assert!(matches!(result, Err(SteglitzError::Validation(_))));
    }

    #[test]
    fn test_duration_helpers() {
        let config = PipelineConfig::default();
        assert_eq!(config.acquire_timeout(), Duration::from_millis(30_000));
        assert_eq!(config.conversion_timeout(), Duration::from_millis(120_000));
    }
}
