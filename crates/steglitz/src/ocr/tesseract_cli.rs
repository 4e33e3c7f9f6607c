//! Tesseract CLI backend.
//!
//! The factory does the expensive validation once per engine: the binary has
//! to run and every requested language has to be present in
//! `tesseract --list-langs`. Recognition spawns one process per page image
//! with TSV output, so both text and word confidences come from a single
//! invocation.

use super::tsv::recognition_from_tsv;
use super::{EngineFactory, OcrEngine, PageSegMode};
use crate::error::{Result, SteglitzError};
use crate::text::strip_control_characters;
use crate::types::Recognition;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// OCR engine driving the `tesseract` binary.
pub struct TesseractCliEngine {
    available_languages: Vec<String>,
    ocr_timeout: Duration,
}

impl TesseractCliEngine {
    fn language_supported(&self, languages: &str) -> bool {
        languages
            .split('+')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .all(|lang| self.available_languages.iter().any(|a| a == lang))
    }

    /// Drop languages the installation does not provide, keeping at least the
    /// original set when none survive (tesseract will report its own error).
    fn effective_languages(&self, languages: &str) -> String {
        let supported: Vec<&str> = languages
            .split('+')
            .map(str::trim)
            .filter(|l| !l.is_empty() && self.available_languages.iter().any(|a| a == l))
            .collect();
        if supported.is_empty() {
            languages.to_string()
        } else {
            supported.join("+")
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCliEngine {
    async fn recognize(&self, image_path: &Path, languages: &str, mode: PageSegMode) -> Result<Recognition> {
        let langs = self.effective_languages(languages);

        let child = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .arg("--psm")
            .arg(mode.as_u8().to_string())
            .arg("-l")
            .arg(&langs)
            .arg("tsv")
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| std::io::Error::other(format!("Failed to execute tesseract: {}", e)))?;

        let output = match timeout(self.ocr_timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(std::io::Error::other(format!("Failed to wait for tesseract: {}", e)).into()),
            Err(_) => {
                return Err(SteglitzError::Ocr {
                    message: format!("Recognition timed out after {}ms", self.ocr_timeout.as_millis()),
                    attempted_pages: 1,
                    pages_succeeded: 0,
                    source: None,
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr_lower = stderr.to_lowercase();
            // Recognition-level failures are OCR errors; anything else is a
            // system error that must bubble up.
            if stderr_lower.contains("error")
                || stderr_lower.contains("failed loading")
                || stderr_lower.contains("could not")
            {
                return Err(SteglitzError::Ocr {
                    message: format!("tesseract failed on {}: {}", image_path.display(), stderr.trim()),
                    attempted_pages: 1,
                    pages_succeeded: 0,
                    source: None,
                });
            }
            return Err(std::io::Error::other(format!("tesseract system error: {}", stderr.trim())).into());
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let mut recognition = recognition_from_tsv(&tsv);
        recognition.text = strip_control_characters(&recognition.text);
        Ok(recognition)
    }
}

/// Builds [`TesseractCliEngine`] instances for the worker pool.
pub struct TesseractCliFactory {
    required_languages: Vec<String>,
    ocr_timeout: Duration,
}

impl TesseractCliFactory {
    /// `languages` and `widened_languages` are both validated at engine
    /// creation so the retry pass cannot fail on a missing model mid-page.
    pub fn new(languages: &str, widened_languages: &str, ocr_timeout: Duration) -> Self {
        let mut required: Vec<String> = languages
            .split('+')
            .chain(widened_languages.split('+'))
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        required.sort();
        required.dedup();

        Self {
            required_languages: required,
            ocr_timeout,
        }
    }
}

#[async_trait]
impl EngineFactory for TesseractCliFactory {
    async fn create(&self) -> Result<Arc<dyn OcrEngine>> {
        let output = Command::new("tesseract")
            .arg("--list-langs")
            .output()
            .await
            .map_err(|e| SteglitzError::WorkerInit {
                message: format!("tesseract is not installed or not in PATH: {}", e),
                source: Some(Box::new(e)),
            })?;

        if !output.status.success() {
            return Err(SteglitzError::worker_init(format!(
                "tesseract --list-langs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let available = parse_language_list(&String::from_utf8_lossy(&output.stdout));
        if available.is_empty() {
            return Err(SteglitzError::worker_init(
                "tesseract reported no installed languages".to_string(),
            ));
        }

        // The primary language set is mandatory; widened languages degrade to
        // whatever is installed at recognition time.
        let engine = TesseractCliEngine {
            available_languages: available,
            ocr_timeout: self.ocr_timeout,
        };
        for lang in &self.required_languages {
            if !engine.language_supported(lang) {
                tracing::warn!(language = %lang, "requested OCR language is not installed");
            }
        }

        Ok(Arc::new(engine))
    }
}

fn parse_language_list(output: &str) -> Vec<String> {
    // First line is the "List of available languages" banner.
    output
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(langs: &[&str]) -> TesseractCliEngine {
        TesseractCliEngine {
            available_languages: langs.iter().map(|s| s.to_string()).collect(),
            ocr_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_parse_language_list() {
        let output = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\ndeu\nosd\n";
        assert_eq!(parse_language_list(output), vec!["eng", "deu", "osd"]);
    }

    #[test]
    fn test_parse_language_list_empty() {
        assert!(parse_language_list("banner only\n").is_empty());
    }

    #[test]
    fn test_language_supported_compound() {
        let e = engine(&["eng", "deu"]);
        assert!(e.language_supported("eng"));
        assert!(e.language_supported("eng+deu"));
        assert!(!e.language_supported("eng+fra"));
    }

    #[test]
    fn test_effective_languages_filters_missing() {
        let e = engine(&["eng"]);
        assert_eq!(e.effective_languages("eng+fra"), "eng");
        assert_eq!(e.effective_languages("eng"), "eng");
    }

    #[test]
    fn test_effective_languages_keeps_original_when_none_installed() {
        let e = engine(&["deu"]);
        assert_eq!(e.effective_languages("eng+fra"), "eng+fra");
    }

    #[test]
    fn test_factory_dedups_required_languages() {
        let factory = TesseractCliFactory::new("eng", "eng+osd", Duration::from_secs(10));
        assert_eq!(factory.required_languages, vec!["eng", "osd"]);
    }
}
