//! Page rasterization through the external poppler toolchain.
//!
//! `pdftoppm` writes one image per page under an output prefix, or fails as
//! a unit. The exit status alone is not trusted: after the process finishes,
//! the produced files are enumerated from disk so partial output (some pages
//! rendered before a failure) can still be recognized.

use crate::error::{Result, SteglitzError};
use crate::types::RenderedPage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// One rasterization job: a page range of one PDF into an output prefix.
#[derive(Debug, Clone)]
pub struct RasterRequest {
    pub pdf_path: PathBuf,
    /// 1-based first page.
    pub first_page: usize,
    /// 1-based last page; 0 means "through the end of the document".
    pub last_page: usize,
    pub dpi: u32,
    /// Files are produced as `<output_prefix>-<page>.png`.
    pub output_prefix: PathBuf,
}

/// External rasterization contract consumed by the pipeline.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    async fn rasterize(&self, request: &RasterRequest) -> Result<Vec<RenderedPage>>;
}

/// Rasterizer backed by the `pdftoppm` binary.
pub struct PdftoppmRasterizer {
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PageRasterizer for PdftoppmRasterizer {
    async fn rasterize(&self, request: &RasterRequest) -> Result<Vec<RenderedPage>> {
        let mut command = Command::new("pdftoppm");
        command
            .arg("-png")
            .arg("-r")
            .arg(request.dpi.to_string())
            .arg("-f")
            .arg(request.first_page.max(1).to_string());
        if request.last_page > 0 {
            command.arg("-l").arg(request.last_page.to_string());
        }
        command
            .arg(&request.pdf_path)
            .arg(&request.output_prefix)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| std::io::Error::other(format!("Failed to execute pdftoppm: {}", e)))?;

        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(std::io::Error::other(format!("Failed to wait for pdftoppm: {}", e)).into()),
            Err(_) => {
                return Err(SteglitzError::conversion(format!(
                    "pdftoppm timed out after {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        // Enumerate whatever landed on disk, success or not.
        let pages = enumerate_rendered_pages(&request.output_prefix).await?;

        if pages.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SteglitzError::conversion(format!(
                "pdftoppm produced no page images for {}: {}",
                request.pdf_path.display(),
                stderr.trim()
            )));
        }

        if !output.status.success() {
            tracing::warn!(
                pdf = %request.pdf_path.display(),
                rendered = pages.len(),
                "pdftoppm exited nonzero but produced partial output"
            );
        }

        Ok(pages)
    }
}

/// Collect `<prefix>-<page>.png` files, sorted by page number.
pub async fn enumerate_rendered_pages(output_prefix: &Path) -> Result<Vec<RenderedPage>> {
    let dir = output_prefix.parent().unwrap_or_else(|| Path::new("."));
    let stem = output_prefix
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| SteglitzError::validation("output prefix has no file name"))?;

    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(page_number) = parse_page_suffix(name, stem) {
            pages.push(RenderedPage { page_number, path });
        }
    }

    pages.sort_by_key(|p| p.page_number);
    Ok(pages)
}

/// Parse the page number out of `<stem>-<digits>.png`.
fn parse_page_suffix(file_name: &str, stem: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('-')?;
    let digits = rest.strip_suffix(".png")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_page_suffix() {
        assert_eq!(parse_page_suffix("scan-1.png", "scan"), Some(1));
        assert_eq!(parse_page_suffix("scan-07.png", "scan"), Some(7));
        assert_eq!(parse_page_suffix("scan-12.png", "scan"), Some(12));
        assert_eq!(parse_page_suffix("scan-x.png", "scan"), None);
        assert_eq!(parse_page_suffix("scan-1.jpg", "scan"), None);
        assert_eq!(parse_page_suffix("other-1.png", "scan"), None);
        assert_eq!(parse_page_suffix("scan.png", "scan"), None);
    }

    #[tokio::test]
    async fn test_enumerate_sorted_by_page() {
        let dir = tempdir().unwrap();
        for name in ["page-10.png", "page-2.png", "page-1.png", "ignore.txt"] {
            tokio::fs::write(dir.path().join(name), b"png").await.unwrap();
        }

        let pages = enumerate_rendered_pages(&dir.path().join("page")).await.unwrap();
        let numbers: Vec<usize> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
    }

    #[tokio::test]
    async fn test_enumerate_empty_dir() {
        let dir = tempdir().unwrap();
        let pages = enumerate_rendered_pages(&dir.path().join("page")).await.unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn test_enumerate_does_not_match_longer_stems() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join("pages-extra-1.png"), b"png")
            .await
            .unwrap();

        let pages = enumerate_rendered_pages(&dir.path().join("pages")).await.unwrap();
        assert!(pages.is_empty());
    }
}
