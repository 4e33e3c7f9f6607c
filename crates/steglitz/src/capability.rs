//! Detection of the optional page-rasterization toolchain.
//!
//! The pipeline degrades gracefully when `pdftoppm` (poppler-utils) is not
//! installed: scanned documents then fall back to whatever direct text the
//! PDF exposes. The probe runs once per process and the result is cached;
//! request paths only ever branch on `rasterization_available`.

use once_cell::sync::OnceCell;
use regex::Regex;
use tokio::process::Command;

static CAPABILITIES: OnceCell<Capabilities> = OnceCell::new();

/// What the optional toolchain probe found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub rasterization_available: bool,
    /// Human-readable reasons when unavailable (empty when available).
    pub reasons: Vec<String>,
    /// Platform-appropriate install commands for the missing toolchain.
    pub install_hints: Vec<String>,
}

impl Capabilities {
    /// A capability set with rasterization working.
    pub fn available() -> Self {
        Self {
            rasterization_available: true,
            reasons: Vec::new(),
            install_hints: Vec::new(),
        }
    }

    /// A capability set with rasterization missing for the given reason.
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self {
            rasterization_available: false,
            reasons: vec![reason.into()],
            install_hints: platform_install_hints(),
        }
    }
}

/// Probe the rasterization toolchain, caching the result for the lifetime of
/// the process. Subsequent calls return the cached value without spawning
/// anything.
pub async fn probe_capabilities() -> Capabilities {
    if let Some(cached) = CAPABILITIES.get() {
        return cached.clone();
    }
    let probed = run_probe().await;
    CAPABILITIES.get_or_init(|| probed).clone()
}

async fn run_probe() -> Capabilities {
    let output = match Command::new("pdftoppm").arg("-v").output().await {
        Ok(output) => output,
        Err(e) => {
            tracing::info!(error = %e, "pdftoppm not found, rasterization disabled");
            return Capabilities::unavailable(format!("pdftoppm is not installed or not in PATH: {}", e));
        }
    };

    // pdftoppm prints its version banner on stderr.
    let banner = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );

    match extract_version(&banner) {
        Some((major, minor)) => {
            tracing::debug!(version = format!("{}.{}", major, minor), "pdftoppm detected");
            Capabilities::available()
        }
        None => Capabilities::unavailable(format!(
            "pdftoppm responded but its version banner was not recognized: {}",
            banner.lines().next().unwrap_or_default()
        )),
    }
}

fn extract_version(output: &str) -> Option<(u32, u32)> {
    let patterns = [
        r"pdftoppm\s+version\s+(\d+)\.(\d+)",
        r"poppler(?:-utils)?\s+(\d+)\.(\d+)",
        r"version\s+(\d+)\.(\d+)",
        r"(?:^|\s)(\d+)\.(\d+)(?:\.\d+)?(?:\s|$)",
    ];

    for pattern in &patterns {
        if let Ok(re) = Regex::new(pattern)
            && let Some(caps) = re.captures(output)
        {
            let major = caps.get(1)?.as_str().parse().ok()?;
            let minor = caps.get(2)?.as_str().parse().ok()?;
            return Some((major, minor));
        }
    }

    None
}

fn platform_install_hints() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["brew install poppler".to_string()]
    } else if cfg!(target_os = "windows") {
        vec![
            "choco install poppler".to_string(),
            "scoop install poppler".to_string(),
        ]
    } else {
        vec![
            "apt-get install poppler-utils".to_string(),
            "dnf install poppler-utils".to_string(),
            "apk add poppler-utils".to_string(),
        ]
    }
}
