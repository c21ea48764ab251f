//! PDF output through a headless Chromium-family browser

use crate::error::{M365Error, Result};
use crate::ops::run_command;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Executables tried, in order, when no browser is configured
const BROWSER_CANDIDATES: &[&str] = &[
    "msedge",
    "microsoft-edge",
    "microsoft-edge-stable",
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Resolve the browser used for printing.
///
/// A configured path must exist; otherwise the first candidate on PATH wins.
pub fn find_browser(configured: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        // Allow a bare executable name in config
        return which::which(path).map_err(|_| {
            M365Error::ConfigError(format!(
                "Configured browser '{}' does not exist",
                path.display()
            ))
        });
    }

    BROWSER_CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or_else(|| {
            M365Error::ConfigError(
                "No Chromium-based browser found for PDF output. Install Edge or Chrome, or set reports.browser_path".into(),
            )
        })
}

/// `file://` URL for a local path
fn file_url(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let raw = absolute.to_string_lossy().replace('\\', "/");
    let encoded: Vec<String> = raw
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    let joined = encoded.join("/");

    // Windows drive paths (C:/...) need a leading slash; encode() would
    // also have escaped the drive colon
    if joined.starts_with('/') {
        Ok(format!("file://{}", joined))
    } else {
        Ok(format!("file:///{}", joined.replacen("%3A", ":", 1)))
    }
}

/// Print `html` to `pdf` with a headless browser
pub async fn html_to_pdf(browser: &Path, html: &Path, pdf: &Path) -> Result<()> {
    let url = file_url(html)?;
    let print_arg = format!("--print-to-pdf={}", pdf.display());
    debug!(browser = %browser.display(), %url, "Printing report to PDF");

    run_command(
        browser,
        &[
            "--headless",
            "--disable-gpu",
            "--no-sandbox",
            "--no-pdf-header-footer",
            &print_arg,
            &url,
        ],
        None,
        None,
    )
    .await?;

    if !pdf.exists() {
        return Err(M365Error::CommandFailed {
            program: browser.display().to_string(),
            code: "0".into(),
            stderr: format!("no PDF was written to {}", pdf.display()),
        });
    }

    info!(path = %pdf.display(), "PDF written");
    Ok(())
}
