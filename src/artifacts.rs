//! Filesystem outputs: the results PDF and diagnostic screenshots.
//!
//! Both exports are best-effort — a failed write is logged and never changes
//! the outcome of the attempt that produced it. Directories are created on
//! demand.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::browser::Driver;

/// Print the current page to `<dir>/antecedentes_<id>.pdf`. Returns the
/// written path, or `None` when the export failed.
pub async fn save_results_pdf(driver: &dyn Driver, dir: &Path, cedula: &str) -> Option<PathBuf> {
    let path = dir.join(format!("antecedentes_{cedula}.pdf"));
    match export_pdf(driver, dir, &path).await {
        Ok(size) => {
            info!("✅ results saved to {} ({size} bytes)", path.display());
            Some(path)
        }
        Err(e) => {
            error!("could not save the results PDF: {e:#}");
            None
        }
    }
}

async fn export_pdf(driver: &dyn Driver, dir: &Path, path: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir)?;
    let bytes = driver.print_pdf().await?;
    std::fs::write(path, &bytes)?;
    Ok(bytes.len())
}

/// Capture a diagnostic screenshot to `<dir>/error_<id>_attempt_<n>.png`.
/// Returns the written path, or `None` when the capture or write failed.
pub async fn save_error_screenshot(
    driver: &dyn Driver,
    dir: &Path,
    cedula: &str,
    attempt: u32,
) -> Option<PathBuf> {
    let path = dir.join(format!("error_{cedula}_attempt_{attempt}.png"));
    match export_screenshot(driver, dir, &path).await {
        Ok(()) => {
            info!("diagnostic screenshot saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("could not save the diagnostic screenshot: {e:#}");
            None
        }
    }
}

async fn export_screenshot(driver: &dyn Driver, dir: &Path, path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)?;
    let bytes = driver.screenshot_png().await?;
    std::fs::write(path, &bytes)?;
    Ok(())
}
