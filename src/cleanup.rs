//! Best-effort removal of a job's temporary files.
//!
//! Cleanup runs whether the job succeeded or failed, and never fails
//! itself: errors are logged so they cannot mask the job's real outcome.

use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info};

/// Delete the uploaded input file and the whole job working directory.
///
/// Paths that are already gone are fine.
pub async fn cleanup_job(input: &Path, work_dir: &Path) {
    match tokio::fs::remove_file(input).await {
        Ok(()) => info!("Cleaned up input file '{}'", input.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!("Error cleaning up input file '{}': {}", input.display(), e),
    }

    match tokio::fs::remove_dir_all(work_dir).await {
        Ok(()) => info!("Cleaned up job directory '{}'", work_dir.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => error!(
            "Error cleaning up job directory '{}': {}",
            work_dir.display(),
            e
        ),
    }
}
