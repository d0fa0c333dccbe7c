use std::path::Path;
use tracing::{debug, warn};

use crate::layout::SHARED_DIRS;

/// Remove a job's working directory once the job is over. Failures are only
/// logged.
pub async fn remove_work_dir(wd: &Path) {
    match tokio::fs::remove_dir_all(wd).await {
        Ok(()) => debug!("removed {}", wd.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove working directory {}: {}", wd.display(), e),
    }
}

/// Start from an empty working directory holding the shared directories.
pub async fn prepare_work_dir(wd: &Path) -> std::io::Result<()> {
    if wd.exists() {
        debug!("removing previous {}", wd.display());
        tokio::fs::remove_dir_all(wd).await?;
    }
    tokio::fs::create_dir_all(wd).await?;
    for d in SHARED_DIRS {
        tokio::fs::create_dir(wd.join(d)).await?;
    }
    Ok(())
}
