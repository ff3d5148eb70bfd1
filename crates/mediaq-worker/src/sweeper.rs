//! Artifact sweeper for stateless mode.
//!
//! Stateless results stay in the work directory so the API can stream them.
//! Once the owning job has aged out of the queue the file is unreachable, so
//! anything older than the completed-job retention window is deleted.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cleanup::ATTEMPT_DIR_PREFIX;
use crate::metrics;

pub struct ArtifactSweeper {
    dir: PathBuf,
    max_age: Duration,
    interval: Duration,
}

impl ArtifactSweeper {
    pub fn new(dir: PathBuf, max_age: Duration, interval: Duration) -> Self {
        Self {
            dir,
            max_age,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match sweep_once(&self.dir, self.max_age).await {
                        Ok(0) => {}
                        Ok(n) => {
                            info!("Swept {} expired artifacts from {}", n, self.dir.display());
                            metrics::record_artifacts_swept(n);
                        }
                        Err(e) => warn!("Artifact sweep of {} failed: {}", self.dir.display(), e),
                    }
                }
            }
        }
        debug!("Artifact sweeper stopped");
    }
}

/// Delete regular files directly under `dir` last modified at least `max_age` ago.
///
/// Attempt scratch directories of that age are removed too; they only
/// outlive their attempt when a slot was aborted at shutdown.
pub async fn sweep_once(dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let scratch = entry
            .file_name()
            .to_string_lossy()
            .starts_with(ATTEMPT_DIR_PREFIX);
        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() || (scratch && m.is_dir()) => m,
            _ => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }

        let removal = if metadata.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await
        } else {
            tokio::fs::remove_file(entry.path()).await
        };
        match removal {
            Ok(()) => removed += 1,
            Err(e) => debug!("Could not sweep {}: {}", entry.path().display(), e),
        }
    }

    Ok(removed)
}
