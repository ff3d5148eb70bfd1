//! Local file cleanup for job inputs and outputs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Name prefix of the per-attempt scratch directories under the work dir.
pub const ATTEMPT_DIR_PREFIX: &str = ".attempt-";

/// Remove a file, treating "already gone" as success.
///
/// Returns `true` if this call deleted the file.
pub async fn remove_file(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to remove {}: {}", path.display(), e);
            false
        }
    }
}

/// Remove every file in `paths` that still exists.
pub async fn remove_files(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        if remove_file(path).await {
            removed += 1;
        }
    }
    removed
}

/// Remove a directory tree, treating "already gone" as success.
pub async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Move `files` into `dir`, keeping their names.
///
/// On error the files already moved are removed again; the rest are left
/// where they were.
pub async fn move_files(files: &[PathBuf], dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else {
            remove_files(&moved).await;
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("output path has no file name: {}", file.display()),
            ));
        };
        let target = dir.join(name);
        if let Err(e) = tokio::fs::rename(file, &target).await {
            remove_files(&moved).await;
            return Err(e);
        }
        moved.push(target);
    }
    Ok(moved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.mp4");
        tokio::fs::write(&file, b"x").await.unwrap();

        assert!(remove_file(&file).await);
        assert!(!remove_file(&file).await);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn test_remove_files_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("a.jpg");
        tokio::fs::write(&present, b"x").await.unwrap();

        let removed = remove_files(&[present.clone(), dir.path().join("b.jpg")]).await;
        assert_eq!(removed, 1);
        assert!(!present.exists());
    }

    #[tokio::test]
    async fn test_move_files_keeps_names_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".attempt-job-1");
        tokio::fs::create_dir(&scratch).await.unwrap();
        let frames = vec![scratch.join("f-0001.jpg"), scratch.join("f-0002.jpg")];
        for frame in &frames {
            tokio::fs::write(frame, b"x").await.unwrap();
        }

        let moved = move_files(&frames, dir.path()).await.unwrap();
        assert_eq!(
            moved,
            vec![dir.path().join("f-0001.jpg"), dir.path().join("f-0002.jpg")]
        );
        assert!(moved.iter().all(|p| p.exists()));
        assert!(frames.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn test_move_files_rolls_back_on_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".attempt-job-1");
        tokio::fs::create_dir(&scratch).await.unwrap();
        let present = scratch.join("a.jpg");
        tokio::fs::write(&present, b"x").await.unwrap();

        let result = move_files(&[present, scratch.join("missing.jpg")], dir.path()).await;
        assert!(result.is_err());
        assert!(!dir.path().join("a.jpg").exists());
    }

    #[tokio::test]
    async fn test_remove_dir_removes_partial_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".attempt-job-1");
        tokio::fs::create_dir(&scratch).await.unwrap();
        tokio::fs::write(scratch.join("partial.mp4"), b"x").await.unwrap();

        remove_dir(&scratch).await;
        assert!(!scratch.exists());
        remove_dir(&scratch).await;
    }
}
