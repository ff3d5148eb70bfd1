//! Staging of multipart uploads onto local disk.

use std::path::{Path, PathBuf};

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::Multipart;
use axum::http::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use mediaq_worker::cleanup;

use crate::error::{ApiError, ApiResult};

/// An uploaded input written to disk, plus the submitted options blob.
#[derive(Debug)]
pub struct StagedUpload {
    pub path: PathBuf,
    pub size: u64,
    /// `null` when no `options` field was sent
    pub options: serde_json::Value,
}

/// Read a `file` field and an optional JSON `options` field.
///
/// The file is streamed to `{upload_dir}/{uuid}-{filename}`. Any error after
/// the file was created removes it again.
pub async fn stage_upload(upload_dir: &Path, mut multipart: Multipart) -> ApiResult<StagedUpload> {
    tokio::fs::create_dir_all(upload_dir).await?;

    let mut staged: Option<(PathBuf, u64)> = None;
    let mut options = serde_json::Value::Null;

    let read = read_fields(upload_dir, &mut multipart, &mut staged, &mut options).await;

    match (read, staged) {
        (Ok(()), Some((path, size))) => Ok(StagedUpload {
            path,
            size,
            options,
        }),
        (Ok(()), None) => Err(ApiError::bad_request("No file provided")),
        (Err(e), staged) => {
            if let Some((path, _)) = staged {
                cleanup::remove_file(&path).await;
            }
            Err(e)
        }
    }
}

async fn read_fields(
    upload_dir: &Path,
    multipart: &mut Multipart,
    staged: &mut Option<(PathBuf, u64)>,
    options: &mut serde_json::Value,
) -> ApiResult<()> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                if staged.is_some() {
                    return Err(ApiError::bad_request("Only one file may be uploaded"));
                }
                let path = upload_dir.join(staged_name(field.file_name()));
                // Recorded before writing so a failed write is cleaned up
                *staged = Some((path.clone(), 0));
                let size = write_field(field, &path).await?;
                *staged = Some((path, size));
            }
            Some("options") => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    *options = serde_json::from_str(&text).map_err(|e| {
                        ApiError::bad_request(format!("options is not valid JSON: {e}"))
                    })?;
                }
            }
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(())
}

async fn write_field(mut field: Field<'_>, path: &Path) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut size = 0u64;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    debug!("Staged upload {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// `{uuid}-{name}`, keeping only the final component of the client's filename.
fn staged_name(client_name: Option<&str>) -> String {
    let name = client_name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .map(|n| n.trim())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .unwrap_or("upload");
    format!("{}-{}", Uuid::new_v4(), name)
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(format!("Failed to read multipart body: {}", e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_name_strips_directories() {
        let name = staged_name(Some("../../etc/passwd"));
        assert!(name.ends_with("-passwd"));
        assert!(!name.contains('/'));

        let name = staged_name(Some("C:\\videos\\clip.mov"));
        assert!(name.ends_with("-clip.mov"));
    }

    #[test]
    fn test_staged_name_falls_back() {
        assert!(staged_name(None).ends_with("-upload"));
        assert!(staged_name(Some("..")).ends_with("-upload"));
        assert!(staged_name(Some("dir/")).ends_with("-upload"));
    }
}
