//! Job result payloads.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::MediaInfo;

/// Where result artifacts are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StorageMode {
    /// Artifacts stay on local disk and are streamed by the API
    #[default]
    #[serde(rename = "stateless")]
    Stateless,
    /// Artifacts are uploaded and referenced by URL
    #[serde(rename = "object-storage", alias = "s3")]
    ObjectStorage,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Stateless => "stateless",
            StorageMode::ObjectStorage => "object-storage",
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stateless" | "local" => Ok(StorageMode::Stateless),
            "object-storage" | "s3" => Ok(StorageMode::ObjectStorage),
            other => Err(format!("unknown storage mode: {other}")),
        }
    }
}

/// A single resolved artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredArtifact {
    Local(PathBuf),
    Remote(String),
}

/// Result payload attached to a job in a terminal state.
///
/// Exactly the fields relevant to the operation are populated:
/// single-artifact operations set `outputPath` or `url`, frame extraction sets
/// `outputPaths` or `urls`, probe sets `metadata` only, failures set `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StorageMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_paths: Option<Vec<PathBuf>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    fn empty(success: bool) -> Self {
        Self {
            success,
            mode: None,
            output_path: None,
            output_paths: None,
            url: None,
            urls: None,
            metadata: None,
            error: None,
        }
    }

    /// Failure payload. An empty description is replaced so the terminal
    /// payload always carries an error.
    pub fn failure(mode: StorageMode, error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            error
        };
        Self {
            mode: Some(mode),
            error: Some(error),
            ..Self::empty(false)
        }
    }

    /// Success payload for a single artifact.
    pub fn single(mode: StorageMode, artifact: StoredArtifact) -> Self {
        let mut result = Self {
            mode: Some(mode),
            ..Self::empty(true)
        };
        match artifact {
            StoredArtifact::Local(path) => result.output_path = Some(path),
            StoredArtifact::Remote(url) => result.url = Some(url),
        }
        result
    }

    /// Success payload for an ordered list of artifacts.
    ///
    /// Mixed local/remote lists are not produced by the resolver, so only
    /// the variant matching `mode` is collected.
    pub fn multiple(mode: StorageMode, artifacts: Vec<StoredArtifact>) -> Self {
        let mut result = Self {
            mode: Some(mode),
            ..Self::empty(true)
        };
        match mode {
            StorageMode::Stateless => {
                result.output_paths = Some(
                    artifacts
                        .into_iter()
                        .filter_map(|a| match a {
                            StoredArtifact::Local(p) => Some(p),
                            StoredArtifact::Remote(_) => None,
                        })
                        .collect(),
                )
            }
            StorageMode::ObjectStorage => {
                result.urls = Some(
                    artifacts
                        .into_iter()
                        .filter_map(|a| match a {
                            StoredArtifact::Remote(u) => Some(u),
                            StoredArtifact::Local(_) => None,
                        })
                        .collect(),
                )
            }
        }
        result
    }

    /// Success payload for a probe.
    pub fn probe(mode: StorageMode, metadata: MediaInfo) -> Self {
        Self {
            mode: Some(mode),
            metadata: Some(metadata),
            ..Self::empty(true)
        }
    }

    /// Local artifact paths in extraction order.
    pub fn local_paths(&self) -> Vec<&PathBuf> {
        match (&self.output_path, &self.output_paths) {
            (Some(p), _) => vec![p],
            (None, Some(ps)) => ps.iter().collect(),
            (None, None) => Vec::new(),
        }
    }

    /// Whether the payload satisfies the terminal-payload rules.
    pub fn is_valid(&self) -> bool {
        if !self.success {
            return self.error.as_deref().is_some_and(|e| !e.trim().is_empty());
        }
        if self.metadata.is_some() {
            return true;
        }
        let single = self.output_path.is_some() as u8 + self.url.is_some() as u8;
        let multi = self.output_paths.is_some() as u8 + self.urls.is_some() as u8;
        single + multi == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&StorageMode::ObjectStorage).unwrap(),
            "\"object-storage\""
        );
        let parsed: StorageMode = serde_json::from_str("\"s3\"").unwrap();
        assert_eq!(parsed, StorageMode::ObjectStorage);
        assert_eq!("S3".parse::<StorageMode>().unwrap(), StorageMode::ObjectStorage);
        assert!("ftp".parse::<StorageMode>().is_err());
    }

    #[test]
    fn failure_never_has_empty_error() {
        let result = JobResult::failure(StorageMode::Stateless, "   ");
        assert_eq!(result.error.as_deref(), Some("Unknown error"));
        assert!(result.is_valid());
    }

    #[test]
    fn failure_and_probe_carry_storage_mode() {
        let failed = JobResult::failure(StorageMode::ObjectStorage, "Upload failed");
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["mode"], "object-storage");
        assert_eq!(json["success"], false);

        let probed = JobResult::probe(StorageMode::Stateless, MediaInfo::default());
        let json = serde_json::to_value(&probed).unwrap();
        assert_eq!(json["mode"], "stateless");
        assert!(json.get("outputPath").is_none());
        assert!(probed.is_valid());
    }

    #[test]
    fn single_local_artifact_sets_only_output_path() {
        let result = JobResult::single(
            StorageMode::Stateless,
            StoredArtifact::Local(PathBuf::from("/tmp/out.mp4")),
        );
        assert!(result.is_valid());
        assert!(result.url.is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["mode"], "stateless");
        assert_eq!(json["outputPath"], "/tmp/out.mp4");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn single_remote_artifact_sets_only_url() {
        let result = JobResult::single(
            StorageMode::ObjectStorage,
            StoredArtifact::Remote("https://cdn.example.com/a.mp4".into()),
        );
        assert!(result.is_valid());
        assert!(result.output_path.is_none());
        assert!(result.local_paths().is_empty());
    }

    #[test]
    fn multiple_preserves_order() {
        let result = JobResult::multiple(
            StorageMode::Stateless,
            vec![
                StoredArtifact::Local("/tmp/f1.jpg".into()),
                StoredArtifact::Local("/tmp/f2.jpg".into()),
            ],
        );
        let paths = result.local_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].ends_with("f1.jpg"));
        assert!(result.is_valid());
    }

    #[test]
    fn empty_success_is_invalid() {
        assert!(!JobResult::empty(true).is_valid());
    }
}
