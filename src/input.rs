//! Upload loading: turn a user-supplied path or URL into an [`Upload`].
//!
//! The pipeline itself only ever sees bytes plus a name. This module is the
//! glue for callers that start from a location instead: the CLI, batch
//! scripts. URLs are fetched fully into memory; uploads are small and the
//! validator enforces the size limit anyway.

use crate::pipeline::validate::Upload;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Fallback name when a URL path has no usable last segment. It carries no
/// extension, so the validator rejects it with a clear message.
const FALLBACK_NAME: &str = "download";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("File not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed for {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Download timed out after {secs}s: {url}")]
    DownloadTimeout { url: String, secs: u64 },
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load `input` (local path or HTTP(S) URL) as an upload with default options.
pub async fn load_upload(input: &str, timeout_secs: u64) -> Result<Upload, InputError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<Upload, InputError> {
    let path = PathBuf::from(path_str);
    let bytes = match tokio::fs::read(&path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(InputError::FileNotFound { path })
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(InputError::PermissionDenied { path })
        }
        Err(e) => return Err(InputError::Read { path, source: e }),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_str.to_string());
    debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload::new(name, bytes))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, InputError> {
    info!("Downloading upload from: {}", url);

    let failed = |reason: String| InputError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(Upload::new(name, bytes.to_vec()))
}

/// Last non-empty path segment of `url`, or a placeholder.
pub fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/1ehz.pdb"));
        assert!(is_url("http://example.com/angles.dat"));
        assert!(!is_url("/tmp/angles.dat"));
        assert!(!is_url("angles.dat"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_comes_from_last_segment() {
        assert_eq!(
            filename_from_url("https://files.rcsb.org/download/1EHZ.pdb"),
            "1EHZ.pdb"
        );
        assert_eq!(filename_from_url("https://example.com/a/b.dat?x=1"), "b.dat");
        assert_eq!(filename_from_url("https://example.com/"), FALLBACK_NAME);
        assert_eq!(filename_from_url("not a url"), FALLBACK_NAME);
    }

    #[tokio::test]
    async fn local_file_keeps_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trna.pdb");
        std::fs::write(&path, b"ATOM      1  P").unwrap();
        let upload = load_upload(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.artifact_name, "trna.pdb");
        assert_eq!(upload.bytes, b"ATOM      1  P");
    }

    #[tokio::test]
    async fn missing_local_file() {
        let err = load_upload("/definitely/not/here.dat", 5).await.unwrap_err();
        assert!(matches!(err, InputError::FileNotFound { .. }));
    }
}
