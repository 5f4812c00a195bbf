use std::io;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use onedrive_core::{
    ConflictBehavior, ContentHasher, OneDriveClient, OneDriveError, Uploaded, hashes_match,
};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Api(#[from] OneDriveError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download integrity check failed: expected {expected_sha1}, got {actual_sha1}")]
    IntegrityMismatch {
        expected_sha1: String,
        actual_sha1: String,
    },
}

/// Streams `remote` into `target` and returns the SHA-1 of what was written.
///
/// Data lands in `<target>.partial` first and is only renamed into place once
/// complete and, when `expected_sha1` is given, verified.
pub async fn download_to_path(
    client: &OneDriveClient,
    remote: &str,
    target: &Path,
    expected_sha1: Option<&str>,
) -> Result<String, TransferError> {
    let response = client.download_response(remote).await?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(target);
    let actual_sha1 = match write_partial(response, &partial).await {
        Ok(sha1) => sha1,
        Err(err) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(err);
        }
    };

    if let Some(expected_sha1) = expected_sha1
        && !hashes_match(expected_sha1, &actual_sha1)
    {
        warn!(remote, "downloaded content does not match the remote hash");
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(TransferError::IntegrityMismatch {
            expected_sha1: expected_sha1.to_ascii_lowercase(),
            actual_sha1,
        });
    }

    tokio::fs::rename(&partial, target).await?;
    info!(remote, target = %target.display(), "downloaded");
    Ok(actual_sha1)
}

async fn write_partial(
    response: reqwest::Response,
    partial: &Path,
) -> Result<String, TransferError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    let mut hasher = ContentHasher::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        hasher.update(&chunk);
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(hasher.finish())
}

pub async fn upload_from_path(
    client: &OneDriveClient,
    source: &Path,
    remote: &str,
    conflict: ConflictBehavior,
) -> Result<Uploaded, TransferError> {
    let file = tokio::fs::File::open(source).await?;
    let len = file.metadata().await?.len();
    debug!(source = %source.display(), remote, len, "streaming upload");
    let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
    Ok(client.upload_stream(body, remote, conflict).await?)
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
