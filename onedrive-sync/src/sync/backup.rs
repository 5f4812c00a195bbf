use std::io;
use std::path::Path;
use std::time::Duration;

use onedrive_core::{
    CompletedOperation, ConflictBehavior, CopyOutcome, DriveItem, OneDriveClient, OneDriveError,
    Uploaded, hashes_match, sha1_file, split_parent,
};
use thiserror::Error;
use tracing::{debug, info};

use super::transfer::{TransferError, upload_from_path};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Api(#[from] OneDriveError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("failed to hash local file: {0}")]
    Io(#[from] io::Error),
    #[error("hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a server-side copy was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SourceMissing,
    SourceNotFile,
    HashMismatch,
}

#[derive(Debug)]
pub enum CopyDecision {
    Skipped(SkipReason),
    Copied(CopyOutcome),
}

#[derive(Debug)]
pub enum BackupOutcome {
    /// The destination already holds the local content.
    UpToDate(DriveItem),
    Copied(CompletedOperation),
    Uploaded(Uploaded),
}

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub conflict: ConflictBehavior,
    pub poll_interval: Duration,
    pub copy_timeout: Option<Duration>,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            conflict: ConflictBehavior::Replace,
            poll_interval: Duration::from_secs(1),
            copy_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Copies `src` to `dst` on the server, but only when `src` is a file whose
/// content hash equals `local_sha1`.
pub async fn copy_if_same_hash(
    client: &OneDriveClient,
    src: &str,
    dst: &str,
    local_sha1: &str,
) -> Result<CopyDecision, OneDriveError> {
    let Some(source) = client.find_item(src).await? else {
        info!(src, "copy source does not exist");
        return Ok(CopyDecision::Skipped(SkipReason::SourceMissing));
    };
    if !source.is_file() {
        info!(src, "copy source is not a file");
        return Ok(CopyDecision::Skipped(SkipReason::SourceNotFile));
    }
    match source.sha1() {
        Some(remote_sha1) if hashes_match(&remote_sha1, local_sha1) => {}
        _ => {
            info!(src, "copy source hash differs from local file");
            return Ok(CopyDecision::Skipped(SkipReason::HashMismatch));
        }
    }
    Ok(CopyDecision::Copied(client.copy(src, dst).await?))
}

/// Brings `remote_dst` in line with the local file at `local`.
///
/// A server-side copy from `remote_src` is preferred when that item already
/// holds the same content; the file is uploaded otherwise.
pub async fn backup_file(
    client: &OneDriveClient,
    local: &Path,
    remote_src: &str,
    remote_dst: &str,
    options: &BackupOptions,
) -> Result<BackupOutcome, BackupError> {
    let local_path = local.to_path_buf();
    let local_sha1 = tokio::task::spawn_blocking(move || sha1_file(&local_path)).await??;
    debug!(local = %local.display(), sha1 = %local_sha1, "hashed local file");

    if let Some(current) = client.find_item(remote_dst).await?
        && current
            .sha1()
            .is_some_and(|remote| hashes_match(&remote, &local_sha1))
    {
        info!(remote_dst, "backup is up to date");
        return Ok(BackupOutcome::UpToDate(current));
    }

    match copy_if_same_hash(client, remote_src, remote_dst, &local_sha1).await? {
        CopyDecision::Copied(CopyOutcome::UpToDate(item)) => {
            return Ok(BackupOutcome::UpToDate(item));
        }
        CopyDecision::Copied(CopyOutcome::Started(operation)) => {
            let mut operation = operation.with_poll_interval(options.poll_interval);
            if let Some(timeout) = options.copy_timeout {
                operation = operation.with_timeout(timeout);
            }
            let done = operation.wait().await?;
            info!(remote_src, remote_dst, "backup copied server-side");
            return Ok(BackupOutcome::Copied(done));
        }
        CopyDecision::Skipped(reason) => {
            debug!(?reason, remote_src, "falling back to upload");
        }
    }

    let (parent, _) = split_parent(remote_dst).map_err(OneDriveError::from)?;
    if parent != "/" {
        client.mkdir(&parent, true).await?;
    }
    let uploaded = upload_from_path(client, local, remote_dst, options.conflict).await?;
    info!(remote_dst, "backup uploaded");
    Ok(BackupOutcome::Uploaded(uploaded))
}
