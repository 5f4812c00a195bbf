use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Body, Client, StatusCode, redirect};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::monitor::AsyncOperation;
use crate::path::{self, PathError};

const DEFAULT_BASE_URL: &str = "https://api.onedrive.com/v1.0";

#[derive(Debug, Error)]
pub enum OneDriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error(transparent)]
    Path(#[from] PathError),
    #[error("{0} exists but is not a folder")]
    NotAFolder(String),
    #[error("async operation accepted without a Location header")]
    MissingLocation,
    #[error("async operation failed: {0}")]
    OperationFailed(String),
    #[error("async operation did not finish in time")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// What to do when an upload targets a name that already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictBehavior {
    Fail,
    #[default]
    Replace,
    Rename,
}

impl ConflictBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictBehavior::Fail => "fail",
            ConflictBehavior::Replace => "replace",
            ConflictBehavior::Rename => "rename",
        }
    }
}

impl fmt::Display for ConflictBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown conflict behavior {0:?}, expected fail, replace or rename")]
pub struct ParseConflictBehaviorError(String);

impl FromStr for ConflictBehavior {
    type Err = ParseConflictBehaviorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(ConflictBehavior::Fail),
            "replace" => Ok(ConflictBehavior::Replace),
            "rename" => Ok(ConflictBehavior::Rename),
            _ => Err(ParseConflictBehaviorError(s.to_string())),
        }
    }
}

#[derive(Clone)]
pub struct OneDriveClient {
    http: Client,
    monitor_http: Client,
    base_url: Url,
    token: String,
}

impl OneDriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, OneDriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, OneDriveError> {
        Ok(Self {
            http: Client::new(),
            // Monitor URLs answer 303 once the job is done; the redirect itself is the result.
            monitor_http: Client::builder()
                .redirect(redirect::Policy::none())
                .build()?,
            base_url: Url::parse(base_url)?,
            token: token.into(),
        })
    }

    pub async fn get_metadata(&self, path: &str) -> Result<DriveItem, OneDriveError> {
        let url = self.item_url(path, None)?;
        debug!(path, "fetching item metadata");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn find_item(&self, path: &str) -> Result<Option<DriveItem>, OneDriveError> {
        match self.get_metadata(path).await {
            Ok(item) => Ok(Some(item)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// `false` only on 404; auth and server failures are returned as errors.
    pub async fn exists(&self, path: &str) -> Result<bool, OneDriveError> {
        Ok(self.find_item(path).await?.is_some())
    }

    pub async fn get_sha1(&self, path: &str) -> Result<Option<String>, OneDriveError> {
        Ok(self.find_item(path).await?.and_then(|item| item.sha1()))
    }

    /// Creates the folder at `path`. An existing folder is returned as is.
    ///
    /// With `parents` set, missing ancestors are created first; the upward
    /// walk stops at the first ancestor that already exists.
    pub async fn mkdir(&self, path: &str, parents: bool) -> Result<DriveItem, OneDriveError> {
        let (parent, name) = path::split_parent(path)?;
        if let Some(existing) = self.find_item(path).await?
            && existing.is_folder()
        {
            info!(path, "folder exists");
            return Ok(existing);
        }
        if parents {
            self.ensure_folder(&parent).await?;
        }
        self.create_folder(&parent, &name).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), OneDriveError> {
        let url = self.item_url(path, None)?;
        let response = self
            .http
            .delete(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status() == StatusCode::NO_CONTENT {
            info!(path, "deleted");
            return Ok(());
        }
        Err(Self::api_error(response).await)
    }

    /// Server-side copy of `src` to `dst`.
    ///
    /// An existing destination file with the same SHA-1 is left alone. Any
    /// other existing destination is deleted before the copy is requested.
    pub async fn copy(&self, src: &str, dst: &str) -> Result<CopyOutcome, OneDriveError> {
        let (dst_parent, dst_name) = path::split_parent(dst)?;
        let source = self.get_metadata(src).await?;

        if let Some(target) = self.find_item(dst).await? {
            if !target.is_file() {
                info!(dst, "copy target is not a file, deleting");
                self.delete(dst).await?;
            } else if source.sha1().is_some() && source.sha1() == target.sha1() {
                info!(dst, "copy target has the same hash, skipping");
                return Ok(CopyOutcome::UpToDate(target));
            } else {
                info!(dst, "copy target has a different hash, deleting");
                self.delete(dst).await?;
            }
        }

        self.ensure_folder(&dst_parent).await?;

        let url = self.item_url(src, Some("action.copy"))?;
        let body = json!({
            "parentReference": { "path": path::drive_reference(&dst_parent)? },
            "name": dst_name,
        });
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .header("Prefer", "respond-async")
            .json(&body)
            .send()
            .await?;
        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::api_error(response).await);
        }
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(OneDriveError::MissingLocation)?;
        let location = Url::parse(location)?;
        info!(src, dst, "copy in progress");
        Ok(CopyOutcome::Started(self.operation(location)))
    }

    /// Moves `src` into the folder `dst_dir`, keeping its name.
    pub async fn move_item(&self, src: &str, dst_dir: &str) -> Result<DriveItem, OneDriveError> {
        let body = json!({
            "parentReference": { "path": path::drive_reference(dst_dir)? },
        });
        let item = self.patch_item(src, &body).await?;
        info!(src, dst_dir, "moved");
        Ok(item)
    }

    pub async fn rename(&self, src: &str, new_name: &str) -> Result<DriveItem, OneDriveError> {
        path::validate_name(new_name)?;
        let item = self.patch_item(src, &json!({ "name": new_name })).await?;
        info!(src, new_name, "renamed");
        Ok(item)
    }

    /// Single request upload; the service limits these to small files.
    pub async fn upload_simple(
        &self,
        data: impl Into<Bytes>,
        dst: &str,
        conflict: ConflictBehavior,
    ) -> Result<Uploaded, OneDriveError> {
        let data = data.into();
        debug!(dst, len = data.len(), %conflict, "uploading");
        self.upload_stream(Body::from(data), dst, conflict).await
    }

    pub async fn upload_stream(
        &self,
        body: Body,
        dst: &str,
        conflict: ConflictBehavior,
    ) -> Result<Uploaded, OneDriveError> {
        path::split_parent(dst)?;
        let mut url = self.item_url(dst, Some("content"))?;
        url.query_pairs_mut()
            .append_pair("@name.conflictBehavior", conflict.as_str());
        let response = self
            .http
            .put(url)
            .header("Authorization", self.auth_header_value())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let item: DriveItem = Self::handle_response(response).await?;
        info!(dst, name = %item.name, %status, "uploaded");
        Ok(Uploaded {
            item,
            replaced: status == StatusCode::OK,
        })
    }

    pub async fn download(&self, path: &str) -> Result<Bytes, OneDriveError> {
        Ok(self.download_response(path).await?.bytes().await?)
    }

    /// Starts a download and returns the un-buffered response.
    pub async fn download_response(&self, path: &str) -> Result<reqwest::Response, OneDriveError> {
        let url = self.item_url(path, Some("content"))?;
        debug!(path, "downloading");
        let response = self
            .http
            .get(url)
            .header("Authorization", self.auth_header_value())
            .send()
            .await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    pub fn operation(&self, location: Url) -> AsyncOperation {
        AsyncOperation::new(self.monitor_http.clone(), location)
    }

    async fn ensure_folder(&self, dir: &str) -> Result<(), OneDriveError> {
        let mut missing = Vec::new();
        let mut current = path::normalize_path(dir)?;
        while current != "/" {
            match self.find_item(&current).await? {
                Some(item) if item.is_folder() => break,
                Some(_) => return Err(OneDriveError::NotAFolder(current)),
                None => {
                    let (parent, _) = path::split_parent(&current)?;
                    missing.push(current);
                    current = parent;
                }
            }
        }
        for dir in missing.into_iter().rev() {
            let (parent, name) = path::split_parent(&dir)?;
            self.create_folder(&parent, &name).await?;
        }
        Ok(())
    }

    async fn create_folder(&self, parent: &str, name: &str) -> Result<DriveItem, OneDriveError> {
        let url = self.item_url(parent, Some("children"))?;
        let body = json!({
            "name": name,
            "folder": {},
            "@name.conflictBehavior": "fail",
        });
        let response = self
            .http
            .post(url)
            .header("Authorization", self.auth_header_value())
            .json(&body)
            .send()
            .await?;
        let item: DriveItem = Self::handle_response(response).await?;
        info!(parent, name, "created folder");
        Ok(item)
    }

    async fn patch_item(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<DriveItem, OneDriveError> {
        let url = self.item_url(path, None)?;
        let response = self
            .http
            .patch(url)
            .header("Authorization", self.auth_header_value())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn auth_header_value(&self) -> String {
        format!("bearer {}", self.token)
    }

    /// `{base}/drive/root:/a/b` or, with an action, `{base}/drive/root:/a/b:/action`.
    fn item_url(&self, path: &str, action: Option<&str>) -> Result<Url, OneDriveError> {
        let parts = path::segments(path)?;
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?;
            segments.pop_if_empty().push("drive");
            match parts.split_last() {
                None => {
                    segments.push("root");
                    if let Some(action) = action {
                        segments.push(action);
                    }
                }
                Some((last, init)) => {
                    segments.push("root:").extend(init);
                    match action {
                        None => {
                            segments.push(last);
                        }
                        Some(action) => {
                            segments.push(&format!("{last}:")).push(action);
                        }
                    }
                }
            }
        }
        Ok(url)
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, OneDriveError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            Err(Self::api_error(response).await)
        }
    }

    pub(crate) async fn api_error(response: reqwest::Response) -> OneDriveError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, body, "api error");
        OneDriveError::Api { status, body }
    }
}

impl OneDriveError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            OneDriveError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn classification(&self) -> Option<ApiErrorClass> {
        self.status().map(classify_api_status)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_EARLY)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default, rename = "eTag")]
    pub e_tag: Option<String>,
    #[serde(default)]
    pub last_modified_date_time: Option<String>,
    #[serde(default)]
    pub parent_reference: Option<ItemReference>,
    #[serde(default)]
    pub file: Option<FileFacet>,
    #[serde(default)]
    pub folder: Option<FolderFacet>,
}

impl DriveItem {
    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Lowercase SHA-1 of the content; the service reports it uppercase.
    pub fn sha1(&self) -> Option<String> {
        self.file
            .as_ref()?
            .hashes
            .as_ref()?
            .sha1_hash
            .as_deref()
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemReference {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub drive_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFacet {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub hashes: Option<Hashes>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hashes {
    #[serde(default)]
    pub sha1_hash: Option<String>,
    #[serde(default)]
    pub crc32_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFacet {
    #[serde(default)]
    pub child_count: Option<u64>,
}

#[derive(Debug)]
pub struct Uploaded {
    pub item: DriveItem,
    /// `true` when an existing item was overwritten (200), `false` when created (201).
    pub replaced: bool,
}

#[derive(Debug)]
pub enum CopyOutcome {
    UpToDate(DriveItem),
    Started(AsyncOperation),
}
