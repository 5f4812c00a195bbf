use std::time::{Duration, Instant};

use reqwest::Client;
use reqwest::header::LOCATION;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::client::{OneDriveClient, OneDriveError};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Handle on a long running server-side job, e.g. a copy.
///
/// The monitor URL is pre-authorised, so polls carry no bearer token.
#[derive(Debug, Clone)]
pub struct AsyncOperation {
    http: Client,
    location: Url,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Updating,
    Failed,
    DeletePending,
    DeleteFailed,
    Waiting,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub percentage_complete: Option<f64>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub status_description: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOperation {
    /// Where the resulting item lives, when the service redirected to it.
    pub resource_location: Option<Url>,
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OperationState {
    Pending(OperationStatus),
    Completed(CompletedOperation),
}

impl AsyncOperation {
    pub(crate) fn new(http: Client, location: Url) -> Self {
        Self {
            http,
            location,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn poll(&self) -> Result<OperationState, OneDriveError> {
        let response = self.http.get(self.location.clone()).send().await?;
        let status = response.status();

        if status.is_redirection() {
            let resource_location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(|value| self.location.join(value))
                .transpose()?;
            return Ok(OperationState::Completed(CompletedOperation {
                resource_location,
                resource_id: None,
            }));
        }
        if !status.is_success() {
            return Err(OneDriveClient::api_error(response).await);
        }

        let info: OperationStatus = response.json().await?;
        match info.status {
            JobStatus::Failed => Err(OneDriveError::OperationFailed(
                info.status_description
                    .unwrap_or_else(|| "no description".to_string()),
            )),
            JobStatus::Completed => Ok(OperationState::Completed(CompletedOperation {
                resource_location: None,
                resource_id: info.resource_id,
            })),
            _ if info.percentage_complete.unwrap_or(0.0) >= 100.0 => {
                Ok(OperationState::Completed(CompletedOperation {
                    resource_location: None,
                    resource_id: info.resource_id,
                }))
            }
            _ => Ok(OperationState::Pending(info)),
        }
    }

    /// Polls until the job completes, fails, or the timeout elapses.
    pub async fn wait(&self) -> Result<CompletedOperation, OneDriveError> {
        let started = Instant::now();
        loop {
            match self.poll().await? {
                OperationState::Completed(done) => return Ok(done),
                OperationState::Pending(progress) => {
                    debug!(
                        location = %self.location,
                        status = ?progress.status,
                        percentage = progress.percentage_complete.unwrap_or(0.0),
                        "operation pending"
                    );
                }
            }
            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                return Err(OneDriveError::Timeout);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
