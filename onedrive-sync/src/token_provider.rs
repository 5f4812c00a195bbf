use onedrive_core::OAuthClient;
use thiserror::Error;
use tracing::{debug, info};

use crate::storage::{OAuthState, now_unix};

/// Tokens this close to expiry are treated as expired.
const REFRESH_SKEW_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("oauth client is required to refresh expired token")]
    MissingOAuthClient,
    #[error("refresh token is missing")]
    MissingRefreshToken,
    #[error("oauth refresh failed: {0}")]
    OAuth(#[from] onedrive_core::OAuthError),
}

/// Hands out access tokens for a cached session, refreshing through the
/// live.com token endpoint when the current one is about to expire.
pub struct TokenProvider {
    state: OAuthState,
    oauth_client: Option<OAuthClient>,
}

impl TokenProvider {
    pub fn new(state: OAuthState, oauth_client: Option<OAuthClient>) -> Self {
        Self {
            state,
            oauth_client,
        }
    }

    pub fn state(&self) -> &OAuthState {
        &self.state
    }

    pub async fn valid_access_token(&mut self) -> Result<String, TokenProviderError> {
        if self.expires_soon() {
            debug!(expires_at = ?self.state.expires_at, "access token expires soon");
            self.refresh().await?;
        }
        Ok(self.state.access_token.clone())
    }

    /// Refreshes regardless of the recorded expiry, e.g. after a 401.
    pub async fn refresh_now(&mut self) -> Result<String, TokenProviderError> {
        self.refresh().await?;
        Ok(self.state.access_token.clone())
    }

    fn expires_soon(&self) -> bool {
        self.state
            .expires_at
            .is_some_and(|expires_at| expires_at <= now_unix().saturating_add(REFRESH_SKEW_SECS))
    }

    async fn refresh(&mut self) -> Result<(), TokenProviderError> {
        let refresh_token = self
            .state
            .refresh_token
            .as_deref()
            .ok_or(TokenProviderError::MissingRefreshToken)?;
        let client = self
            .oauth_client
            .as_ref()
            .ok_or(TokenProviderError::MissingOAuthClient)?;
        let token = client.refresh_token(refresh_token).await?;
        let refreshed = OAuthState::from_oauth_token(&token);
        self.state = carry_over(refreshed, &self.state);
        info!("access token refreshed");
        Ok(())
    }
}

/// live.com may omit fields on refresh; keep what the previous session had.
fn carry_over(mut refreshed: OAuthState, previous: &OAuthState) -> OAuthState {
    if refreshed.refresh_token.is_none() {
        refreshed.refresh_token = previous.refresh_token.clone();
    }
    if refreshed.scope.is_none() {
        refreshed.scope = previous.scope.clone();
    }
    if refreshed.token_type.is_none() {
        refreshed.token_type = previous.token_type.clone();
    }
    if refreshed.user_id.is_none() {
        refreshed.user_id = previous.user_id.clone();
    }
    refreshed
}
