mod keys;
mod token_store;

use onedrive_core::OAuthToken;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use keys::ClientKeys;
pub use token_store::TokenStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persisted OAuth session. `expires_at` is a unix timestamp in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OAuthState {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl OAuthState {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now_unix().saturating_add(i64::try_from(secs).unwrap_or(i64::MAX))),
            scope: token.scope.clone(),
            token_type: token.token_type.clone(),
            user_id: token.user_id.clone(),
        }
    }
}

pub(crate) fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_token_computes_expiry() {
        let token = OAuthToken {
            access_token: "access".into(),
            token_type: Some("bearer".into()),
            expires_in: Some(3600),
            refresh_token: Some("refresh".into()),
            scope: Some("wl.signin".into()),
            user_id: Some("AA".into()),
        };
        let before = now_unix();
        let state = OAuthState::from_oauth_token(&token);

        let expires_at = state.expires_at.unwrap();
        assert!(expires_at >= before + 3600 && expires_at <= now_unix() + 3600);
        assert_eq!(state.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(state.token_type.as_deref(), Some("bearer"));
        assert_eq!(state.user_id.as_deref(), Some("AA"));
    }

    #[test]
    fn state_without_expiry_stays_open() {
        let token = OAuthToken {
            access_token: "access".into(),
            token_type: Some("bearer".into()),
            expires_in: None,
            refresh_token: None,
            scope: None,
            user_id: None,
        };
        assert_eq!(OAuthState::from_oauth_token(&token).expires_at, None);
    }
}
