use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const DEFAULT_BASE_URL: &str = "https://login.live.com";
const AUTHORIZE_PATH: &str = "/oauth20_authorize.srf";
const TOKEN_PATH: &str = "/oauth20_token.srf";

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";
pub const DEFAULT_SCOPES: &[&str] = &["wl.signin", "wl.offline_access", "onedrive.readwrite"];

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    base_url: Url,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Self::with_base_url(DEFAULT_BASE_URL, client_id, client_secret)
    }

    pub fn with_base_url(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, OAuthError> {
        Ok(Self {
            http: Client::new(),
            base_url: Url::parse(base_url)?,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
        })
    }

    /// The token endpoint checks that the redirect URI matches the one used to authorize.
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    pub fn authorize_url(
        &self,
        scope: Option<&str>,
        state: Option<&str>,
    ) -> Result<Url, OAuthError> {
        let default_scope = DEFAULT_SCOPES.join(" ");
        let mut url = self.base_url.join(AUTHORIZE_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("scope", scope.unwrap_or(&default_scope));
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", &self.redirect_uri);
            if let Some(state) = state {
                query.append_pair("state", state);
            }
        }
        Ok(url)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthToken, OAuthError> {
        debug!("exchanging authorization code");
        self.request_token(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthToken, OAuthError> {
        debug!("refreshing access token");
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn request_token(&self, grant: &[(&str, &str)]) -> Result<OAuthToken, OAuthError> {
        let url = self.base_url.join(TOKEN_PATH)?;
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self.http.post(url).form(&form).send().await?;
        if response.status().is_success() {
            Ok(response.json::<OAuthToken>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(OAuthError::Api { status, body })
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}
