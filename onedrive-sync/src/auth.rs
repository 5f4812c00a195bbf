use anyhow::Context;
use onedrive_core::{ApiErrorClass, OAuthClient, OneDriveClient};
use tracing::{info, warn};

use crate::config::Config;
use crate::oauth_flow::OAuthFlow;
use crate::storage::{OAuthState, TokenStore};
use crate::token_provider::TokenProvider;

/// Returns a usable access token.
///
/// `ONEDRIVE_TOKEN` wins when set. Otherwise the cached session is loaded (or
/// created through the browser flow), refreshed when expired or rejected,
/// and written back to the token cache.
pub async fn login(config: &Config) -> anyhow::Result<String> {
    if let Some(token) = &config.env_token {
        return Ok(token.clone());
    }
    let store = TokenStore::new(&config.token_file);
    let oauth_client = oauth_client(config)?;
    let state = match store.load().context("failed to read token cache")? {
        Some(state) => state,
        None => {
            let client = oauth_client.clone().with_context(|| missing_keys_message(config))?;
            authenticate_and_store(&store, client, config).await?
        }
    };

    let mut provider = TokenProvider::new(state, oauth_client);
    let token = verify_with_refresh(&mut provider, config).await?;
    store
        .save(provider.state())
        .context("failed to persist oauth state")?;
    Ok(token)
}

/// Runs the browser flow unconditionally and replaces the cached session.
pub async fn interactive_login(config: &Config) -> anyhow::Result<OAuthState> {
    let client = oauth_client(config)?.with_context(|| missing_keys_message(config))?;
    let store = TokenStore::new(&config.token_file);
    authenticate_and_store(&store, client, config).await
}

pub fn logout(config: &Config) -> anyhow::Result<()> {
    TokenStore::new(&config.token_file)
        .delete()
        .context("failed to remove token cache")?;
    info!(path = %config.token_file.display(), "saved token removed");
    Ok(())
}

pub async fn connect(config: &Config) -> anyhow::Result<OneDriveClient> {
    let token = login(config).await?;
    OneDriveClient::with_base_url(&config.api_url, token).context("invalid api url")
}

async fn authenticate_and_store(
    store: &TokenStore,
    client: OAuthClient,
    config: &Config,
) -> anyhow::Result<OAuthState> {
    let flow = OAuthFlow::new(client, config.redirect_port).with_timeout(config.oauth_timeout);
    let token = flow.authenticate().await.context("browser login failed")?;
    let state = OAuthState::from_oauth_token(&token);
    store.save(&state).context("failed to save token")?;
    info!(path = %store.path().display(), "signed in");
    Ok(state)
}

fn oauth_client(config: &Config) -> anyhow::Result<Option<OAuthClient>> {
    let Some(keys) = config.client_keys()? else {
        return Ok(None);
    };
    let client = OAuthClient::with_base_url(&config.auth_url, keys.client_id, keys.client_secret)
        .context("invalid oauth base url/config")?
        .with_redirect_uri(config.redirect_uri());
    Ok(Some(client))
}

async fn verify_with_refresh(
    provider: &mut TokenProvider,
    config: &Config,
) -> anyhow::Result<String> {
    let token = provider
        .valid_access_token()
        .await
        .context("failed to resolve valid access token")?;
    let client = OneDriveClient::with_base_url(&config.api_url, token.clone())?;
    match client.get_metadata("/").await {
        Ok(_) => Ok(token),
        Err(err) if matches!(err.classification(), Some(ApiErrorClass::Auth)) => {
            warn!("access token rejected, refreshing");
            let refreshed = provider
                .refresh_now()
                .await
                .context("failed to refresh token after 401")?;
            let retry_client = OneDriveClient::with_base_url(&config.api_url, refreshed.clone())?;
            retry_client
                .get_metadata("/")
                .await
                .context("refreshed token was rejected")?;
            Ok(refreshed)
        }
        Err(err) => Err(err.into()),
    }
}

fn missing_keys_message(config: &Config) -> String {
    format!(
        "no client credentials: set ONEDRIVE_CLIENT_ID and ONEDRIVE_CLIENT_SECRET or create {}",
        config.keys_file.display()
    )
}
