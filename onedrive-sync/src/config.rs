use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;

use crate::storage::ClientKeys;

const APP_DIR_NAME: &str = "onedrive-sync";
const DEFAULT_API_URL: &str = "https://api.onedrive.com/v1.0";
const DEFAULT_AUTH_URL: &str = "https://login.live.com";
const DEFAULT_TOKEN_FILE: &str = "tokens.json";
const DEFAULT_KEYS_FILE: &str = "onedrive_keys.json";
const DEFAULT_REDIRECT_PORT: u16 = 8080;
const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;
const DEFAULT_POLL_MS: u64 = 1000;
const DEFAULT_COPY_TIMEOUT_SECS: u64 = 600;

#[derive(Clone, Debug)]
pub struct Config {
    /// Access token taken verbatim from the environment; skips the token cache.
    pub env_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub keys_file: PathBuf,
    pub token_file: PathBuf,
    pub api_url: String,
    pub auth_url: String,
    pub redirect_port: u16,
    pub oauth_timeout: Duration,
    pub poll_interval: Duration,
    pub copy_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let config_root = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
        Ok(Self::from_lookup(
            |name| std::env::var(name).ok(),
            &home,
            &config_root,
        ))
    }

    pub fn from_lookup<F>(lookup: F, home: &Path, config_root: &Path) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_dir = config_root.join(APP_DIR_NAME);
        let path_var = |name: &str, default: PathBuf| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(|value| expand_with_home(&value, home))
                .unwrap_or(default)
        };
        let string_var = |name: &str, default: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let u64_var = |name: &str, default: u64| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            env_token: non_empty("ONEDRIVE_TOKEN"),
            client_id: non_empty("ONEDRIVE_CLIENT_ID"),
            client_secret: non_empty("ONEDRIVE_CLIENT_SECRET"),
            keys_file: path_var("ONEDRIVE_KEYS_FILE", app_dir.join(DEFAULT_KEYS_FILE)),
            token_file: path_var("ONEDRIVE_TOKEN_FILE", app_dir.join(DEFAULT_TOKEN_FILE)),
            api_url: string_var("ONEDRIVE_API_URL", DEFAULT_API_URL),
            auth_url: string_var("ONEDRIVE_AUTH_URL", DEFAULT_AUTH_URL),
            redirect_port: lookup("ONEDRIVE_REDIRECT_PORT")
                .and_then(|value| value.trim().parse::<u16>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(DEFAULT_REDIRECT_PORT),
            oauth_timeout: Duration::from_secs(u64_var(
                "ONEDRIVE_OAUTH_TIMEOUT_SECS",
                DEFAULT_OAUTH_TIMEOUT_SECS,
            )),
            poll_interval: Duration::from_millis(u64_var("ONEDRIVE_POLL_MS", DEFAULT_POLL_MS)),
            copy_timeout: Duration::from_secs(u64_var(
                "ONEDRIVE_COPY_TIMEOUT_SECS",
                DEFAULT_COPY_TIMEOUT_SECS,
            )),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.redirect_port)
    }

    /// Client credentials from the environment, else from the keys file.
    pub fn client_keys(&self) -> anyhow::Result<Option<ClientKeys>> {
        if let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) {
            return Ok(Some(ClientKeys {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }));
        }
        if !self.keys_file.is_file() {
            return Ok(None);
        }
        let keys = ClientKeys::load(&self.keys_file)
            .with_context(|| format!("failed to read keys file {}", self.keys_file.display()))?;
        Ok(Some(keys))
    }
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(
            |name| vars.get(name).cloned(),
            Path::new("/home/me"),
            Path::new("/home/me/.config"),
        )
    }

    #[test]
    fn defaults_point_at_live_endpoints() {
        let config = config_with(&[]);
        assert_eq!(config.api_url, "https://api.onedrive.com/v1.0");
        assert_eq!(config.auth_url, "https://login.live.com");
        assert_eq!(config.redirect_uri(), "http://localhost:8080");
        assert_eq!(
            config.token_file,
            PathBuf::from("/home/me/.config/onedrive-sync/tokens.json")
        );
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert!(config.env_token.is_none());
    }

    #[test]
    fn expands_home_in_paths() {
        let config = config_with(&[
            ("ONEDRIVE_TOKEN_FILE", "~/secrets/tokens.json"),
            ("ONEDRIVE_KEYS_FILE", "/etc/onedrive/keys.json"),
        ]);
        assert_eq!(
            config.token_file,
            PathBuf::from("/home/me/secrets/tokens.json")
        );
        assert_eq!(config.keys_file, PathBuf::from("/etc/onedrive/keys.json"));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_with(&[
            ("ONEDRIVE_REDIRECT_PORT", "not-a-port"),
            ("ONEDRIVE_POLL_MS", "0"),
            ("ONEDRIVE_COPY_TIMEOUT_SECS", "30"),
        ]);
        assert_eq!(config.redirect_port, 8080);
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.copy_timeout, Duration::from_secs(30));
    }

    #[test]
    fn client_keys_prefer_environment() {
        let config = config_with(&[
            ("ONEDRIVE_CLIENT_ID", "env-id"),
            ("ONEDRIVE_CLIENT_SECRET", "env-secret"),
        ]);
        let keys = config.client_keys().unwrap().unwrap();
        assert_eq!(keys.client_id, "env-id");
        assert_eq!(keys.client_secret, "env-secret");
    }

    #[test]
    fn client_keys_fall_back_to_keys_file() {
        let dir = tempdir().unwrap();
        let keys_path = dir.path().join("onedrive_keys.json");
        std::fs::write(
            &keys_path,
            r#"{"client_id": "file-id", "client_secret": "file-secret"}"#,
        )
        .unwrap();
        let keys_path = keys_path.to_string_lossy().into_owned();
        let config = config_with(&[("ONEDRIVE_KEYS_FILE", &keys_path)]);

        let keys = config.client_keys().unwrap().unwrap();
        assert_eq!(keys.client_id, "file-id");
    }

    #[test]
    fn client_keys_are_optional() {
        let dir = tempdir().unwrap();
        let keys_path = dir.path().join("absent.json").to_string_lossy().into_owned();
        let config = config_with(&[("ONEDRIVE_KEYS_FILE", &keys_path)]);
        assert!(config.client_keys().unwrap().is_none());
    }
}
