use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{OAuthState, StorageError};

/// JSON file holding the cached [`OAuthState`].
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<OAuthState>, StorageError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, state: &OAuthState) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = open_private(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "token cache written");
        Ok(())
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn has_token(&self) -> bool {
        matches!(self.load(), Ok(Some(_)))
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<std::fs::File> {
    std::fs::File::create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state() -> OAuthState {
        OAuthState {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(1_700_000_000),
            scope: Some("wl.signin wl.offline_access onedrive.readwrite".into()),
            token_type: Some("bearer".into()),
            user_id: None,
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().unwrap().is_none());
        assert!(!store.has_token());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("nested/dir/tokens.json"));

        store.save(&state()).unwrap();

        assert_eq!(store.load().unwrap(), Some(state()));
        assert!(!dir.path().join("nested/dir/tokens.json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&state()).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store.save(&state()).unwrap();

        store.delete().unwrap();
        store.delete().unwrap();
        assert!(!store.has_token());
    }

    #[test]
    fn reads_token_response_shaped_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{"access_token": "EwA", "refresh_token": "MC", "expires_in": 3600, "token_type": "bearer"}"#,
        )
        .unwrap();

        let state = TokenStore::new(&path).load().unwrap().unwrap();
        assert_eq!(state.access_token, "EwA");
        assert_eq!(state.refresh_token.as_deref(), Some("MC"));
        assert_eq!(state.expires_at, None);
    }
}
