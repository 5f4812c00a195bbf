use std::path::Path;

use serde::{Deserialize, Serialize};

use super::StorageError;

/// Application credentials registered with the Microsoft account service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientKeys {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientKeys {
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_incomplete_keys_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, r#"{"client_id": "only-id"}"#).unwrap();

        assert!(matches!(ClientKeys::load(&path), Err(StorageError::Json(_))));
    }
}
