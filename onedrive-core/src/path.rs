use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("remote path contains unsupported component: {0}")]
    UnsupportedComponent(String),
    #[error("remote path has no parent: {0}")]
    NoParent(String),
    #[error("invalid item name: {0:?}")]
    InvalidName(String),
}

/// Splits a POSIX-like remote path ("/Docs/A.txt") into its non-empty segments.
pub(crate) fn segments(path: &str) -> Result<Vec<&str>, PathError> {
    let mut out = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(PathError::UnsupportedComponent(path.to_string())),
            other => out.push(other),
        }
    }
    Ok(out)
}

pub fn normalize_path(path: &str) -> Result<String, PathError> {
    Ok(format!("/{}", segments(path)?.join("/")))
}

/// Returns `(parent, name)`; the root has no parent.
pub fn split_parent(path: &str) -> Result<(String, String), PathError> {
    let parts = segments(path)?;
    let (name, parents) = parts
        .split_last()
        .ok_or_else(|| PathError::NoParent(path.to_string()))?;
    Ok((format!("/{}", parents.join("/")), (*name).to_string()))
}

pub fn join_path(dir: &str, name: &str) -> Result<String, PathError> {
    validate_name(name)?;
    let dir = normalize_path(dir)?;
    if dir == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{dir}/{name}"))
    }
}

/// Path form used inside `parentReference` payloads.
pub(crate) fn drive_reference(dir: &str) -> Result<String, PathError> {
    Ok(format!("/drive/root:{}", normalize_path(dir)?))
}

pub(crate) fn validate_name(name: &str) -> Result<(), PathError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(PathError::InvalidName(name.to_string()));
    }
    Ok(())
}
