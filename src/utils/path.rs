//! Validation of caller-supplied artifact paths before anything reaches the store.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,

    #[error("path '{0}' contains an empty, '.' or '..' segment")]
    InvalidSegment(String),

    #[error("path '{path}' must end with '{suffix}'")]
    MissingSuffix { path: String, suffix: String },
}

/// Normalises a target path (leading/trailing slashes stripped) and applies the
/// optional suffix policy.
pub fn validate_target(path: &str, required_suffix: Option<&str>) -> Result<String, PathError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }
    if trimmed
        .split('/')
        .any(|s| s.is_empty() || s == "." || s == "..")
    {
        return Err(PathError::InvalidSegment(trimmed.to_string()));
    }
    if let Some(suffix) = required_suffix.filter(|s| !s.is_empty())
        && !trimmed.ends_with(suffix)
    {
        return Err(PathError::MissingSuffix {
            path: trimmed.to_string(),
            suffix: suffix.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// Joins a directory prefix and a file name with exactly one separator.
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
