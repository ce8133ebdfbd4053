//! Object-store abstraction over a remote, content-addressed Git repository.
//!
//! The [`ObjectStore`] trait exposes two families of primitives:
//! - object level: resolve a branch, create blobs/trees/commits, move a ref;
//! - path level: read a path's current content and create-or-update it in one call.
//!
//! [`github::GithubStore`] talks to the GitHub REST API, [`memory::MemoryStore`]
//! keeps everything in process with Git-compatible object ids.

pub mod github;
pub mod memory;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hex object id (`sha`) of a blob, tree or commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Accepts 40 (SHA-1) or 64 (SHA-256) hex digits, normalised to lowercase.
    pub fn new(hex: impl Into<String>) -> Result<Self, StoreError> {
        let hex = hex.into();
        let valid_len = matches!(hex.len(), 40 | 64);
        if !valid_len || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(StoreError::InvalidObjectId(hex));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Snapshot of a branch tip taken at the start of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchTip {
    pub commit: ObjectId,
    pub tree: ObjectId,
}

/// Mode of a file entry written into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
}

impl FileMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
        }
    }
}

/// One path → blob overlay applied on top of a base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob: ObjectId,
    pub mode: FileMode,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, blob: ObjectId) -> Self {
        Self {
            path: path.into(),
            blob,
            mode: FileMode::Regular,
        }
    }
}

/// Current content of a path on a branch.
#[derive(Debug, Clone)]
pub struct PathContent {
    pub bytes: Bytes,
    pub object_id: ObjectId,
    pub html_url: Option<String>,
    pub download_url: Option<String>,
}

/// Result of a path-level create-or-update.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub object_id: ObjectId,
    pub commit: Option<ObjectId>,
    pub html_url: Option<String>,
    pub download_url: Option<String>,
    /// `true` when the path did not exist before the write.
    pub created: bool,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid base tree: {0}")]
    InvalidBase(String),

    /// An optimistic-concurrency check failed; the whole write may be retried
    /// from its first read.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JsonError: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed access to the remote store's primitives.
///
/// Every `create_*`, `update_*` and `put_*` call mutates remote state and none
/// of them can be rolled back.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the tip commit of `branch` and the tree it points at.
    async fn resolve_branch(&self, branch: &str) -> StoreResult<BranchTip>;

    /// Stores `bytes` as a blob. Identical bytes always yield the same id.
    async fn create_blob(&self, bytes: &[u8]) -> StoreResult<ObjectId>;

    /// Derives a new tree from `base_tree`, adding or replacing `entries` and
    /// keeping everything else.
    async fn create_tree(&self, base_tree: &ObjectId, entries: &[TreeEntry])
    -> StoreResult<ObjectId>;

    /// Builds a commit object. Does not move any reference.
    async fn create_commit(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> StoreResult<ObjectId>;

    /// Points `branch` at `new_commit`. Unless `force` is set, fails with
    /// [`StoreError::Conflict`] when the branch no longer equals `expected_previous`.
    async fn update_branch(
        &self,
        branch: &str,
        new_commit: &ObjectId,
        expected_previous: &ObjectId,
        force: bool,
    ) -> StoreResult<()>;

    /// Reads `path` on `branch`, [`StoreError::NotFound`] if it does not exist.
    async fn get_path_content(&self, branch: &str, path: &str) -> StoreResult<PathContent>;

    /// Creates or overwrites `path` on `branch` in a single commit.
    ///
    /// With `expected_object` set the write only succeeds if it still matches the
    /// path's current object id; without it the path must not exist yet.
    async fn put_path_content(
        &self,
        branch: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected_object: Option<&ObjectId>,
    ) -> StoreResult<PutOutcome>;
}

/// Splits a repository path into its segments, rejecting empty, `.` and `..` parts.
pub fn path_segments(path: &str) -> StoreResult<Vec<&str>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
