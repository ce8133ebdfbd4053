//! GitHub REST v3 implementation of [`ObjectStore`].
//!
//! Object-level primitives map to the Git Data API (`/git/refs`, `/git/blobs`,
//! `/git/trees`, `/git/commits`), path-level primitives to the Contents API
//! (`/contents/{path}`).
//!
//! GitHub offers no compare-and-swap on references. [`GithubStore::update_branch`]
//! re-reads the ref and refuses to proceed if it moved, then issues a
//! non-forced update; GitHub's own fast-forward check closes the remaining
//! window because the new commit's sole parent is the expected tip.

use std::{fmt, time::Duration};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::{
    Deserialize, Serialize,
    de::{DeserializeOwned, IgnoredAny},
};
use url::Url;

use super::{
    BranchTip, ObjectId, ObjectStore, PathContent, PutOutcome, StoreError, StoreResult, TreeEntry,
    path_segments,
};
use crate::{internal::config::GithubSettings, utils::http};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_API_VERSION: &str = "2022-11-28";

/// Which primitive a request belongs to; drives status-code classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    ResolveBranch,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateBranch,
    GetContent,
    PutContent,
}

fn classify(op: Operation, status: StatusCode, message: String) -> StoreError {
    match (op, status.as_u16()) {
        (Operation::CreateTree, 404 | 422) => StoreError::InvalidBase(message),
        (_, 404) => StoreError::NotFound(message),
        // 422 on a ref update is "Update is not a fast forward"; on contents it is
        // a missing or stale `sha`.
        (Operation::UpdateBranch, 422) | (Operation::PutContent, 409 | 422) => {
            StoreError::Conflict(message)
        }
        (_, 409) => StoreError::Conflict(message),
        (_, code) => StoreError::Upstream {
            status: code,
            message,
        },
    }
}

/// GitHub wraps base64 payloads at 60 columns.
fn decode_content(path: &str, content: &str) -> StoreResult<Bytes> {
    let compact: String = content.split_whitespace().collect();
    STANDARD
        .decode(compact)
        .map(Bytes::from)
        .map_err(|e| StoreError::Malformed(format!("content of '{path}' is not base64: {e}")))
}

// ================================================================
// GitHub API types
// ================================================================

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ShaBody {
    sha: ObjectId,
}

#[derive(Debug, Deserialize)]
struct RefBody {
    object: ShaBody,
}

#[derive(Debug, Deserialize)]
struct CommitBody {
    tree: ShaBody,
}

#[derive(Debug, Serialize)]
struct CreateBlobRequest {
    content: String,
    encoding: &'static str,
}

#[derive(Debug, Serialize)]
struct TreeItemRequest<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a ObjectId,
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a ObjectId,
    tree: Vec<TreeItemRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a ObjectId,
    parents: &'a [ObjectId],
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a ObjectId,
    force: bool,
}

#[derive(Debug, Deserialize)]
struct FileBody {
    #[serde(rename = "type")]
    kind: String,
    sha: ObjectId,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
    html_url: Option<String>,
    download_url: Option<String>,
}

/// `GET /contents/{path}` answers with an object for files and an array for directories.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsBody {
    File(FileBody),
    Listing(Vec<IgnoredAny>),
}

#[derive(Debug, Deserialize)]
struct BlobBody {
    content: String,
    encoding: String,
}

#[derive(Debug, Serialize)]
struct PutContentRequest<'a> {
    message: &'a str,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a ObjectId>,
}

#[derive(Debug, Deserialize)]
struct PutContentFile {
    sha: ObjectId,
    html_url: Option<String>,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutContentBody {
    content: PutContentFile,
    commit: ShaBody,
}

// ================================================================
// Client
// ================================================================

/// Object store backed by one GitHub repository.
#[derive(Clone)]
pub struct GithubStore {
    http_client: HttpClient,
    api_url: Url,
    owner: String,
    repo: String,
    token: Option<String>,
}

impl fmt::Debug for GithubStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubStore")
            .field("api_url", &self.api_url.as_str())
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl GithubStore {
    pub fn new(
        api_url: &str,
        owner: impl Into<String>,
        repo: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> StoreResult<Self> {
        let api_url = Url::parse(api_url)
            .map_err(|e| StoreError::Malformed(format!("invalid API url '{api_url}': {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(StoreError::Malformed(format!(
                "API url '{api_url}' cannot be a base"
            )));
        }
        Ok(Self {
            http_client: http::client(timeout),
            api_url,
            owner: owner.into(),
            repo: repo.into(),
            token,
        })
    }

    pub fn from_settings(settings: &GithubSettings) -> StoreResult<Self> {
        Self::new(
            &settings.api_url,
            &settings.owner,
            &settings.repo,
            settings.token.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// `{api_url}/repos/{owner}/{repo}/{segments...}`, each segment percent-encoded.
    fn repo_url<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> StoreResult<Url> {
        let mut url = self.api_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| StoreError::Malformed("API url cannot be a base".to_string()))?;
            path.pop_if_empty()
                .extend(["repos", self.owner.as_str(), self.repo.as_str()])
                .extend(segments);
        }
        Ok(url)
    }

    fn on_request(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        op: Operation,
        request: RequestBuilder,
    ) -> StoreResult<(StatusCode, T)> {
        let response = self.on_request(request).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|body| body.message)
                .unwrap_or(text);
            tracing::debug!(?op, %status, %message, "github request failed");
            return Err(classify(op, status, message));
        }

        let body = serde_json::from_str(&text)?;
        Ok((status, body))
    }

    async fn read_blob(&self, path: &str, sha: &ObjectId) -> StoreResult<Bytes> {
        let url = self.repo_url(["git", "blobs", sha.as_str()])?;
        let (_, body): (_, BlobBody) = self
            .execute(Operation::GetContent, self.http_client.get(url))
            .await?;
        if body.encoding != "base64" {
            return Err(StoreError::Malformed(format!(
                "blob of '{path}' has unsupported encoding '{}'",
                body.encoding
            )));
        }
        let bytes = decode_content(path, &body.content)?;
        tracing::debug!(path, blob = sha.short(), size = bytes.len(), "read large file via blob");
        Ok(bytes)
    }

    async fn read_ref(&self, branch: &str) -> StoreResult<ObjectId> {
        let url = self.repo_url(["git", "ref", "heads"].into_iter().chain(branch.split('/')))?;
        let (_, body): (_, RefBody) = self
            .execute(Operation::ResolveBranch, self.http_client.get(url))
            .await?;
        Ok(body.object.sha)
    }
}

#[async_trait]
impl ObjectStore for GithubStore {
    async fn resolve_branch(&self, branch: &str) -> StoreResult<BranchTip> {
        let commit = self.read_ref(branch).await?;
        let url = self.repo_url(["git", "commits", commit.as_str()])?;
        let (_, body): (_, CommitBody) = self
            .execute(Operation::ResolveBranch, self.http_client.get(url))
            .await?;
        tracing::debug!(branch, commit = commit.short(), "resolved branch tip");
        Ok(BranchTip {
            commit,
            tree: body.tree.sha,
        })
    }

    async fn create_blob(&self, bytes: &[u8]) -> StoreResult<ObjectId> {
        let url = self.repo_url(["git", "blobs"])?;
        let request = CreateBlobRequest {
            content: STANDARD.encode(bytes),
            encoding: "base64",
        };
        let (_, body): (_, ShaBody) = self
            .execute(
                Operation::CreateBlob,
                self.http_client.post(url).json(&request),
            )
            .await?;
        tracing::debug!(blob = body.sha.short(), size = bytes.len(), "created blob");
        Ok(body.sha)
    }

    async fn create_tree(
        &self,
        base_tree: &ObjectId,
        entries: &[TreeEntry],
    ) -> StoreResult<ObjectId> {
        let url = self.repo_url(["git", "trees"])?;
        let request = CreateTreeRequest {
            base_tree,
            tree: entries
                .iter()
                .map(|entry| TreeItemRequest {
                    path: entry.path.as_str(),
                    mode: entry.mode.as_str(),
                    kind: "blob",
                    sha: &entry.blob,
                })
                .collect(),
        };
        let (_, body): (_, ShaBody) = self
            .execute(
                Operation::CreateTree,
                self.http_client.post(url).json(&request),
            )
            .await?;
        tracing::debug!(tree = body.sha.short(), base = base_tree.short(), "created tree");
        Ok(body.sha)
    }

    async fn create_commit(
        &self,
        tree: &ObjectId,
        parents: &[ObjectId],
        message: &str,
    ) -> StoreResult<ObjectId> {
        let url = self.repo_url(["git", "commits"])?;
        let request = CreateCommitRequest {
            message,
            tree,
            parents,
        };
        let (_, body): (_, ShaBody) = self
            .execute(
                Operation::CreateCommit,
                self.http_client.post(url).json(&request),
            )
            .await?;
        tracing::debug!(commit = body.sha.short(), "created commit");
        Ok(body.sha)
    }

    async fn update_branch(
        &self,
        branch: &str,
        new_commit: &ObjectId,
        expected_previous: &ObjectId,
        force: bool,
    ) -> StoreResult<()> {
        if !force {
            let current = self.read_ref(branch).await?;
            if current != *expected_previous {
                return Err(StoreError::Conflict(format!(
                    "branch '{branch}' moved: expected {expected_previous}, found {current}"
                )));
            }
        }

        let url = self.repo_url(["git", "refs", "heads"].into_iter().chain(branch.split('/')))?;
        let request = UpdateRefRequest {
            sha: new_commit,
            force,
        };
        let _: (_, serde_json::Value) = self
            .execute(
                Operation::UpdateBranch,
                self.http_client.patch(url).json(&request),
            )
            .await?;
        tracing::debug!(branch, commit = new_commit.short(), "updated branch");
        Ok(())
    }

    async fn get_path_content(&self, branch: &str, path: &str) -> StoreResult<PathContent> {
        let segments = path_segments(path)?;
        let url = self.repo_url(std::iter::once("contents").chain(segments))?;
        let (_, body): (_, ContentsBody) = self
            .execute(
                Operation::GetContent,
                self.http_client.get(url).query(&[("ref", branch)]),
            )
            .await?;

        let file = match body {
            ContentsBody::File(file) if file.kind == "file" => file,
            ContentsBody::File(file) => {
                tracing::debug!(path, kind = %file.kind, "path is not a regular file");
                return Err(StoreError::NotAFile(path.to_string()));
            }
            ContentsBody::Listing(entries) => {
                tracing::debug!(path, entries = entries.len(), "path is a directory");
                return Err(StoreError::NotAFile(path.to_string()));
            }
        };

        let bytes = match (file.encoding.as_deref(), file.content) {
            (Some("base64"), Some(content)) => decode_content(path, &content)?,
            // Files over 1 MB come back with `encoding: none` and no inline content.
            _ => self.read_blob(path, &file.sha).await?,
        };

        Ok(PathContent {
            bytes,
            object_id: file.sha,
            html_url: file.html_url,
            download_url: file.download_url,
        })
    }

    async fn put_path_content(
        &self,
        branch: &str,
        path: &str,
        bytes: &[u8],
        message: &str,
        expected_object: Option<&ObjectId>,
    ) -> StoreResult<PutOutcome> {
        let segments = path_segments(path)?;
        let url = self.repo_url(std::iter::once("contents").chain(segments))?;
        let request = PutContentRequest {
            message,
            content: STANDARD.encode(bytes),
            branch,
            sha: expected_object,
        };
        let (status, body): (_, PutContentBody) = self
            .execute(
                Operation::PutContent,
                self.http_client.put(url).json(&request),
            )
            .await?;
        tracing::debug!(
            path,
            blob = body.content.sha.short(),
            commit = body.commit.sha.short(),
            %status,
            "put path content"
        );

        Ok(PutOutcome {
            object_id: body.content.sha,
            commit: Some(body.commit.sha),
            html_url: body.content.html_url,
            download_url: body.content.download_url,
            created: status == StatusCode::CREATED,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> GithubStore {
        GithubStore::new(
            "https://ghe.example.com/api/v3/",
            "octo",
            "transcripts",
            Some("ghp_secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_repo_url_encodes_segments() {
        let url = store()
            .repo_url(["contents", "notes", "a b.html"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/repos/octo/transcripts/contents/notes/a%20b.html"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let debug_str = format!("{:?}", store());
        assert!(!debug_str.contains("ghp_secret"));
        assert!(debug_str.contains("***"));
    }

    #[test]
    fn test_classify_status_codes() {
        let msg = || "boom".to_string();
        assert!(matches!(
            classify(Operation::ResolveBranch, StatusCode::NOT_FOUND, msg()),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            classify(Operation::CreateTree, StatusCode::UNPROCESSABLE_ENTITY, msg()),
            StoreError::InvalidBase(_)
        ));
        assert!(matches!(
            classify(Operation::UpdateBranch, StatusCode::UNPROCESSABLE_ENTITY, msg()),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            classify(Operation::PutContent, StatusCode::CONFLICT, msg()),
            StoreError::Conflict(_)
        ));
        assert!(matches!(
            classify(Operation::CreateBlob, StatusCode::UNPROCESSABLE_ENTITY, msg()),
            StoreError::Upstream { status: 422, .. }
        ));
    }

    #[test]
    fn test_rejects_non_base_url() {
        let err = GithubStore::new("mailto:x@y", "o", "r", None, Duration::from_secs(1));
        assert!(matches!(err, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn test_contents_body_variants() {
        let file: ContentsBody = serde_json::from_str(
            r#"{"type":"file","sha":"e69de29bb2d1d6434b8b29ae775ad8c2e48c5391","content":"aGk=\n","encoding":"base64","html_url":null,"download_url":null}"#,
        )
        .unwrap();
        assert!(matches!(file, ContentsBody::File(_)));

        let listing: ContentsBody = serde_json::from_str(r#"[{"type":"file"}]"#).unwrap();
        assert!(matches!(listing, ContentsBody::Listing(_)));
    }
}
