//! In-process fake of the GitHub REST endpoints scribe uses, backed by a `MemoryStore`.
#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use scribe::internal::store::{
    FileMode, ObjectId, ObjectStore, StoreError, TreeEntry, github::GithubStore,
    memory::MemoryStore,
};
use serde::Deserialize;
use serde_json::{Value, json};

pub const TOKEN: &str = "test-token";
pub const OWNER: &str = "octo";
pub const REPO: &str = "notes";
/// Above this size the contents endpoint stops inlining file bytes.
pub const INLINE_CONTENT_LIMIT: usize = 1024 * 1024;

#[derive(Clone)]
struct FakeGithub {
    store: Arc<MemoryStore>,
    requests: Arc<AtomicUsize>,
}

pub struct FakeGithubHandle {
    pub api_url: String,
    pub requests: Arc<AtomicUsize>,
}

impl FakeGithubHandle {
    pub fn client(&self) -> GithubStore {
        self.client_with_token(Some(TOKEN))
    }

    pub fn client_with_token(&self, token: Option<&str>) -> GithubStore {
        GithubStore::new(
            &self.api_url,
            OWNER,
            REPO,
            token.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

/// Maps store errors to the statuses GitHub answers with for the same condition.
fn store_error(e: StoreError, conflict: StatusCode) -> Response {
    match e {
        StoreError::NotFound(m) => error(StatusCode::NOT_FOUND, m),
        StoreError::InvalidBase(m) | StoreError::InvalidObjectId(m) | StoreError::InvalidPath(m) => {
            error(StatusCode::UNPROCESSABLE_ENTITY, m)
        }
        StoreError::Conflict(m) => error(conflict, m),
        other => error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

fn parse_id(sha: &str) -> Result<ObjectId, Response> {
    ObjectId::new(sha).map_err(|_| error(StatusCode::NOT_FOUND, "Not Found"))
}

async fn check_headers(
    State(fake): State<FakeGithub>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    fake.requests.fetch_add(1, Ordering::SeqCst);
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let expected = format!("Bearer {TOKEN}");
    if header("authorization") != Some(expected.as_str()) {
        return error(StatusCode::UNAUTHORIZED, "Bad credentials");
    }
    if header("x-github-api-version").is_none() || header("user-agent").is_none() {
        return error(StatusCode::FORBIDDEN, "Missing required headers");
    }
    next.run(request).await
}

async fn get_ref(
    State(fake): State<FakeGithub>,
    Path((_, _, branch)): Path<(String, String, String)>,
) -> Response {
    match fake.store.resolve_branch(&branch).await {
        Ok(tip) => Json(json!({
            "ref": format!("refs/heads/{branch}"),
            "object": { "sha": tip.commit, "type": "commit" }
        }))
        .into_response(),
        Err(e) => store_error(e, StatusCode::CONFLICT),
    }
}

async fn get_commit(
    State(fake): State<FakeGithub>,
    Path((_, _, sha)): Path<(String, String, String)>,
) -> Response {
    let id = match parse_id(&sha) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match fake.store.commit(&id) {
        Some(record) => Json(json!({
            "sha": id,
            "tree": { "sha": record.tree },
            "parents": record.parents.iter().map(|p| json!({ "sha": p })).collect::<Vec<_>>(),
            "message": record.message,
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

#[derive(Deserialize)]
struct BlobBody {
    content: String,
    encoding: String,
}

/// GitHub wraps base64 content at 60 columns.
fn wrapped_base64(bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    encoded
        .as_bytes()
        .chunks(60)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn get_blob(
    State(fake): State<FakeGithub>,
    Path((_, _, sha)): Path<(String, String, String)>,
) -> Response {
    let id = match parse_id(&sha) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match fake.store.blob(&id) {
        Some(bytes) => Json(json!({
            "sha": id,
            "size": bytes.len(),
            "encoding": "base64",
            "content": wrapped_base64(&bytes),
        }))
        .into_response(),
        None => error(StatusCode::NOT_FOUND, "Not Found"),
    }
}

async fn create_blob(State(fake): State<FakeGithub>, Json(body): Json<BlobBody>) -> Response {
    let bytes = match body.encoding.as_str() {
        "base64" => match STANDARD.decode(&body.content) {
            Ok(bytes) => bytes,
            Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        },
        _ => body.content.into_bytes(),
    };
    match fake.store.create_blob(&bytes).await {
        Ok(sha) => (StatusCode::CREATED, Json(json!({ "sha": sha }))).into_response(),
        Err(e) => store_error(e, StatusCode::CONFLICT),
    }
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    mode: String,
    sha: String,
}

#[derive(Deserialize)]
struct TreeBody {
    base_tree: String,
    tree: Vec<TreeItem>,
}

async fn create_tree(State(fake): State<FakeGithub>, Json(body): Json<TreeBody>) -> Response {
    let base = match ObjectId::new(body.base_tree) {
        Ok(id) => id,
        Err(e) => return store_error(e, StatusCode::CONFLICT),
    };
    let mut entries = Vec::new();
    for item in body.tree {
        let blob = match ObjectId::new(item.sha) {
            Ok(id) => id,
            Err(e) => return store_error(e, StatusCode::CONFLICT),
        };
        let mode = if item.mode == "100755" {
            FileMode::Executable
        } else {
            FileMode::Regular
        };
        entries.push(TreeEntry {
            path: item.path,
            blob,
            mode,
        });
    }
    match fake.store.create_tree(&base, &entries).await {
        Ok(sha) => (StatusCode::CREATED, Json(json!({ "sha": sha }))).into_response(),
        Err(e) => store_error(e, StatusCode::CONFLICT),
    }
}

#[derive(Deserialize)]
struct CommitBody {
    message: String,
    tree: ObjectId,
    parents: Vec<ObjectId>,
}

async fn create_commit(State(fake): State<FakeGithub>, Json(body): Json<CommitBody>) -> Response {
    match fake
        .store
        .create_commit(&body.tree, &body.parents, &body.message)
        .await
    {
        Ok(sha) => (StatusCode::CREATED, Json(json!({ "sha": sha }))).into_response(),
        Err(e) => store_error(e, StatusCode::UNPROCESSABLE_ENTITY),
    }
}

#[derive(Deserialize)]
struct UpdateRefBody {
    sha: ObjectId,
    #[serde(default)]
    force: bool,
}

async fn update_ref(
    State(fake): State<FakeGithub>,
    Path((_, _, branch)): Path<(String, String, String)>,
    Json(body): Json<UpdateRefBody>,
) -> Response {
    let result = if body.force {
        match fake.store.branch_tip(&branch) {
            Some(current) => {
                fake.store
                    .update_branch(&branch, &body.sha, &current, true)
                    .await
            }
            None => Err(StoreError::NotFound("Reference does not exist".to_string())),
        }
    } else {
        fake.store.fast_forward(&branch, &body.sha)
    };
    match result {
        Ok(()) => Json(json!({
            "ref": format!("refs/heads/{branch}"),
            "object": { "sha": body.sha, "type": "commit" }
        }))
        .into_response(),
        Err(e) => store_error(e, StatusCode::UNPROCESSABLE_ENTITY),
    }
}

#[derive(Deserialize)]
struct RefQuery {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
}

fn html_url(branch: &str, path: &str) -> String {
    format!("https://github.com/{OWNER}/{REPO}/blob/{branch}/{path}")
}

fn download_url(branch: &str, path: &str) -> String {
    format!("https://raw.githubusercontent.com/{OWNER}/{REPO}/{branch}/{path}")
}

async fn get_contents(
    State(fake): State<FakeGithub>,
    Path((_, _, path)): Path<(String, String, String)>,
    Query(query): Query<RefQuery>,
) -> Response {
    let branch = query.git_ref.unwrap_or_else(|| "main".to_string());
    match fake.store.get_path_content(&branch, &path).await {
        Ok(content) => {
            let (encoding, inline) = if content.bytes.len() > INLINE_CONTENT_LIMIT {
                ("none", String::new())
            } else {
                ("base64", wrapped_base64(&content.bytes))
            };
            Json(json!({
                "type": "file",
                "path": path,
                "sha": content.object_id,
                "size": content.bytes.len(),
                "encoding": encoding,
                "content": inline,
                "html_url": html_url(&branch, &path),
                "download_url": download_url(&branch, &path),
            }))
            .into_response()
        }
        Err(StoreError::NotAFile(_)) => Json(json!([])).into_response(),
        Err(e) => store_error(e, StatusCode::CONFLICT),
    }
}

#[derive(Deserialize)]
struct PutContentsBody {
    message: String,
    content: String,
    branch: Option<String>,
    sha: Option<ObjectId>,
}

async fn put_contents(
    State(fake): State<FakeGithub>,
    Path((_, _, path)): Path<(String, String, String)>,
    Json(body): Json<PutContentsBody>,
) -> Response {
    let branch = body.branch.unwrap_or_else(|| "main".to_string());
    let bytes = match STANDARD.decode(&body.content) {
        Ok(bytes) => bytes,
        Err(e) => return error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    };
    match fake
        .store
        .put_path_content(&branch, &path, &bytes, &body.message, body.sha.as_ref())
        .await
    {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let body: Value = json!({
                "content": {
                    "path": path,
                    "sha": outcome.object_id,
                    "html_url": html_url(&branch, &path),
                    "download_url": download_url(&branch, &path),
                },
                "commit": { "sha": outcome.commit },
            });
            (status, Json(body)).into_response()
        }
        Err(e) => store_error(e, StatusCode::CONFLICT),
    }
}

/// Serves the fake on an ephemeral port.
pub async fn spawn_fake_github(store: Arc<MemoryStore>) -> FakeGithubHandle {
    let requests = Arc::new(AtomicUsize::new(0));
    let state = FakeGithub {
        store,
        requests: requests.clone(),
    };
    let app = Router::new()
        .route("/repos/{owner}/{repo}/git/ref/heads/{*branch}", get(get_ref))
        .route("/repos/{owner}/{repo}/git/refs/heads/{*branch}", patch(update_ref))
        .route("/repos/{owner}/{repo}/git/commits/{sha}", get(get_commit))
        .route("/repos/{owner}/{repo}/git/commits", post(create_commit))
        .route("/repos/{owner}/{repo}/git/blobs", post(create_blob))
        .route("/repos/{owner}/{repo}/git/blobs/{sha}", get(get_blob))
        .route("/repos/{owner}/{repo}/git/trees", post(create_tree))
        .route(
            "/repos/{owner}/{repo}/contents/{*path}",
            get(get_contents).put(put_contents),
        )
        .layer(middleware::from_fn_with_state(state.clone(), check_headers))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    FakeGithubHandle {
        api_url: format!("http://{addr}"),
        requests,
    }
}
