//! HTTP surface: GET-only JSON endpoints over [`ArtifactService`].

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use crate::internal::{
    config::Config,
    service::{ArtifactError, ArtifactReceipt, ArtifactService},
};

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host address to bind to (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateFileQuery {
    name: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptQuery {
    #[serde(rename = "channelID")]
    channel_id: Option<String>,
}

/// Every failure leaves as `{"error": <category>, "details": <message>}`.
fn error_response(status: StatusCode, category: &str, details: impl Into<String>) -> Response {
    let body = json!({
        "error": category,
        "details": details.into(),
    });
    (status, Json(body)).into_response()
}

impl IntoResponse for ArtifactError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error_response(status, self.category(), self.to_string())
    }
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ArtifactError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ArtifactError::InvalidInput(rejection.body_text()))
}

fn created_or_ok(receipt: ArtifactReceipt) -> Response {
    let status = StatusCode::from_u16(receipt.status()).unwrap_or(StatusCode::OK);
    (status, Json(receipt)).into_response()
}

async fn create_file(
    State(service): State<Arc<ArtifactService>>,
    query: Result<Query<CreateFileQuery>, QueryRejection>,
) -> Result<Response, ArtifactError> {
    let query = query_params(query)?;
    let span = tracing::info_span!(
        "create_file",
        request_id = %Uuid::new_v4(),
        path = query.name.as_deref().unwrap_or_default(),
    );
    async move {
        let receipt = service
            .store_content(query.name.as_deref(), query.content.as_deref())
            .await?;
        Ok(created_or_ok(receipt))
    }
    .instrument(span)
    .await
}

async fn transcript(
    State(service): State<Arc<ArtifactService>>,
    query: Result<Query<TranscriptQuery>, QueryRejection>,
) -> Result<Response, ArtifactError> {
    let query = query_params(query)?;
    let span = tracing::info_span!(
        "transcript",
        request_id = %Uuid::new_v4(),
        channel_id = query.channel_id.as_deref().unwrap_or_default(),
    );
    async move {
        let receipt = service
            .store_transcript(query.channel_id.as_deref())
            .await?;
        Ok(created_or_ok(receipt))
    }
    .instrument(span)
    .await
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn method_not_allowed() -> Response {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "Method not allowed. Use GET.",
    )
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "no such route")
}

pub fn router(service: Arc<ArtifactService>) -> Router {
    Router::new()
        .route(
            "/api/createFile",
            get(create_file).fallback(method_not_allowed),
        )
        .route(
            "/api/transcript",
            get(transcript).fallback(method_not_allowed),
        )
        .route("/healthz", get(healthz).fallback(method_not_allowed))
        .fallback(not_found)
        .with_state(service)
}

pub async fn execute(args: ServeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let service = Arc::new(super::build_service(&config, None, false)?.with_notifier(
        super::deploy_notifier(&config)?,
    ));

    match service.check_branch().await {
        Ok(tip) => tracing::info!(
            repo = %format!("{}/{}", config.github.owner, config.github.repo),
            branch = %config.github.branch,
            tip = tip.commit.short(),
            "repository reachable"
        ),
        Err(e) => tracing::warn!(
            branch = %config.github.branch,
            error = %e,
            "repository check failed; serving anyway"
        ),
    }

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "failed to bind to {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let addr = listener.local_addr()?;
    tracing::info!(strategy = %service.strategy(), "scribe server running at http://{addr}");

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    tracing::info!("server stopped");
    Ok(())
}
