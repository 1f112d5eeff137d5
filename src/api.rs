//! HTTP surface for the document pipeline.
//!
//! - `POST /v1/jobs` – Multipart upload (`file` field, optional `route_hint` query parameter).
//!   Stores the file, queues a job, starts processing in the background, and returns `{job_id}`.
//! - `GET /v1/jobs/{job_id}` – Status snapshot. Unknown ids report `status: "failed"`.
//! - `GET /v1/jobs/{job_id}/result` – Result summary, or a placeholder while the job runs.
//! - `GET /v1/search?q=&limit=` – Similarity search over indexed chunks.
//! - `GET /v1/graphrag?keyword=&limit=&fallback=` – Keyword graph lookup plus generated answer.
//! - `GET /metrics` – Pipeline counters.
//! - `GET /health` – Liveness check.

use crate::processing::{
    GraphRagAnswer, JobResultView, JobStatusView, PipelineError, ProcessingApi, QueryError,
    SearchResponse, StoreError,
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router exposing the pipeline API.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: ProcessingApi + 'static,
{
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics::<S>))
        .route("/v1/jobs", post(create_job::<S>))
        .route("/v1/jobs/:job_id", get(get_job::<S>))
        .route("/v1/jobs/:job_id/result", get(get_job_result::<S>))
        .route("/v1/search", get(search::<S>))
        .route("/v1/graphrag", get(graphrag::<S>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(service)
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: ProcessingApi,
{
    Json(service.metrics_snapshot())
}

#[derive(Deserialize)]
struct CreateJobParams {
    /// Optional strategy hint (`structured|ocr|vision`, or `docling|vlm`).
    #[serde(default)]
    route_hint: Option<String>,
}

#[derive(Serialize)]
struct CreateJobResponse {
    job_id: String,
}

/// Accept an upload and queue it for processing.
async fn create_job<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<CreateJobParams>,
    mut multipart: Multipart,
) -> Result<Json<CreateJobResponse>, AppError>
where
    S: ProcessingApi,
{
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| AppError::BadRequest(error.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|error| AppError::BadRequest(error.to_string()))?;

        let job_id = service
            .submit_job(filename, bytes.to_vec(), params.route_hint)
            .await?;
        tracing::info!(job_id = %job_id, "Upload accepted");
        return Ok(Json(CreateJobResponse { job_id }));
    }

    Err(AppError::BadRequest("multipart field `file` is required".into()))
}

async fn get_job<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, AppError>
where
    S: ProcessingApi,
{
    Ok(Json(service.job_status(&job_id).await?))
}

async fn get_job_result<S>(
    State(service): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobResultView>, AppError>
where
    S: ProcessingApi,
{
    Ok(Json(service.job_result(&job_id).await?))
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError>
where
    S: ProcessingApi,
{
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("query parameter `q` is required".into()))?;
    Ok(Json(service.search(&query, params.limit).await?))
}

#[derive(Deserialize)]
struct GraphRagParams {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    fallback: Option<usize>,
}

async fn graphrag<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<GraphRagParams>,
) -> Result<Json<GraphRagAnswer>, AppError>
where
    S: ProcessingApi,
{
    let keyword = params
        .keyword
        .filter(|keyword| !keyword.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("query parameter `keyword` is required".into()))?;
    let answer = service
        .graphrag(&keyword, params.limit, params.fallback)
        .await?;
    tracing::info!(keyword = %answer.keyword, used_fallback = answer.used_fallback, hits = answer.hits.len(), "GraphRAG answered");
    Ok(Json(answer))
}

enum AppError {
    BadRequest(String),
    Pipeline(PipelineError),
    Store(StoreError),
    Query(QueryError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Query(QueryError::InvalidRequest(message)) => (StatusCode::BAD_REQUEST, message),
            Self::Query(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::Pipeline(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
            Self::Store(error) => (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(inner: PipelineError) -> Self {
        Self::Pipeline(inner)
    }
}

impl From<StoreError> for AppError {
    fn from(inner: StoreError) -> Self {
        Self::Store(inner)
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self::Query(inner)
    }
}
