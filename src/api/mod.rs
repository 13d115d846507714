//! Public HTTP API.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::health::{self, HealthReport};
use crate::proxy;
use crate::session::{PermissionGrant, Session, SessionBroker};
use crate::slurm::{Job, JobCatalog, JobNode, NodeRecord, NodeRegistry, SchedulerClient};
use crate::submit::{SubmitJobRequest, SubmitPipeline};
use crate::worker::ResourceSnapshot;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub catalog: Arc<JobCatalog>,
    pub registry: Arc<NodeRegistry>,
    pub pipeline: Arc<SubmitPipeline>,
    pub broker: Arc<SessionBroker>,
    pub scheduler: Arc<dyn SchedulerClient>,
    pub http: reqwest::Client,
}

#[derive(Serialize)]
struct JobsResponse {
    jobs: Vec<Job>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    job_id: String,
    state: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobResponse {
    job_id: String,
    message: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NextJobIdResponse {
    next_job_id: u64,
}

#[derive(Serialize)]
struct NodesResponse {
    nodes: Vec<NodeRecord>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobIpResponse {
    job_id: String,
    nodes: Vec<JobNode>,
}

#[derive(Serialize)]
struct SessionResponse {
    message: String,
    session: Session,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CancelJobRequest {
    job_id: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StartSessionRequest {
    principal: Option<String>,
    worker_ip: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct StopSessionRequest {
    principal: Option<String>,
    session_id: Option<Uuid>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/jobs/download/{node_ip}/{filename}", get(download_result))
        .route("/submit-job", post(submit_job))
        .route("/cancel-job", post(cancel_job))
        .route("/job-ip/{job_id}", get(job_ip))
        .route("/next-job-id", get(next_job_id))
        .route("/nodes", get(list_nodes))
        .route("/connect", get(self_check))
        .route("/worker-connect/{worker_ip}", get(worker_check))
        .route(
            "/notebook/check-permission/{principal}",
            get(notebook_permission),
        )
        .route("/notebook/start", post(notebook_start))
        .route("/notebook/stop", post(notebook_stop))
        .route("/notebook/sessions", get(all_sessions))
        .route("/notebook/sessions/{principal}", get(notebook_sessions))
        .route("/notebook/resources/{worker_ip}", get(notebook_resources))
        .route(
            "/notebook/proxy/{worker_ip}/{port}/",
            any(notebook_proxy_root),
        )
        .route(
            "/notebook/proxy/{worker_ip}/{port}/{*path}",
            any(notebook_proxy),
        )
        .layer(cors)
        .with_state(state)
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<JobsResponse>> {
    let jobs = state.catalog.list().await?;
    Ok(Json(JobsResponse { jobs }))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let state_value = state.catalog.job_state(&job_id).await?;
    Ok(Json(JobStatusResponse {
        job_id,
        state: state_value.to_string(),
    }))
}

async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> Result<Json<SubmitJobResponse>> {
    let job_name = request.job_name.clone().unwrap_or_default();
    let job_id = state.pipeline.submit(request).await?;
    Ok(Json(SubmitJobResponse {
        job_id,
        message: format!("Job '{job_name}' submitted successfully!"),
    }))
}

async fn cancel_job(
    State(state): State<AppState>,
    Json(request): Json<CancelJobRequest>,
) -> Result<Json<MessageResponse>> {
    let job_id = request
        .job_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation("missing required field: jobId".to_string()))?;
    state.scheduler.cancel(&job_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Job '{job_id}' cancelled successfully!"),
    }))
}

async fn job_ip(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobIpResponse>> {
    let nodes = state.catalog.job_nodes(&job_id).await?;
    Ok(Json(JobIpResponse { job_id, nodes }))
}

async fn next_job_id(State(state): State<AppState>) -> Result<Json<NextJobIdResponse>> {
    let next_job_id = state.catalog.next_job_id().await?;
    Ok(Json(NextJobIdResponse { next_job_id }))
}

async fn list_nodes(State(state): State<AppState>) -> Result<Json<NodesResponse>> {
    let nodes = state.registry.list().await?;
    Ok(Json(NodesResponse { nodes }))
}

async fn self_check() -> Json<HealthReport> {
    Json(health::self_report().await)
}

async fn worker_check(
    State(state): State<AppState>,
    Path(worker_ip): Path<String>,
) -> Result<Json<HealthReport>> {
    let report = state.broker.worker_health(&worker_ip).await?;
    Ok(Json(report))
}

async fn notebook_permission(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Json<PermissionGrant> {
    Json(state.broker.check_permission(&principal).await)
}

async fn notebook_start(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<SessionResponse>> {
    let principal = request
        .principal
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation("missing required field: principal".to_string()))?;
    let worker_ip = request
        .worker_ip
        .filter(|w| !w.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation("missing required field: workerIp".to_string()))?;

    let session = state.broker.start(&principal, &worker_ip).await?;
    Ok(Json(SessionResponse {
        message: "Notebook started".to_string(),
        session,
    }))
}

async fn notebook_stop(
    State(state): State<AppState>,
    Json(request): Json<StopSessionRequest>,
) -> Result<Json<MessageResponse>> {
    let principal = request
        .principal
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| GatewayError::Validation("missing required field: principal".to_string()))?;
    let session_id = request
        .session_id
        .ok_or_else(|| GatewayError::Validation("missing required field: sessionId".to_string()))?;

    state.broker.stop(&principal, session_id).await?;
    Ok(Json(MessageResponse {
        message: "Notebook stopped".to_string(),
    }))
}

async fn notebook_sessions(
    State(state): State<AppState>,
    Path(principal): Path<String>,
) -> Json<Vec<Session>> {
    Json(state.broker.sessions_for(&principal).await)
}

async fn all_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.broker.all_sessions().await)
}

async fn notebook_resources(
    State(state): State<AppState>,
    Path(worker_ip): Path<String>,
) -> Result<Json<ResourceSnapshot>> {
    let snapshot = state.broker.resources(&worker_ip).await?;
    Ok(Json(snapshot))
}

async fn notebook_proxy(
    State(state): State<AppState>,
    Path((worker_ip, port, path)): Path<(String, u16, String)>,
    req: Request,
) -> Result<Response> {
    relay_to_worker(&state, &worker_ip, port, &path, req).await
}

async fn notebook_proxy_root(
    State(state): State<AppState>,
    Path((worker_ip, port)): Path<(String, u16)>,
    req: Request,
) -> Result<Response> {
    relay_to_worker(&state, &worker_ip, port, "", req).await
}

async fn relay_to_worker(
    state: &AppState,
    worker_ip: &str,
    port: u16,
    path: &str,
    req: Request,
) -> Result<Response> {
    let query = req.uri().query().map(str::to_owned);
    let target = proxy::build_target_url(worker_ip, port, path, query.as_deref());
    let host = format!("{worker_ip}:{port}");
    proxy::relay(&state.http, req, &target, &host).await
}

async fn download_result(
    State(state): State<AppState>,
    Path((node_ip, filename)): Path<(String, String)>,
    req: Request,
) -> Result<Response> {
    if filename.contains('/') || filename.contains("..") {
        return Err(GatewayError::Validation("invalid filename".to_string()));
    }
    let target = format!(
        "http://{node_ip}:{}/download/{filename}",
        state.config.download_port
    );
    let host = format!("{node_ip}:{}", state.config.download_port);
    proxy::relay(&state.http, req, &target, &host).await
}
