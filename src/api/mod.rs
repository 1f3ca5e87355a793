//! Control API module
//!
//! JSON endpoints over the workspace: collection import and export, template
//! editing, the automation queue and the transcript.

use crate::automation::{QueueEntry, RunState, RunSummary, SharedSequencer};
use crate::collection::{CategoryNode, CollectionDocument, ImportReport, LoginRequest};
use crate::config::{AppConfig, AutomationConfig, SharedConfig};
use crate::error::AppError;
use crate::executor::Exchange;
use crate::session::preview;
use crate::templates::{DynamicTemplate, OverrideField};
use crate::transcript::{SharedTranscript, TranscriptEntry, TranscriptSummary};
use crate::workspace::SharedWorkspace;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub config: SharedConfig,
    pub workspace: SharedWorkspace,
    pub sequencer: SharedSequencer,
    pub transcript: SharedTranscript,
}

impl ApiState {
    pub fn new(
        config: SharedConfig,
        workspace: SharedWorkspace,
        sequencer: SharedSequencer,
        transcript: SharedTranscript,
    ) -> Self {
        Self {
            config,
            workspace,
            sequencer,
            transcript,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Validation { .. } | AppError::QueuePosition(_) | AppError::CollectionParse(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::UnknownMethod(_) => StatusCode::NOT_FOUND,
            AppError::NoCollection
            | AppError::AutomationRunning
            | AppError::EmptyQueue
            | AppError::AlreadyQueued(_) => StatusCode::CONFLICT,
            AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, AppError>;

/// Create the control API router
pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Configuration
        .route("/api/config", get(get_config))
        .route(
            "/api/config/automation",
            get(get_automation_config).put(update_automation_config),
        )
        // Collection
        .route("/api/collection", post(import_collection).delete(remove_collection))
        .route("/api/collection/categories", get(get_categories))
        .route("/api/collection/tree", get(get_tree))
        .route("/api/collection/logins", get(get_logins))
        .route("/api/collection/export", get(export_collection))
        // Templates
        .route("/api/templates/resolve", post(resolve_template))
        .route("/api/templates/save", post(save_override))
        .route("/api/send", post(send_request))
        .route("/api/session", get(get_session))
        // Automation queue
        .route("/api/queue", get(get_queue))
        .route("/api/queue/add", post(queue_add))
        .route("/api/queue/add-all", post(queue_add_all))
        .route("/api/queue/remove", post(queue_remove))
        .route("/api/queue/move", post(queue_move))
        // Automation run
        .route("/api/automation/run", post(run_automation))
        .route("/api/automation/stop", post(stop_automation))
        .route("/api/automation/status", get(get_automation_status))
        // Transcript
        .route("/api/transcript", get(get_transcript))
        .route("/api/transcript/summary", get(get_transcript_summary))
        .route("/api/transcript/text", get(get_transcript_text))
        .route("/api/transcript/clear", post(clear_transcript))
        // Health check
        .route("/api/health", get(health_check))
        .with_state(state)
}

/// Get current configuration
async fn get_config(State(state): State<Arc<ApiState>>) -> Json<AppConfig> {
    Json(state.config.get())
}

async fn get_automation_config(State(state): State<Arc<ApiState>>) -> Json<AutomationConfig> {
    Json(state.config.get().automation)
}

/// Partial update of the automation pacing; applies from the next run
#[derive(Debug, Deserialize)]
pub struct UpdateAutomationRequest {
    pub start_delay_ms: Option<u64>,
    pub step_delay_ms: Option<u64>,
    pub error_delay_ms: Option<u64>,
}

async fn update_automation_config(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<UpdateAutomationRequest>,
) -> impl IntoResponse {
    let mut current = state.config.get().automation;

    if let Some(start) = req.start_delay_ms {
        current.start_delay_ms = start;
    }
    if let Some(step) = req.step_delay_ms {
        current.step_delay_ms = step;
    }
    if let Some(error) = req.error_delay_ms {
        current.error_delay_ms = error;
    }

    state.config.update_automation(current);
    (StatusCode::OK, "Automation configuration updated")
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub document: CollectionDocument,
    /// Top-level categories to import; all when absent
    #[serde(default)]
    pub categories: Option<Vec<String>>,
}

async fn import_collection(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<ImportReport> {
    if state.sequencer.is_running() {
        return Err(AppError::AutomationRunning);
    }
    let report = state
        .workspace
        .write()
        .import_document(req.document, req.categories.as_deref());
    Ok(Json(report))
}

async fn remove_collection(State(state): State<Arc<ApiState>>) -> Result<StatusCode, AppError> {
    if state.sequencer.is_running() {
        return Err(AppError::AutomationRunning);
    }
    state.workspace.write().remove_collection()?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_categories(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<String>> {
    Ok(Json(state.workspace.read().categories()?))
}

async fn get_tree(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<CategoryNode>> {
    Ok(Json(state.workspace.read().category_tree()?))
}

async fn get_logins(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<LoginRequest>> {
    Ok(Json(state.workspace.read().login_requests()?))
}

async fn export_collection(State(state): State<Arc<ApiState>>) -> ApiResult<CollectionDocument> {
    Ok(Json(state.workspace.read().export_collection()?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub key: String,
    /// Cache the result as the template automation will use
    #[serde(default)]
    pub materialize: bool,
}

async fn resolve_template(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<DynamicTemplate> {
    let mut ws = state.workspace.write();
    let key = ws.key(&req.key)?;
    let template = if req.materialize {
        ws.materialize(&key)?
    } else {
        ws.resolve(&key)?
    };
    Ok(Json(template))
}

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    pub key: String,
    pub field: OverrideField,
    pub value: String,
}

async fn save_override(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SaveRequest>,
) -> ApiResult<DynamicTemplate> {
    let mut ws = state.workspace.write();
    let key = ws.key(&req.key)?;
    Ok(Json(ws.save_override(req.field, &key, &req.value)?))
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub key: String,
}

async fn send_request(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<KeyRequest>,
) -> ApiResult<Exchange> {
    let key = state.workspace.read().key(&req.key)?;
    Ok(Json(state.sequencer.send(&key).await?))
}

/// Token previews; full tokens are never returned
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub bearer_token: Option<String>,
    pub xsrf_token: Option<String>,
}

async fn get_session(State(state): State<Arc<ApiState>>) -> Json<SessionResponse> {
    let ws = state.workspace.read();
    let session = ws.session();
    Json(SessionResponse {
        bearer_token: session.bearer_token.as_deref().map(preview),
        xsrf_token: session.xsrf_token.as_deref().map(preview),
    })
}

async fn get_queue(State(state): State<Arc<ApiState>>) -> Json<Vec<QueueEntry>> {
    Json(state.workspace.read().queue().entries().to_vec())
}

async fn queue_add(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<KeyRequest>,
) -> ApiResult<Vec<QueueEntry>> {
    let mut ws = state.workspace.write();
    let key = ws.key(&req.key)?;
    ws.enqueue(&key)?;
    Ok(Json(ws.queue().entries().to_vec()))
}

async fn queue_add_all(State(state): State<Arc<ApiState>>) -> ApiResult<Vec<QueueEntry>> {
    let mut ws = state.workspace.write();
    ws.enqueue_all()?;
    Ok(Json(ws.queue().entries().to_vec()))
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub index: usize,
}

async fn queue_remove(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<IndexRequest>,
) -> ApiResult<Vec<QueueEntry>> {
    let mut ws = state.workspace.write();
    ws.dequeue(req.index)?;
    Ok(Json(ws.queue().entries().to_vec()))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub index: usize,
    pub direction: Direction,
}

async fn queue_move(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<Vec<QueueEntry>> {
    let mut ws = state.workspace.write();
    let queue = ws.queue_mut();
    match req.direction {
        Direction::Up => queue.move_up(req.index)?,
        Direction::Down => queue.move_down(req.index)?,
    };
    Ok(Json(ws.queue().entries().to_vec()))
}

/// Start a run in the background and return immediately
async fn run_automation(State(state): State<Arc<ApiState>>) -> Result<Response, AppError> {
    if state.sequencer.is_running() {
        return Err(AppError::AutomationRunning);
    }
    {
        let ws = state.workspace.read();
        if !ws.has_collection() {
            return Err(AppError::NoCollection);
        }
        if ws.queue().is_empty() {
            return Err(AppError::EmptyQueue);
        }
    }

    let sequencer = state.sequencer.clone();
    tokio::spawn(async move {
        if let Err(e) = sequencer.run().await {
            tracing::error!(error = %e, "Automation failed to start");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "message": "Automation started"
        })),
    )
        .into_response())
}

async fn stop_automation(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    if state.sequencer.stop() {
        (StatusCode::OK, "Automation stopping")
    } else {
        (StatusCode::OK, "No automation running")
    }
}

#[derive(Debug, Serialize)]
pub struct AutomationStatusResponse {
    pub state: RunState,
    pub queue: Vec<QueueEntry>,
    pub last_run: Option<RunSummary>,
}

async fn get_automation_status(State(state): State<Arc<ApiState>>) -> Json<AutomationStatusResponse> {
    let queue = state.workspace.read().queue().entries().to_vec();
    Json(AutomationStatusResponse {
        state: state.sequencer.state(),
        queue,
        last_run: state.sequencer.last_summary(),
    })
}

#[derive(Debug, Deserialize, Default)]
pub struct TranscriptQuery {
    /// Only the last `limit` entries
    pub limit: Option<usize>,
}

async fn get_transcript(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TranscriptQuery>,
) -> Json<Vec<TranscriptEntry>> {
    Json(match query.limit {
        Some(limit) => state.transcript.recent(limit),
        None => state.transcript.entries(),
    })
}

async fn get_transcript_summary(State(state): State<Arc<ApiState>>) -> Json<TranscriptSummary> {
    Json(state.transcript.summary())
}

/// Plain-text transcript, as exported to a file
async fn get_transcript_text(State(state): State<Arc<ApiState>>) -> String {
    state.transcript.render()
}

async fn clear_transcript(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.transcript.clear();
    (StatusCode::OK, "Transcript cleared")
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
