//! HTTP server module
//!
//! Serves the control API with request tracing and permissive CORS.

use crate::api::{create_api_router, ApiState};
use crate::automation::SharedSequencer;
use crate::config::SharedConfig;
use crate::transcript::SharedTranscript;
use crate::workspace::SharedWorkspace;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Server state
#[derive(Clone)]
pub struct ServerState {
    pub config: SharedConfig,
    pub workspace: SharedWorkspace,
    pub sequencer: SharedSequencer,
    pub transcript: SharedTranscript,
}

impl ServerState {
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

/// Create the main server router
pub fn create_server_router(state: Arc<ServerState>) -> Router {
    let api_state = Arc::new(ApiState::new(
        state.config.clone(),
        state.workspace.clone(),
        state.sequencer.clone(),
        state.transcript.clone(),
    ));

    Router::new()
        .merge(create_api_router(api_state))
        .route("/", get(index_handler))
        .fallback(not_found)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn index_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        "api-automate control server - use /api/* endpoints",
    )
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Start the HTTP server
pub async fn start_server(
    config: SharedConfig,
    workspace: SharedWorkspace,
    sequencer: SharedSequencer,
    transcript: SharedTranscript,
) -> anyhow::Result<()> {
    let server_config = config.get().server;
    let addr = format!("{}:{}", server_config.host, server_config.port);

    let state = Arc::new(ServerState::new(config, workspace, sequencer, transcript));
    let app = create_server_router(state);

    tracing::info!(addr = %addr, "Starting control server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
