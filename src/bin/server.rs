//! Runbox API server
//!
//! Thin HTTP surface over a sandbox session: run code, fetch the
//! synthesized document, and exchange handoff values with other surfaces.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::info;

use runbox::config::load_config;
use runbox::handoff::HandoffStore;
use runbox::sandbox::{create_engines, LogRecord, QueuedInput};
use runbox::session::SandboxSession;

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<SandboxSession>>,
    handoff: HandoffStore,
}

#[derive(Deserialize)]
struct RunBody {
    code: String,
}

#[derive(Serialize)]
struct RunResponse {
    success: bool,
    code_type: String,
    records: Vec<LogRecord>,
}

#[derive(Deserialize)]
struct HandoffBody {
    value: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runbox=info".parse().expect("valid directive")),
        )
        .init();

    let config = load_config()?;
    let listen = config.server.listen;

    // Interactive input is impossible over a one-shot HTTP run; a run that
    // calls input() fails with an error record instead of hanging.
    let engines = create_engines(&config.host, Arc::new(QueuedInput::new(Vec::<String>::new())))?;
    let handoff = HandoffStore::new(config.handoff.ttl);
    let session = SandboxSession::new(config, engines, handoff.clone())?;

    let state = AppState {
        session: Arc::new(Mutex::new(session)),
        handoff,
    };

    let app = Router::new()
        .route("/api/run", post(run_code))
        .route("/api/document", get(current_document))
        .route("/api/handoff/{key}", get(take_handoff).post(put_handoff))
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!("runbox-server listening on {}", listen);
    let listener = tokio::net::TcpListener::bind(listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_code(
    State(state): State<AppState>,
    Json(body): Json<RunBody>,
) -> Result<Json<RunResponse>, (StatusCode, String)> {
    let mut session = state.session.lock().await;

    if session.is_pending() {
        return Err((
            StatusCode::CONFLICT,
            "execution already in progress".to_string(),
        ));
    }

    session.set_source(body.code);
    let code_type = session.classification().code_type.to_string();

    let success = session
        .run_to_completion()
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(RunResponse {
        success,
        code_type,
        records: session.log().to_vec(),
    }))
}

async fn current_document(
    State(state): State<AppState>,
) -> Result<axum::response::Html<String>, StatusCode> {
    let session = state.session.lock().await;
    session
        .document()
        .map(axum::response::Html)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn take_handoff(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<String, StatusCode> {
    state
        .handoff
        .take(&key)
        .await
        .ok_or(StatusCode::NOT_FOUND)
}

async fn put_handoff(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<HandoffBody>,
) -> StatusCode {
    state.handoff.put(&key, body.value).await;
    StatusCode::NO_CONTENT
}
