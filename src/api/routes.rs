//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::{Agent, AgentError};
use crate::config::Config;

use super::types::*;

/// Shared application state.
pub struct AppState {
    pub agent: Agent,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = Agent::from_config(&config)?;
    let state = Arc::new(AppState { agent });

    let app = routes(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the router without binding, so tests can drive it directly.
pub fn routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/ask", post(ask))
        .route("/ask", post(chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Chat widget endpoint: answer text only, errors included as text.
async fn chat(State(state): State<Arc<AppState>>, Json(req): Json<AskRequest>) -> Json<ChatReply> {
    Json(ChatReply {
        response: state.agent.ask(&req.query).await,
    })
}

async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<AskResponse>) {
    match state.agent.run(&req.query).await {
        Ok(outcome) => {
            let timestamp = chrono::Utc::now().to_rfc3339();
            (
                StatusCode::OK,
                Json(AskResponse {
                    log: TaskLogEntry::from_turns(outcome.transcript.turns(), &timestamp),
                    answer: outcome.answer,
                    status: AskStatus::Completed,
                    stop_reason: Some(outcome.stop_reason),
                    iterations: outcome.iterations,
                }),
            )
        }
        Err(e) => {
            tracing::error!("ask failed: {}", e);
            let code = match e {
                AgentError::EmptyQuery => StatusCode::BAD_REQUEST,
                AgentError::Llm(_) => StatusCode::BAD_GATEWAY,
            };
            (
                code,
                Json(AskResponse {
                    answer: format!("Execution error: {}", e),
                    status: AskStatus::Failed,
                    stop_reason: None,
                    iterations: 0,
                    log: vec![],
                }),
            )
        }
    }
}
