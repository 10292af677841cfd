use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{error::AppError, models::Turn, routes::cors_layer, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat/ask", post(ask))
        .route("/chat/transcript", get(transcript))
        .layer(cors_layer())
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    question: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    turns: Vec<Turn>,
    thinking: bool,
}

fn snapshot(state: &AppState) -> TranscriptResponse {
    TranscriptResponse {
        turns: state.conversation.transcript(),
        thinking: state.conversation.is_thinking(),
    }
}

#[axum::debug_handler]
async fn ask(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(AppError::InvalidInput(
            "Question must not be empty".to_string(),
        ));
    }

    let start = std::time::Instant::now();
    tracing::info!("Handling question ({} chars)", question.len());

    // A rejected ask (no table, or one already in flight) leaves the
    // transcript untouched; the caller just gets the current snapshot back.
    state.conversation.ask(question).await;

    tracing::info!("Question handled in {:?}", start.elapsed());
    Ok(Json(snapshot(&state)))
}

#[axum::debug_handler]
async fn transcript(State(state): State<Arc<AppState>>) -> Json<TranscriptResponse> {
    Json(snapshot(&state))
}
