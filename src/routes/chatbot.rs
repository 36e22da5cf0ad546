use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::Result;
use crate::routes::ValidJson;
use crate::services::recommendations::{self, ChatMessage};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/chatbot", post(chat))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000, message = "must be 1-2000 characters"))]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

async fn chat(State(state): State<AppState>, ValidJson(req): ValidJson<ChatRequest>) -> Result<Json<ChatResponse>> {
    let reply = recommendations::chat(&state, req.message.trim(), &req.history).await?;
    Ok(Json(ChatResponse { reply }))
}
