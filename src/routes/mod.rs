//! API routes

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Profile, ProfileStore};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %e, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileSetRequest {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ProfileSetResponse {
    pub status: &'static str,
    pub profile: Option<Profile>,
}

#[derive(Debug, Serialize)]
pub struct DashboardSummary {
    pub chat_messages_total: i64,
    pub memories_total: i64,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Json<ChatResponse> {
    let message = state.chat_engine.chat(&request.message).await;
    Json(ChatResponse { message })
}

async fn profile(State(state): State<AppState>) -> ApiResult<Option<Profile>> {
    let profile = state.store.read().await.map_err(internal)?;
    Ok(Json(profile))
}

async fn set_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileSetRequest>,
) -> ApiResult<ProfileSetResponse> {
    let outcome = state.store.update(&request.fields).await.map_err(internal)?;
    if !outcome.is_success() {
        return Err((StatusCode::BAD_REQUEST, outcome.message));
    }

    let profile = state.store.read().await.map_err(internal)?;
    Ok(Json(ProfileSetResponse {
        status: "ok",
        profile,
    }))
}

async fn dashboard_summary(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    Ok(Json(DashboardSummary {
        chat_messages_total: state.store.count_turns().await.map_err(internal)?,
        memories_total: state.store.count_memories().await.map_err(internal)?,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/profile", get(profile))
        .route("/profile/set", post(set_profile))
        .route("/dashboard/summary", get(dashboard_summary))
}
