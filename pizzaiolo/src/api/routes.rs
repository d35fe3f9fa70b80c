//! HTTP route handlers for the pizzaiolo API

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use pizzaiolo_cache::EntrySummary;

use crate::pipeline::QaPipeline;

use super::auth::TOKEN_TTL_HOURS;
use super::middleware::AuthState;

/// Application state
pub struct AppState {
    pub pipeline: Arc<QaPipeline>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response
#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_hours: i64,
}

/// Pizza question request
#[derive(Deserialize)]
pub struct PizzaRequest {
    pub question: String,
    #[serde(default)]
    pub use_cloud_llm: bool,
}

/// Cache stats query parameters
#[derive(Deserialize)]
pub struct StatsQuery {
    pub window_hours: Option<i64>,
}

/// Cache entries listing response
#[derive(Serialize)]
pub struct EntriesResponse {
    pub entries: Vec<EntrySummary>,
    pub total: usize,
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Login endpoint (simple demo - in production, validate against a database)
pub async fn login(
    State(auth_state): State<AuthState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Any non-empty credentials are accepted; the token only gates the
    // admin routes.
    let token = auth_state
        .jwt_auth
        .generate_token(&payload.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        token,
        expires_in_hours: TOKEN_TTL_HOURS,
    }))
}

/// Answer a pizza question, cache first
pub async fn ask_pizza(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<PizzaRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let answer = app_state
        .pipeline
        .answer(&payload.question, payload.use_cloud_llm)
        .await
        .map_err(|err| {
            error!(%err, "failed to answer pizza question");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(answer))
}

/// Protected cache performance report
pub async fn cache_stats(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let window_hours = params.window_hours.unwrap_or(24);

    let report = app_state
        .pipeline
        .cache()
        .stats(window_hours)
        .await
        .map_err(|err| {
            error!(%err, "failed to build cache report");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(report))
}

/// Protected listing of cached entries, newest first
pub async fn cache_entries(
    State(app_state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let entries = app_state
        .pipeline
        .cache()
        .list_entries()
        .await
        .map_err(|err| {
            error!(%err, "failed to list cache entries");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let total = entries.len();

    Ok(Json(EntriesResponse { entries, total }))
}
