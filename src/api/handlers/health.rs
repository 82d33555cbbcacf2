use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uploads: usize,
    pub storage: String,
    pub version: String,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_status = match tokio::fs::metadata(&state.config.upload_dir).await {
        Ok(meta) if meta.is_dir() => "available",
        _ => "missing",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        uploads: state.uploads.registry().count(),
        storage: storage_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
