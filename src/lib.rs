pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::registry::UploadRegistry;
use crate::services::storage::StorageService;
use crate::services::upload_service::UploadService;
use axum::{Router, extract::DefaultBodyLimit, middleware::from_fn, routing::get};
use std::sync::Arc;

/// Multipart framing and the password field on top of the file itself
const MULTIPART_OVERHEAD: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub uploads: Arc<UploadService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageService>, config: AppConfig) -> Self {
        let registry = Arc::new(UploadRegistry::new());
        let uploads = Arc::new(UploadService::new(storage, registry, config.clone()));
        Self { uploads, config }
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route(
            "/",
            get(api::handlers::upload::upload_form).post(api::handlers::upload::upload_file),
        )
        .route(
            "/password/:file_id",
            get(api::handlers::retrieve::password_form)
                .post(api::handlers::retrieve::submit_password),
        )
        .route("/health", get(api::handlers::health::health_check))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
