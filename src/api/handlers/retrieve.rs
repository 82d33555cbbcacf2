use crate::AppState;
use crate::api::error::AppError;
use crate::api::templates;
use crate::services::upload_service::Retrieval;
use axum::{
    Form,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

const WRONG_PASSWORD: &str = "Incorrect password. Try again.";

#[derive(Debug, Deserialize)]
pub struct PasswordForm {
    #[serde(default)]
    pub password: String,
}

/// Renders the password form for a stored upload
pub async fn password_form(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Html<String>, AppError> {
    if !state.uploads.is_known(&file_id) {
        return Err(not_found(&file_id));
    }
    Ok(Html(templates::password_page(&file_id, &[])))
}

/// Streams the file back when the submitted password matches
pub async fn submit_password(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Form(form): Form<PasswordForm>,
) -> Result<Response, AppError> {
    match state.uploads.retrieve(&file_id, &form.password).await? {
        Retrieval::Granted { record, file } => {
            tracing::info!("📤 Releasing {} ({} bytes)", record.filename, file.size);

            let stream = ReaderStream::new(file.file);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, record.content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        content_disposition(&record.filename),
                    ),
                    (header::CONTENT_LENGTH, file.size.to_string()),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                Body::from_stream(stream),
            )
                .into_response())
        }
        Retrieval::Denied => {
            tracing::warn!("🔒 Wrong password for {}", file_id);
            Ok((
                StatusCode::UNAUTHORIZED,
                Html(templates::password_page(
                    &file_id,
                    &[WRONG_PASSWORD.to_string()],
                )),
            )
                .into_response())
        }
        Retrieval::NotFound => Err(not_found(&file_id)),
    }
}

fn not_found(file_id: &str) -> AppError {
    tracing::info!("Lookup for unknown upload {:?}", file_id);
    AppError::NotFound(format!("No upload named {}", file_id))
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 name
pub fn content_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file".to_string()
    } else {
        ascii_filename
    };
    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}
