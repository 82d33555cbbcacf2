use crate::AppState;
use crate::api::error::AppError;
use crate::api::{flash, templates};
use crate::services::storage::StagedFile;
use crate::services::upload_service::{UploadError, UploadOutcome, UploadRejection};
use axum::{
    body::Body,
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

/// Name of the attachment the QR code is served as
const QR_DOWNLOAD_NAME: &str = "qrcode.png";

/// Renders the upload form along with any pending flash messages
pub async fn upload_form(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, messages) = flash::take(jar);
    (
        jar,
        Html(templates::index_page(
            &messages,
            &state.config.allowed_extensions,
        )),
    )
}

/// Accepts `file` + `password`, stores the file and answers with a QR code
/// PNG. Input problems redirect back to the form with a flash message.
pub async fn upload_file(
    State(state): State<AppState>,
    jar: CookieJar,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut staged: Option<(StagedFile, String)> = None;
    let mut password: Option<String> = None;

    let result: Result<UploadOutcome, UploadError> = async {
        let mut saw_file_part = false;

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" if !saw_file_part => {
                    saw_file_part = true;
                    let original = field.file_name().unwrap_or_default().to_string();
                    let filename = state.uploads.check_filename(&original)?;

                    let reader = StreamReader::new(field.map_err(std::io::Error::other));
                    let file = state.uploads.stage(Box::new(reader)).await?;
                    staged = Some((file, filename));
                }
                "password" => {
                    let text = field.text().await.map_err(multipart_error)?;
                    password = Some(text);
                }
                _ => {}
            }
        }

        let (file, filename) = staged.take().ok_or(UploadRejection::NoFilePart)?;
        let password = password.take().unwrap_or_default();
        state.uploads.finish(file, &filename, &password).await
    }
    .await;

    // Anything still staged belongs to a failed request.
    if let Some((file, _)) = staged.take() {
        state.uploads.discard(file).await;
    }

    match result {
        Ok(outcome) => {
            tracing::info!("🔗 QR code issued for {}", outcome.url);
            Ok(qr_response(outcome))
        }
        Err(UploadError::Rejected(reason)) => {
            tracing::info!("Upload rejected: {}", reason);
            // Consume the remaining multipart stream so the client sees the redirect
            // instead of a reset connection.
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Ok((flash::push(jar, reason.to_string()), Redirect::to("/")).into_response())
        }
        Err(UploadError::Internal(e)) => Err(AppError::Anyhow(e)),
    }
}

fn multipart_error(e: MultipartError) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadRejection::TooLarge.into()
    } else {
        UploadError::Internal(anyhow::anyhow!("Malformed multipart body: {}", e))
    }
}

fn qr_response(outcome: UploadOutcome) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", QR_DOWNLOAD_NAME);

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::IMAGE_PNG.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        Body::from(outcome.qr_png),
    )
        .into_response()
}
