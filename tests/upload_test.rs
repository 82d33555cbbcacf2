use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use qr_drop::config::{AppConfig, parse_base_url};
use qr_drop::services::qr::QrRenderer;
use qr_drop::services::storage::LocalStorageService;
use qr_drop::{AppState, create_app};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

fn setup() -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        upload_dir: dir.path().to_path_buf(),
        public_base_url: parse_base_url("http://192.168.1.11:5000").unwrap(),
        ..AppConfig::default()
    };
    let storage = Arc::new(LocalStorageService::new(dir.path()));
    (dir, create_app(AppState::new(storage, config)))
}

fn multipart_body(file: Option<(&str, &[u8])>, password: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(password) = password {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"password\"\r\n\r\n{password}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn password_request(file_id: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/password/{}", file_id))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("password={}", password)))
        .unwrap()
}

#[tokio::test]
async fn test_upload_returns_qr_for_retrieval_url() {
    let (dir, app) = setup();
    let content = b"\x89PNG\r\n\x1a\nnot really a picture";

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body(
            Some(("holiday photo.png", &content[..])),
            Some("open-sesame"),
        )))
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    if status != StatusCode::OK {
        panic!(
            "Upload failed with status {}: {:?}",
            status,
            String::from_utf8_lossy(&body)
        );
    }

    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"qrcode.png\""
    );

    // The PNG is exactly the QR rendering of the retrieval URL
    let expected = QrRenderer::default()
        .render_png("http://192.168.1.11:5000/password/holiday_photo.png")
        .unwrap();
    assert_eq!(body.as_ref(), expected.as_slice());
    assert!(image::load_from_memory(&body).is_ok());

    // Stored under the sanitized name
    let stored = std::fs::read(dir.path().join("holiday_photo.png")).unwrap();
    assert_eq!(stored, content);
}

#[tokio::test]
async fn test_accented_filename_keeps_base_letters() {
    let (dir, app) = setup();
    let content = b"%PDF-1.4 menu du jour";

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body(
            Some(("caf\u{e9}.pdf", &content[..])),
            Some("croissant"),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let expected = QrRenderer::default()
        .render_png("http://192.168.1.11:5000/password/cafe.pdf")
        .unwrap();
    assert_eq!(body.as_ref(), expected.as_slice());
    assert_eq!(std::fs::read(dir.path().join("cafe.pdf")).unwrap(), content);

    let response = app
        .clone()
        .oneshot(password_request("cafe.pdf", "croissant"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_correct_password_returns_original_bytes() {
    let (_dir, app) = setup();
    let content: Vec<u8> = (0..=255u8).cycle().take(70_000).collect();

    let response = app
        .clone()
        .oneshot(upload_request(multipart_body(
            Some(("clip.mp4", content.as_slice())),
            Some("hunter2"),
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(password_request("clip.mp4", "hunter2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"clip.mp4\""));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), content.as_slice());
}

#[tokio::test]
async fn test_wrong_password_rerenders_form() {
    let (_dir, app) = setup();
    let content = b"%PDF-1.7 secret minutes";

    app.clone()
        .oneshot(upload_request(multipart_body(
            Some(("minutes.pdf", &content[..])),
            Some("right"),
        )))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(password_request("minutes.pdf", "wrong"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(
        response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("Incorrect password. Try again."));
    assert!(html.contains("name=\"password\""));
    assert!(!html.contains("secret minutes"));
}

#[tokio::test]
async fn test_same_name_last_write_wins() {
    let (dir, app) = setup();

    for (content, password) in [(&b"first version"[..], "one"), (&b"second version"[..], "two")] {
        let response = app
            .clone()
            .oneshot(upload_request(multipart_body(
                Some(("notes.pdf", content)),
                Some(password),
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(
        std::fs::read(dir.path().join("notes.pdf")).unwrap(),
        b"second version"
    );

    let response = app
        .clone()
        .oneshot(password_request("notes.pdf", "one"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(password_request("notes.pdf", "two"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(body.as_ref(), b"second version");
}

#[tokio::test]
async fn test_concurrent_uploads_keep_file_and_password_paired() {
    let (_dir, app) = setup();

    let mut handles = Vec::new();
    for i in 0..8 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let content = format!("payload number {}", i).into_bytes();
            let password = format!("pw{}", i);
            app.oneshot(upload_request(multipart_body(
                Some(("race.gif", content.as_slice())),
                Some(&password),
            )))
            .await
            .unwrap()
            .status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    let mut granted = 0;
    for i in 0..8 {
        let response = app
            .clone()
            .oneshot(password_request("race.gif", &format!("pw{}", i)))
            .await
            .unwrap();
        if response.status() == StatusCode::OK {
            granted += 1;
            let body = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(body.as_ref(), format!("payload number {}", i).as_bytes());
        }
    }
    assert_eq!(granted, 1);
}

#[tokio::test]
async fn test_unknown_file_id_is_not_found() {
    let (_dir, app) = setup();

    let response = app
        .clone()
        .oneshot(password_request("ghost.png", "anything"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/password/ghost.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Still serving afterwards
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_password_form_renders_for_known_upload() {
    let (_dir, app) = setup();

    app.clone()
        .oneshot(upload_request(multipart_body(
            Some(("song.mp3", &b"ID3 tagged"[..])),
            Some("la"),
        )))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/password/song.mp3")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8_lossy(&body);
    assert!(html.contains("Download song.mp3"));
    assert!(html.contains("action=\"/password/song.mp3\""));
}

#[tokio::test]
async fn test_health_reports_upload_count() {
    let (_dir, app) = setup();

    app.clone()
        .oneshot(upload_request(multipart_body(
            Some(("a.jpg", &b"\xff\xd8\xff"[..])),
            Some("pw"),
        )))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["uploads"], 1);
    assert_eq!(json["storage"], "available");
}
