use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

pub async fn security_headers(req: Request, next: Next) -> Response {
    // Reject TRACE (proxy disclosure)
    if req.method() == Method::TRACE {
        return (StatusCode::METHOD_NOT_ALLOWED, Body::empty()).into_response();
    }

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Pages carry inline styles and images only from this origin
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'none'; style-src 'unsafe-inline'; img-src 'self' data:; form-action 'self'; frame-ancestors 'none'",
        ),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::SERVER, HeaderValue::from_static("qr-drop"));

    response
}
