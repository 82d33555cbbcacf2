//! HTML pages embedded at compile time.
//!
//! Placeholders are `{{name}}`; every interpolated value goes through
//! [`escape_html`].

use axum::http::StatusCode;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

const INDEX_HTML: &str = include_str!("templates/index.html");
const PASSWORD_HTML: &str = include_str!("templates/password.html");
const ERROR_HTML: &str = include_str!("templates/error.html");

/// Characters escaped when a filename becomes a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_messages(messages: &[String]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let items: String = messages
        .iter()
        .map(|m| format!("<li>{}</li>", escape_html(m)))
        .collect();
    format!("<ul class=\"flash\">{}</ul>", items)
}

/// Upload form
pub fn index_page(messages: &[String], allowed_extensions: &[String]) -> String {
    let accept = allowed_extensions
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    INDEX_HTML
        .replace("{{messages}}", &render_messages(messages))
        .replace("{{accept}}", &escape_html(&accept))
}

/// Password form for a single upload
pub fn password_page(file_id: &str, messages: &[String]) -> String {
    let action = format!("/password/{}", utf8_percent_encode(file_id, PATH_SEGMENT));

    PASSWORD_HTML
        .replace("{{messages}}", &render_messages(messages))
        .replace("{{action}}", &escape_html(&action))
        .replace("{{file_id}}", &escape_html(file_id))
}

pub fn error_page(status: StatusCode, message: &str) -> String {
    ERROR_HTML
        .replace("{{status}}", &escape_html(&status.to_string()))
        .replace("{{message}}", &escape_html(message))
}
