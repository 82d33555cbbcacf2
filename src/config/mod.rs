use std::env;
use std::path::PathBuf;
use url::Url;

use crate::utils::validation::ALLOWED_EXTENSIONS;

/// Runtime configuration for the share service
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory uploaded files are written to (default: "uploads")
    pub upload_dir: PathBuf,

    /// Lower-case extensions accepted by the upload form
    pub allowed_extensions: Vec<String>,

    /// Base URL embedded in generated QR codes (default: "http://192.168.1.11:5000")
    pub public_base_url: Url,

    /// Address the HTTP listener binds to (default: "0.0.0.0")
    pub bind_addr: String,

    /// Port the HTTP listener binds to (default: 5000)
    pub port: u16,

    /// Maximum file size in bytes (default: 512 MB)
    pub max_file_size: usize,

    /// Pixels per QR module (default: 10)
    pub qr_box_size: u32,

    /// Render the 4-module quiet zone around the QR code (default: true)
    pub qr_border: bool,
}

const DEFAULT_PUBLIC_BASE_URL: &str = "http://192.168.1.11:5000";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            public_base_url: parse_base_url(DEFAULT_PUBLIC_BASE_URL)
                .expect("default public base url is valid"),
            bind_addr: "0.0.0.0".to_string(),
            port: 5000,
            max_file_size: 512 * 1024 * 1024, // 512 MB
            qr_box_size: 10,
            qr_border: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_dir: env::var("UPLOAD_DIR")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| parse_extensions(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.allowed_extensions),

            public_base_url: env::var("PUBLIC_BASE_URL")
                .ok()
                .and_then(|v| {
                    let parsed = parse_base_url(&v);
                    if parsed.is_none() {
                        tracing::warn!("Ignoring invalid PUBLIC_BASE_URL: {}", v);
                    }
                    parsed
                })
                .unwrap_or(default.public_base_url),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            qr_box_size: env::var("QR_BOX_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(default.qr_box_size),

            qr_border: env::var("QR_BORDER")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.qr_border),
        }
    }
}

/// Parses a comma separated extension list, normalizing case and leading dots
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Accepts only absolute http(s) URLs. A trailing slash is ensured so that
/// relative joins keep any path prefix.
pub fn parse_base_url(raw: &str) -> Option<Url> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}
