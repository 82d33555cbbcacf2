use anyhow::{Result, anyhow};
use mime::Mime;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

/// Extensions accepted by the upload form unless overridden by configuration
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "pdf", "mp4", "mp3"];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Returns the lower-cased text after the last '.', if any
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
}

/// True when the filename has an extension and it is in `allowed`
pub fn allowed_file<S: AsRef<str>>(filename: &str, allowed: &[S]) -> bool {
    match extension_of(filename) {
        Some(ext) => allowed.iter().any(|a| a.as_ref().eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

/// Reduces a client supplied filename to a flat, ASCII-only name that is
/// safe to join onto the upload directory.
///
/// Accented letters are decomposed (NFKD) so they keep their base letter;
/// anything else outside ASCII is dropped. The result may be empty (e.g. for
/// names made only of CJK characters); callers must reject that case.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .nfkd()
        .filter(|c| c.is_ascii())
        .map(|c| if c == '/' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Sanitizes and checks the extension in one step
pub fn validate_upload_name<S: AsRef<str>>(filename: &str, allowed: &[S]) -> Result<String> {
    if filename.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "EMPTY_FILENAME",
            message: "No file selected".to_string(),
        }));
    }

    if !allowed_file(filename, allowed) {
        return Err(anyhow!(ValidationError {
            code: "EXTENSION_NOT_ALLOWED",
            message: "File type not allowed".to_string(),
        }));
    }

    let sanitized = secure_filename(filename);
    if sanitized.is_empty() || !allowed_file(&sanitized, allowed) {
        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            tracing::warn!("Path traversal attempt detected: {}", filename);
        }
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Invalid filename".to_string(),
        }));
    }

    Ok(sanitized)
}

/// Content type served for a stored file, derived from its extension
pub fn content_type_for(filename: &str) -> Mime {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "pdf" => mime::APPLICATION_PDF,
        "mp4" => "video/mp4".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "mp3" => "audio/mpeg".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("photo.png", ALLOWED_EXTENSIONS));
        assert!(allowed_file("PHOTO.JPG", ALLOWED_EXTENSIONS));
        assert!(allowed_file("archive.tar.mp3", ALLOWED_EXTENSIONS));
        assert!(!allowed_file("virus.exe", ALLOWED_EXTENSIONS));
        assert!(!allowed_file("png", ALLOWED_EXTENSIONS));
        assert!(!allowed_file("trailing.", ALLOWED_EXTENSIONS));
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("My cool movie.mp4"), "My_cool_movie.mp4");
        assert_eq!(secure_filename("../../../etc/passwd"), "etc_passwd");
        assert_eq!(secure_filename("..\\..\\windows\\report.pdf"), "windowsreport.pdf");
        assert_eq!(secure_filename("i contain cool \u{fc}ml\u{e4}uts.gif"), "i_contain_cool_umlauts.gif");
        assert_eq!(secure_filename("test<script>.pdf"), "testscript.pdf");
        assert_eq!(secure_filename(".hidden.png"), "hidden.png");
        assert_eq!(secure_filename("__init__.png"), "init__.png");
        assert_eq!(secure_filename("日本語"), "");
    }

    #[test]
    fn test_secure_filename_transliterates_accents() {
        assert_eq!(secure_filename("caf\u{e9}.pdf"), "cafe.pdf");
        assert_eq!(secure_filename("\u{f1}.png"), "n.png");
        // Already decomposed input ends up the same
        assert_eq!(secure_filename("cafe\u{301}.pdf"), "cafe.pdf");
        assert_eq!(secure_filename("\u{ff21}\u{ff22}.gif"), "AB.gif");
    }

    #[test]
    fn test_secure_filename_keeps_device_names() {
        assert_eq!(secure_filename("CON.png"), "CON.png");
        assert_eq!(secure_filename("lpt1.pdf"), "lpt1.pdf");
    }

    #[test]
    fn test_validate_upload_name() {
        assert_eq!(
            validate_upload_name("holiday photo.JPG", ALLOWED_EXTENSIONS).unwrap(),
            "holiday_photo.JPG"
        );
        assert!(validate_upload_name("", ALLOWED_EXTENSIONS).is_err());
        assert!(validate_upload_name("setup.exe", ALLOWED_EXTENSIONS).is_err());
        assert!(validate_upload_name("日本語.png", ALLOWED_EXTENSIONS).is_err());
        assert_eq!(
            validate_upload_name("r\u{e9}sum\u{e9}.pdf", ALLOWED_EXTENSIONS).unwrap(),
            "resume.pdf"
        );

        let err = validate_upload_name("setup.exe", ALLOWED_EXTENSIONS).unwrap_err();
        let validation = err.downcast_ref::<ValidationError>().unwrap();
        assert_eq!(validation.code, "EXTENSION_NOT_ALLOWED");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("a.png"), mime::IMAGE_PNG);
        assert_eq!(content_type_for("a.JPEG"), mime::IMAGE_JPEG);
        assert_eq!(content_type_for("a.pdf"), mime::APPLICATION_PDF);
        assert_eq!(content_type_for("a.mp4").essence_str(), "video/mp4");
        assert_eq!(content_type_for("a.mp3").essence_str(), "audio/mpeg");
        assert_eq!(content_type_for("noext"), mime::APPLICATION_OCTET_STREAM);
    }
}
