//! Multipart parsing and uploaded-file validation.
//!
//! # Responsibilities
//! - Split a buffered multipart body into text fields and file parts
//! - Check each file: size ceiling, MIME allowlist, filename signature,
//!   and leading bytes consistent with the declared type
//!
//! # Design Decisions
//! - Only runs when the request carries file parts
//! - Files are never stored here; only the first bytes are kept for sniffing
//! - Filename failures report `INVALID_FILE_TYPE` like MIME failures, so the
//!   client learns nothing about which check tripped

use axum::{body::Bytes, http::StatusCode};
use futures_util::stream;
use serde_json::{Map, Value};
use std::convert::Infallible;

use crate::config::LimitsConfig;
use crate::http::response::{ErrorCode, Rejection};

const HEAD_LEN: usize = 16;

/// Extensions refused anywhere in a filename (`invoice.php.jpg` included).
const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "bat", "cmd", "com", "scr", "msi", "sh", "bash", "ps1", "vbs", "js", "mjs",
    "jar", "php", "phtml", "php5", "asp", "aspx", "jsp", "cgi", "pl", "py", "rb", "html", "htm",
    "svg", "hta",
];

/// One file part of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    pub head: Bytes,
}

/// Text fields and file parts of a multipart body.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: Map<String, Value>,
    pub files: Vec<UploadedFile>,
}

pub fn invalid_multipart() -> Rejection {
    Rejection::new(
        StatusCode::BAD_REQUEST,
        ErrorCode::InvalidMultipart,
        "Malformed multipart body",
    )
}

fn invalid_file_type() -> Rejection {
    Rejection::new(
        StatusCode::BAD_REQUEST,
        ErrorCode::InvalidFileType,
        "File type is not allowed",
    )
}

/// Parse a buffered multipart body.
pub async fn parse_multipart(content_type: &str, body: Bytes) -> Result<MultipartForm, Rejection> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| invalid_multipart())?;
    let source = stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(source, boundary);
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::debug!(error = %e, "Multipart parse failed");
        invalid_multipart()
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                let content_type = field
                    .content_type()
                    .map(|m| m.essence_str().to_ascii_lowercase())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let data = field.bytes().await.map_err(|_| invalid_multipart())?;
                form.files.push(UploadedFile {
                    field: name,
                    filename,
                    content_type,
                    size: data.len(),
                    head: data.slice(..data.len().min(HEAD_LEN)),
                });
            }
            None => {
                let text = field.text().await.map_err(|_| invalid_multipart())?;
                form.fields.insert(name, Value::String(text));
            }
        }
    }
    Ok(form)
}

/// Validate every file against the limits.
pub fn validate_files(files: &[UploadedFile], limits: &LimitsConfig) -> Result<(), Rejection> {
    for file in files {
        validate_file(file, limits)?;
    }
    Ok(())
}

pub fn validate_file(file: &UploadedFile, limits: &LimitsConfig) -> Result<(), Rejection> {
    if file.size > limits.max_file_bytes {
        return Err(Rejection::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::FileTooLarge,
            format!("File exceeds the {} byte limit", limits.max_file_bytes),
        ));
    }

    let allowed = limits
        .allowed_mime_types
        .iter()
        .any(|m| m.eq_ignore_ascii_case(&file.content_type));
    if !allowed
        || !filename_is_safe(&file.filename, &file.content_type)
        || !content_matches(&file.content_type, &file.head)
    {
        return Err(invalid_file_type());
    }
    Ok(())
}

fn extensions_for(mime: &str) -> &'static [&'static str] {
    match mime {
        "image/jpeg" => &["jpg", "jpeg"],
        "image/png" => &["png"],
        "image/webp" => &["webp"],
        "image/gif" => &["gif"],
        "application/pdf" => &["pdf"],
        _ => &[],
    }
}

pub fn filename_is_safe(filename: &str, mime: &str) -> bool {
    if filename.is_empty()
        || filename.len() > 255
        || filename.starts_with('.')
        || filename.contains("..")
        || filename.contains(['/', '\\', '\0'])
        || filename.chars().any(char::is_control)
    {
        return false;
    }

    let lower = filename.to_ascii_lowercase();
    let mut parts = lower.split('.');
    parts.next();
    let extensions: Vec<&str> = parts.collect();
    if extensions
        .iter()
        .any(|ext| BLOCKED_EXTENSIONS.contains(ext))
    {
        return false;
    }

    let expected = extensions_for(mime);
    if expected.is_empty() {
        // No known extension mapping; the MIME allowlist has already decided
        return true;
    }
    extensions.last().is_some_and(|ext| expected.contains(ext))
}

pub fn content_matches(mime: &str, head: &[u8]) -> bool {
    match mime {
        "image/jpeg" => head.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/png" => head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        "image/gif" => head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a"),
        "image/webp" => head.len() >= 12 && &head[..4] == b"RIFF" && &head[8..12] == b"WEBP",
        "application/pdf" => head.starts_with(b"%PDF-"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    fn file(filename: &str, content_type: &str, head: &[u8], size: usize) -> UploadedFile {
        UploadedFile {
            field: "image".into(),
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            head: Bytes::copy_from_slice(head),
        }
    }

    #[test]
    fn test_valid_png_passes() {
        let limits = LimitsConfig::default();
        assert!(validate_file(&file("stove.png", "image/png", PNG, 2048), &limits).is_ok());
    }

    #[test]
    fn test_oversized_file() {
        let limits = LimitsConfig::default();
        let err = validate_file(&file("stove.png", "image/png", PNG, limits.max_file_bytes + 1), &limits)
            .unwrap_err();
        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.code, ErrorCode::FileTooLarge);
    }

    #[test]
    fn test_mime_not_allowed() {
        let limits = LimitsConfig::default();
        let err = validate_file(&file("x.html", "text/html", b"<html>", 6), &limits).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFileType);
    }

    #[test]
    fn test_filename_signatures() {
        assert!(filename_is_safe("photo.JPG", "image/jpeg"));
        assert!(filename_is_safe("manual-v2.pdf", "application/pdf"));
        assert!(!filename_is_safe("../../etc/passwd.png", "image/png"));
        assert!(!filename_is_safe(".htaccess.png", "image/png"));
        assert!(!filename_is_safe("shell.php.png", "image/png"));
        assert!(!filename_is_safe("a\0.png", "image/png"));
        assert!(!filename_is_safe("photo.png", "image/jpeg"));
        assert!(!filename_is_safe("noextension", "image/png"));
    }

    #[test]
    fn test_magic_bytes_must_match() {
        let limits = LimitsConfig::default();
        let spoofed = file("stove.png", "image/png", b"<?php system();", 15);
        assert_eq!(validate_file(&spoofed, &limits).unwrap_err().code, ErrorCode::InvalidFileType);
        assert!(content_matches("application/pdf", b"%PDF-1.7"));
        assert!(content_matches("image/webp", b"RIFF\x10\x00\x00\x00WEBPVP8 "));
    }

    #[tokio::test]
    async fn test_parse_multipart_splits_fields_and_files() {
        let body = "--XBOUND\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            Wood stove\r\n\
            --XBOUND\r\n\
            Content-Disposition: form-data; name=\"manual\"; filename=\"manual.pdf\"\r\n\
            Content-Type: application/pdf\r\n\r\n\
            %PDF-1.4 test\r\n\
            --XBOUND--\r\n";
        let form = parse_multipart("multipart/form-data; boundary=XBOUND", Bytes::from(body))
            .await
            .unwrap();
        assert_eq!(form.fields["title"], "Wood stove");
        assert_eq!(form.files.len(), 1);
        assert_eq!(form.files[0].filename, "manual.pdf");
        assert_eq!(form.files[0].content_type, "application/pdf");
        assert_eq!(form.files[0].size, 13);
        assert!(content_matches("application/pdf", &form.files[0].head));
    }

    #[tokio::test]
    async fn test_parse_multipart_without_boundary() {
        let err = parse_multipart("multipart/form-data", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidMultipart);
    }
}
