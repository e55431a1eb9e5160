//! Server-side validation of uploaded files.
//!
//! Any client-side check (extension filters, live previews) is advisory
//! only; the validator here is the sole source of truth. Validation is a
//! pure check against the declared MIME type and size, it never inspects
//! or mutates the payload.

use thiserror::Error;

/// MIME types accepted for upload.
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/bmp",
];

/// Maximum accepted upload size: 16 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// A single uploaded file, alive for the duration of one pipeline run.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    /// Raw file contents.
    pub bytes: Vec<u8>,
    /// MIME type declared by the client. Untrusted.
    pub mime: String,
    /// Filename declared by the client. Untrusted, used for reporting only.
    pub filename: String,
    /// Size declared by the transport layer (e.g. Content-Length).
    pub declared_len: u64,
}

impl UploadCandidate {
    /// Build a candidate from raw bytes, deriving the declared size from the
    /// buffer itself.
    pub fn from_bytes(bytes: Vec<u8>, mime: impl Into<String>, filename: impl Into<String>) -> Self {
        let declared_len = bytes.len() as u64;
        Self {
            bytes,
            mime: mime.into(),
            filename: filename.into(),
            declared_len,
        }
    }
}

/// Reasons an upload can be rejected before any processing occurs.
///
/// Each variant maps to a distinct user-facing message, so callers never
/// need to parse error strings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("unsupported file type '{mime}'; accepted types are PNG, JPEG, GIF, and BMP")]
    UnsupportedType { mime: String },
    #[error("file is too large ({size} bytes); the limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    #[error("uploaded file is empty")]
    Empty,
}

/// Check an upload against the MIME allow-list and the default size ceiling.
///
/// The check is pure; a rejected candidate is left untouched so the caller
/// can report on it.
pub fn validate(candidate: &UploadCandidate) -> Result<(), ValidationError> {
    validate_with_limit(candidate, MAX_UPLOAD_BYTES)
}

/// Check an upload against the MIME allow-list and an explicit size
/// ceiling, typically sourced from `UploadSettings.max_bytes`.
pub fn validate_with_limit(
    candidate: &UploadCandidate,
    limit: u64,
) -> Result<(), ValidationError> {
    if candidate.bytes.is_empty() {
        return Err(ValidationError::Empty);
    }

    let mime = candidate.mime.trim().to_ascii_lowercase();
    if !ALLOWED_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ValidationError::UnsupportedType { mime });
    }

    let size = candidate.declared_len.max(candidate.bytes.len() as u64);
    if size > limit {
        return Err(ValidationError::TooLarge { size, limit });
    }

    Ok(())
}

/// Infer a declared MIME type from a filename extension.
///
/// Used by filesystem front-ends that stand in for a browser form; the
/// result still goes through [`validate`].
pub fn mime_for_extension(filename: &str) -> Option<&'static str> {
    let ext = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(mime: &str, len: usize) -> UploadCandidate {
        UploadCandidate::from_bytes(vec![0u8; len], mime, "photo.png")
    }

    #[test]
    fn accepts_every_allowed_mime_type() {
        for mime in ALLOWED_MIME_TYPES {
            assert_eq!(validate(&candidate(mime, 128)), Ok(()), "rejected {mime}");
        }
    }

    #[test]
    fn mime_comparison_is_case_insensitive() {
        assert_eq!(validate(&candidate("IMAGE/PNG", 128)), Ok(()));
    }

    #[test]
    fn rejects_unsupported_type_with_reason() {
        let err = validate(&candidate("application/pdf", 128)).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                mime: "application/pdf".into()
            }
        );
    }

    #[test]
    fn rejects_payload_over_the_ceiling() {
        let mut upload = candidate("image/png", 16);
        upload.declared_len = MAX_UPLOAD_BYTES + 1;
        let err = validate(&upload).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { .. }));
    }

    #[test]
    fn accepts_payload_exactly_at_the_ceiling() {
        let mut upload = candidate("image/png", 16);
        upload.declared_len = MAX_UPLOAD_BYTES;
        assert_eq!(validate(&upload), Ok(()));
    }

    #[test]
    fn configured_limit_replaces_the_default_ceiling() {
        let upload = candidate("image/png", 16);
        let err = validate_with_limit(&upload, 8).unwrap_err();
        assert_eq!(err, ValidationError::TooLarge { size: 16, limit: 8 });
        assert_eq!(validate_with_limit(&upload, 16), Ok(()));
    }

    #[test]
    fn rejects_empty_uploads() {
        let err = validate(&candidate("image/png", 0)).unwrap_err();
        assert_eq!(err, ValidationError::Empty);
    }

    #[test]
    fn extension_mapping_covers_aliases() {
        assert_eq!(mime_for_extension("crowd.JPG"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("crowd.jpeg"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("crowd.png"), Some("image/png"));
        assert_eq!(mime_for_extension("crowd.exe"), None);
        assert_eq!(mime_for_extension("no_extension"), None);
    }
}
