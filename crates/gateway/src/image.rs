//! Upload validation for plant images.
//!
//! Validation happens before any provider call: a size ceiling and a
//! magic-byte format check. Content sniffing, not the client's filename,
//! decides the format.

/// Upload ceiling: 5 MB.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// A validated upload: MIME type and file extension derived from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedImage {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

/// Sniff the image format from its leading bytes.
pub fn detect_format(bytes: &[u8]) -> Option<DetectedImage> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(DetectedImage {
            mime_type: "image/jpeg",
            extension: "jpg",
        });
    }
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(DetectedImage {
            mime_type: "image/png",
            extension: "png",
        });
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some(DetectedImage {
            mime_type: "image/webp",
            extension: "webp",
        });
    }
    None
}

/// Validate an uploaded image, returning a user-facing reason on rejection.
pub fn validate(bytes: &[u8]) -> Result<DetectedImage, String> {
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(format!(
            "Image too large. Maximum size is 5MB, your file is {:.1}MB",
            bytes.len() as f64 / (1024.0 * 1024.0)
        ));
    }

    detect_format(bytes)
        .ok_or_else(|| "Invalid format. Allowed formats: JPEG, JPG, PNG, WEBP".to_string())
}
