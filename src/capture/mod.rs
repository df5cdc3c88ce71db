//! Captured problem images and the external capture collaborator seam.
//!
//! Actual OS-level screen capture (and any hide/restore choreography around
//! it) lives outside this core behind the `CaptureSource` trait. This
//! module owns the image value type, the collaborator contract, and the
//! ordered queues that hold captures for the pipeline.

pub mod queues;

pub use queues::CaptureQueues;

use std::fmt;
use std::path::PathBuf;

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("screen capture failed: {0}")]
    CaptureFailed(String),

    #[error("no image at index {index} in the {queue} queue")]
    IndexOutOfRange { queue: QueueSelector, index: usize },

    #[error("could not read image bytes: {0}")]
    Io(#[from] std::io::Error),
}

/// Which queue an action targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSelector {
    Primary,
    Secondary,
}

impl fmt::Display for QueueSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// A captured problem image. The backing file is owned by whichever queue
/// currently holds the value and is destroyed through the collaborator on
/// delete or queue-clear.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedImage {
    pub id: Uuid,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl CapturedImage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            created_at: Utc::now(),
        }
    }

    /// MIME type inferred from the file extension. PNG is what capture
    /// collaborators produce by default.
    pub fn mime_type(&self) -> &'static str {
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            _ => "image/png",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Collaborator contract
// ═══════════════════════════════════════════════════════════

/// External capture collaborator. Implementations wrap the OS screenshot
/// machinery; the core only ever sees finished image files.
pub trait CaptureSource: Send + Sync {
    /// Capture a fresh-problem image.
    fn capture_primary(&self) -> Result<CapturedImage, CaptureError>;

    /// Capture a follow-up (debug) image.
    fn capture_secondary(&self) -> Result<CapturedImage, CaptureError>;

    /// Displayable encoding of an image for the presentation layer.
    fn preview(&self, image: &CapturedImage) -> Result<String, CaptureError> {
        data_uri_preview(image)
    }

    /// Destroy the backing resource. Idempotent; missing files are not an
    /// error worth surfacing.
    fn delete(&self, image: &CapturedImage) -> Result<(), CaptureError>;
}

/// Default `preview` encoding: a base64 data URI.
pub fn data_uri_preview(image: &CapturedImage) -> Result<String, CaptureError> {
    let bytes = std::fs::read(&image.path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", image.mime_type(), encoded))
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(CapturedImage::new("a/shot.png".into()).mime_type(), "image/png");
        assert_eq!(CapturedImage::new("a/shot.jpg".into()).mime_type(), "image/jpeg");
        assert_eq!(CapturedImage::new("a/shot.jpeg".into()).mime_type(), "image/jpeg");
        assert_eq!(CapturedImage::new("a/shot".into()).mime_type(), "image/png");
    }

    #[test]
    fn new_images_get_distinct_ids() {
        let a = CapturedImage::new("x.png".into());
        let b = CapturedImage::new("x.png".into());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn data_uri_preview_encodes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"fakepng").unwrap();

        let uri = data_uri_preview(&CapturedImage::new(path)).unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
        // "fakepng" base64
        assert!(uri.ends_with("ZmFrZXBuZw=="));
    }

    #[test]
    fn preview_missing_file_is_io_error() {
        let image = CapturedImage::new("/nonexistent/shot.png".into());
        assert!(matches!(data_uri_preview(&image), Err(CaptureError::Io(_))));
    }
}
