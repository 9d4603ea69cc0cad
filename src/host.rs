// Document capability
//
// The styled document lives outside this crate; the orchestrator reaches
// it through this interface. Capture failure is survivable (evaluation
// degrades to text-only), apply failure is not.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::{Path, PathBuf};

use crate::errors::ServiceError;
use crate::snapshot::ElementNode;

/// A rendered screenshot of the styled document, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub media_type: String,
    pub data: String,
}

#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Push the rendered stylesheet into the live document.
    async fn apply_style(&self, css: &str) -> Result<(), ServiceError>;

    /// Screenshot the current render. `Ok(None)` means the host has no
    /// capture pipeline right now; the run continues without an image.
    async fn capture_render(&self) -> Result<Option<Capture>, ServiceError>;

    /// Produce a fresh element-tree snapshot.
    async fn snapshot(&self) -> Result<ElementNode, ServiceError>;
}

/// File-backed host adapter: snapshot from a JSON file, styles written to a
/// stylesheet on disk, captures read from an optional image file refreshed
/// by an external renderer. This is the adapter the CLI drives; a browser
/// extension or embedded webview implements the same trait in production.
pub struct FileHost {
    snapshot_path: PathBuf,
    css_out: PathBuf,
    capture_path: Option<PathBuf>,
}

impl FileHost {
    pub fn new(
        snapshot_path: impl Into<PathBuf>,
        css_out: impl Into<PathBuf>,
        capture_path: Option<PathBuf>,
    ) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
            css_out: css_out.into(),
            capture_path,
        }
    }
}

#[async_trait]
impl DocumentHost for FileHost {
    async fn apply_style(&self, css: &str) -> Result<(), ServiceError> {
        tokio::fs::write(&self.css_out, css)
            .await
            .map_err(|e| ServiceError::DocumentApply(format!("{}: {e}", self.css_out.display())))
    }

    async fn capture_render(&self) -> Result<Option<Capture>, ServiceError> {
        let Some(path) = &self.capture_path else {
            return Ok(None);
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(Capture {
                media_type: media_type_for(path),
                data: BASE64.encode(bytes),
            })),
            Err(e) => Err(ServiceError::CaptureUnavailable(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    async fn snapshot(&self) -> Result<ElementNode, ServiceError> {
        let raw = tokio::fs::read_to_string(&self.snapshot_path)
            .await
            .map_err(|e| {
                ServiceError::BadRequest(format!("{}: {e}", self.snapshot_path.display()))
            })?;
        serde_json::from_str(&raw).map_err(|e| {
            ServiceError::BadRequest(format!("invalid snapshot {}: {e}", self.snapshot_path.display()))
        })
    }
}

/// Media type from a file extension, defaulting to PNG.
pub fn media_type_for(path: &Path) -> String {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        Some("gif") => "image/gif".to_string(),
        Some("webp") => "image/webp".to_string(),
        _ => "image/png".to_string(),
    }
}
