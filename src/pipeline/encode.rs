//! Image encoding: raster file on disk → base64 payload for a data URI.
//!
//! Reading and base64-encoding a 300 DPI page is a few megabytes of work, so
//! it runs on the blocking pool rather than on a runtime worker thread.

use crate::error::EncodeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

const FALLBACK_MIME: &str = "image/png";

/// A page image ready to embed in a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard base64, no line breaks.
    pub data: String,
    pub mime: &'static str,
}

impl EncodedImage {
    /// `data:<mime>;base64,<data>`
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.data)
    }
}

/// MIME type implied by the file extension. Unknown extensions are sent as PNG.
pub fn mime_for_path(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or(FALLBACK_MIME)
}

/// Read `path` and base64-encode it.
pub async fn encode_image(path: &Path) -> Result<EncodedImage, EncodeError> {
    let owned: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || encode_image_blocking(&owned))
        .await
        .map_err(|e| EncodeError::Unexpected {
            path: path.to_path_buf(),
            detail: format!("encode task failed: {e}"),
        })?
}

fn encode_image_blocking(path: &Path) -> Result<EncodedImage, EncodeError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => EncodeError::NotFound {
            path: path.to_path_buf(),
        },
        _ => EncodeError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let data = STANDARD.encode(&bytes);
    debug!(
        "Encoded '{}': {} bytes → {} bytes base64",
        path.display(),
        bytes.len(),
        data.len()
    );

    Ok(EncodedImage {
        data,
        mime: mime_for_path(path),
    })
}
