//! PDF rasterisation: render every page to a 300 DPI PNG via `pdftoppm`.
//!
//! `pdftoppm` writes `<prefix>-<n>.png` files (zero-padded to the width of
//! the page count). Success is decided by scanning the output directory, not
//! by exit code: the tool regularly exits non-zero on font warnings while
//! still producing every page.

use crate::error::PipelineError;
use crate::output::RasterPage;
use crate::pipeline::document::display_name;
use crate::pipeline::tool::run_tool;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rendering resolution passed to the rasterizer.
pub const RENDER_DPI: u32 = 300;

static RE_PAGE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)\.png$").unwrap());

/// Pages rendered from one PDF.
#[derive(Debug, Clone)]
pub struct Rasterized {
    /// Ordered by page number, numbered from 1.
    pub pages: Vec<RasterPage>,
    /// Set when the tool exited non-zero but still produced pages.
    pub warning: Option<String>,
}

/// Render every page of `pdf` into `out_dir` using the `rasterizer` executable.
///
/// Zero produced files is always a failure, whatever the exit code.
pub async fn rasterize_pdf(
    pdf: &Path,
    out_dir: &Path,
    rasterizer: &str,
) -> Result<Rasterized, PipelineError> {
    if !pdf.exists() {
        return Err(PipelineError::RasterisationFailed {
            path: pdf.to_path_buf(),
            detail: "input PDF does not exist".into(),
        });
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| PipelineError::WorkDir {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "page".to_string());
    let prefix = out_dir.join(&stem);

    let dpi = RENDER_DPI.to_string();
    let pdf_arg = pdf.to_string_lossy();
    let prefix_arg = prefix.to_string_lossy();
    let args = [
        "-png",
        "-r",
        dpi.as_str(),
        "-cropbox",
        pdf_arg.as_ref(),
        prefix_arg.as_ref(),
    ];
    let description = format!("pdftoppm rasterisation for '{}'", display_name(pdf));
    let output = run_tool(rasterizer, &args, &description).await;

    let pages = collect_rendered_pages(out_dir, &stem).await.map_err(|e| {
        PipelineError::RasterisationFailed {
            path: pdf.to_path_buf(),
            detail: format!("could not scan '{}': {}", out_dir.display(), e),
        }
    })?;

    if pages.is_empty() {
        let mut detail = format!("no PNG files were found for prefix '{}'", prefix.display());
        if !output.success() {
            detail.push_str(&format!("; rasterizer exited with code {}", output.exit_code));
        }
        if !output.stderr.is_empty() {
            detail.push_str(&format!(". Stderr: {}", output.stderr));
        }
        return Err(PipelineError::RasterisationFailed {
            path: pdf.to_path_buf(),
            detail,
        });
    }

    info!("Rendered {} pages from '{}'", pages.len(), display_name(pdf));

    let warning = (!output.success()).then(|| {
        let msg = format!(
            "rasterizer exited with code {} but {} pages were rendered: {}",
            output.exit_code,
            pages.len(),
            output.diagnostics()
        );
        warn!("{}", msg);
        msg
    });

    Ok(Rasterized { pages, warning })
}

/// List `<stem>-*.png` files in `dir`, ordered by their numeric page suffix.
///
/// Lexical order would put `-10` before `-2`; the suffix is parsed instead.
pub async fn collect_rendered_pages(dir: &Path, stem: &str) -> std::io::Result<Vec<RasterPage>> {
    let head = format!("{stem}-");
    let mut found: Vec<(u64, String, PathBuf)> = Vec::new();

    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with(&head) || !name.ends_with(".png") {
            continue;
        }
        let key = RE_PAGE_SUFFIX
            .captures(&name)
            .and_then(|c| c[1].parse::<u64>().ok())
            .unwrap_or(0);
        found.push((key, name, entry.path()));
    }

    found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    Ok(found
        .into_iter()
        .enumerate()
        .map(|(i, (_, _, path))| RasterPage {
            page_number: i + 1,
            path,
        })
        .collect())
}
