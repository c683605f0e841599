//! Document normalisation: any office document → PDF via LibreOffice.
//!
//! The converter's exit code alone is not trusted. A conversion counts only
//! when the process exits 0 **and** `<out_dir>/<stem>.pdf` exists.

use crate::error::PipelineError;
use crate::pipeline::tool::run_tool;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Convert `input` to PDF inside `out_dir` using the `converter` executable.
///
/// Returns the path of the produced PDF. A partial output left behind by a
/// failed run is removed on a best-effort basis.
pub async fn convert_to_pdf(
    input: &Path,
    out_dir: &Path,
    converter: &str,
) -> Result<PathBuf, PipelineError> {
    if !input.exists() {
        return Err(PipelineError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| PipelineError::WorkDir {
            path: out_dir.to_path_buf(),
            source: e,
        })?;

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    let expected = out_dir.join(format!("{stem}.pdf"));
    let file_name = display_name(input);

    let out_dir_arg = out_dir.to_string_lossy();
    let input_arg = input.to_string_lossy();
    let args = [
        "--headless",
        "--norestore",
        "--nolockcheck",
        "--convert-to",
        "pdf:writer_pdf_Export",
        "--outdir",
        out_dir_arg.as_ref(),
        input_arg.as_ref(),
    ];
    let description = format!("LibreOffice conversion for '{file_name}'");
    let output = run_tool(converter, &args, &description).await;

    let produced = tokio::fs::try_exists(&expected).await.unwrap_or(false);
    if output.success() && produced {
        info!("Converted '{}' to '{}'", file_name, expected.display());
        return Ok(expected);
    }

    let mut detail = if produced {
        format!(
            "converter exited with code {} although '{}' exists",
            output.exit_code,
            expected.display()
        )
    } else {
        format!("output PDF '{stem}.pdf' was not created")
    };
    if !output.stderr.is_empty() {
        detail = explain_stderr(&output.stderr, &file_name)
            .unwrap_or_else(|| format!("{detail}. Stderr: {}", output.stderr));
    } else if !output.stdout.is_empty() {
        detail.push_str(&format!(". Stdout: {}", output.stdout));
    }

    if produced {
        match tokio::fs::remove_file(&expected).await {
            Ok(()) => warn!("Removed incomplete output file '{}'", expected.display()),
            Err(e) => warn!(
                "Failed to remove incomplete output file '{}': {}",
                expected.display(),
                e
            ),
        }
    }

    Err(PipelineError::ConversionFailed {
        path: input.to_path_buf(),
        detail,
    })
}

/// Map well-known LibreOffice stderr signatures to a clearer cause.
fn explain_stderr(stderr: &str, file_name: &str) -> Option<String> {
    if stderr.contains("Error: source file could not be loaded") {
        Some(format!(
            "LibreOffice could not load '{file_name}'; it may be corrupted or in an unsupported format. Stderr: {stderr}"
        ))
    } else if stderr.contains("javaldx failed") {
        Some(format!(
            "LibreOffice Java setup issue (javaldx failed); check the Java installation. Stderr: {stderr}"
        ))
    } else {
        debug!("No known converter signature in stderr");
        None
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
