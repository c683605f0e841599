//! PDF metadata via `pdfinfo`, parsed from its `Key: value` text output.
//!
//! Parsing never fails: a field that does not coerce to its expected type is
//! logged and kept as text.

use crate::error::PipelineError;
use crate::output::{DocumentMetadata, MetadataValue};
use crate::pipeline::document::display_name;
use crate::pipeline::tool::run_tool;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tracing::{debug, warn};

static RE_KEY_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([^:]+):\s*(.*)$").unwrap());
static RE_KEY_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").unwrap());
static RE_PAGE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([\d.]+)\s*x\s*([\d.]+)\s*pts").unwrap());

const INTEGER_FIELDS: &[&str] = &["pages", "page_rot"];
const BOOLEAN_FIELDS: &[&str] = &["encrypted", "optimized", "tagged"];

/// Run the `metadata` tool on `pdf` and parse its output.
///
/// Errors are [`PipelineError::MetadataUnavailable`], which the orchestrator
/// treats as recoverable.
pub async fn read_metadata(pdf: &Path, metadata_tool: &str) -> Result<DocumentMetadata, PipelineError> {
    if !pdf.exists() {
        return Err(PipelineError::MetadataUnavailable {
            path: pdf.to_path_buf(),
            detail: "input PDF does not exist".into(),
        });
    }

    let pdf_arg = pdf.to_string_lossy();
    let description = format!("pdfinfo metadata extraction for '{}'", display_name(pdf));
    let output = run_tool(metadata_tool, &[pdf_arg.as_ref()], &description).await;

    if !output.success() {
        return Err(PipelineError::MetadataUnavailable {
            path: pdf.to_path_buf(),
            detail: format!(
                "metadata tool exited with code {}: {}",
                output.exit_code,
                output.diagnostics()
            ),
        });
    }

    Ok(parse_metadata(&output.stdout))
}

/// Parse `pdfinfo`-style text into normalised metadata.
///
/// * keys are lower-cased; runs of spaces and hyphens become one `_`
/// * indented lines continue the previous value (joined with `\n`)
/// * `pages` and `page_rot` become integers
/// * `encrypted`, `optimized` and `tagged` become booleans
/// * `page_size` of the form `"W x H pts ..."` adds `page_width_pts` and
///   `page_height_pts`
pub fn parse_metadata(text: &str) -> DocumentMetadata {
    let mut raw: Vec<(String, Vec<String>)> = Vec::new();
    let mut open = false;

    for line in text.lines() {
        let indented = line.starts_with(' ') || line.starts_with('\t');
        if open && indented && !line.trim().is_empty() {
            if let Some((_, values)) = raw.last_mut() {
                values.push(line.trim().to_string());
            }
            continue;
        }
        match RE_KEY_VALUE.captures(line) {
            Some(caps) => {
                let key = normalise_key(&caps[1]);
                if key.is_empty() {
                    open = false;
                    continue;
                }
                raw.push((key, vec![caps[2].trim().to_string()]));
                open = true;
            }
            None => open = false,
        }
    }

    let mut meta = DocumentMetadata::new();
    for (key, values) in raw {
        let value = values.join("\n").trim().to_string();
        let typed = coerce(&key, &value);
        meta.insert(key, typed);
    }

    let page_size = meta
        .get("page_size")
        .and_then(MetadataValue::as_text)
        .map(str::to_string);
    if let Some(size) = page_size {
        match page_dimensions(&size) {
            Some((w, h)) => {
                meta.insert("page_width_pts", MetadataValue::Float(w));
                meta.insert("page_height_pts", MetadataValue::Float(h));
            }
            None => warn!("Could not parse page dimensions from '{}'", size),
        }
    }

    debug!(fields = meta.len(), "Parsed document metadata");
    meta
}

fn normalise_key(raw: &str) -> String {
    RE_KEY_SEPARATORS
        .replace_all(raw.trim(), "_")
        .to_lowercase()
}

fn coerce(key: &str, value: &str) -> MetadataValue {
    if INTEGER_FIELDS.contains(&key) {
        return match value.parse::<i64>() {
            Ok(n) => MetadataValue::Integer(n),
            Err(_) => {
                warn!("Could not convert metadata field '{}' to int: '{}'", key, value);
                MetadataValue::Text(value.to_string())
            }
        };
    }
    if BOOLEAN_FIELDS.contains(&key) {
        // pdfinfo prints e.g. "yes (print:yes copy:no change:no addNotes:no)"
        let lower = value.to_lowercase();
        if lower.starts_with("yes") {
            return MetadataValue::Bool(true);
        }
        if lower.starts_with("no") {
            return MetadataValue::Bool(false);
        }
        warn!("Could not convert metadata field '{}' to bool: '{}'", key, value);
    }
    MetadataValue::Text(value.to_string())
}

fn page_dimensions(size: &str) -> Option<(f64, f64)> {
    let caps = RE_PAGE_SIZE.captures(size)?;
    let w = caps[1].parse::<f64>().ok()?;
    let h = caps[2].parse::<f64>().ok()?;
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Title:          Quarterly Report
Producer:       LibreOffice 7.6
CreationDate:   Tue Mar  5 10:12:44 2024 UTC
Custom Metadata: no
Tagged:         yes
Pages:          12
Encrypted:      no
Page size:      612 x 792 pts (letter)
Page rot:       0
File size:      48213 bytes
Optimized:      no
PDF version:    1.7";

    #[test]
    fn parses_and_coerces_known_fields() {
        let m = parse_metadata(SAMPLE);
        assert_eq!(m.page_count(), Some(12));
        assert_eq!(m.get("page_rot"), Some(&MetadataValue::Integer(0)));
        assert_eq!(m.get("tagged"), Some(&MetadataValue::Bool(true)));
        assert_eq!(m.get("encrypted"), Some(&MetadataValue::Bool(false)));
        assert_eq!(m.get("page_width_pts"), Some(&MetadataValue::Float(612.0)));
        assert_eq!(m.get("page_height_pts"), Some(&MetadataValue::Float(792.0)));
        assert_eq!(
            m.get("title").and_then(MetadataValue::as_text),
            Some("Quarterly Report")
        );
        assert!(m.contains_key("pdf_version"));
        assert!(m.contains_key("custom_metadata"));
    }

    #[test]
    fn keys_are_normalised() {
        let m = parse_metadata("Page-Size  Extra:  A4\nJavaScript: no");
        assert!(m.contains_key("page_size_extra"));
        assert!(m.contains_key("javascript"));
    }

    #[test]
    fn indented_lines_continue_previous_value() {
        let m = parse_metadata("Keywords: alpha\n   beta\n\tgamma\nPages: 2");
        assert_eq!(
            m.get("keywords").and_then(MetadataValue::as_text),
            Some("alpha\nbeta\ngamma")
        );
        assert_eq!(m.page_count(), Some(2));
    }

    #[test]
    fn unparseable_integer_stays_text() {
        let m = parse_metadata("Pages: many");
        assert_eq!(m.page_count(), None);
        assert_eq!(m.get("pages"), Some(&MetadataValue::Text("many".into())));
    }

    #[test]
    fn encrypted_with_permissions_is_true() {
        let m = parse_metadata("Encrypted: yes (print:yes copy:no change:no addNotes:no)");
        assert_eq!(m.get("encrypted"), Some(&MetadataValue::Bool(true)));
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let m = parse_metadata("Syntax Warning\n\nPages: 3\nnot a pair");
        assert_eq!(m.len(), 1);
        assert_eq!(m.page_count(), Some(3));
    }

    #[test]
    fn empty_input_gives_empty_metadata() {
        assert!(parse_metadata("").is_empty());
    }
}
