//! Result types produced by a document processing run.
//!
//! Everything here is plain serialisable data: the orchestrator builds it,
//! the aggregator orders and counts it, and callers usually just serialise
//! the final [`AggregatedResult`] to JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Maximum number of characters of a model reply kept for diagnostics.
pub const RAW_RESPONSE_LIMIT: usize = 1000;

// ── Output format ────────────────────────────────────────────────────────

/// What shape the caller wants each page answer in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// The reply must be a JSON document. (default)
    #[default]
    #[serde(rename = "json")]
    Structured,
    /// The reply is returned verbatim.
    #[serde(rename = "text")]
    RawText,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Structured => f.write_str("json"),
            OutputFormat::RawText => f.write_str("text"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" | "structured" | "application/json" => Ok(OutputFormat::Structured),
            "text" | "raw" | "raw-text" | "text/plain" => Ok(OutputFormat::RawText),
            other => Err(format!("unknown output format '{other}' (expected json or text)")),
        }
    }
}

// ── Page outcome ─────────────────────────────────────────────────────────

/// Status of a single page. Serialised with the wire names clients expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageStatus {
    #[serde(rename = "success")]
    Success,
    /// Answered by a synthetic model; counts as successful.
    #[serde(rename = "mock_success")]
    MockSuccess,
    #[serde(rename = "error_api")]
    ApiError,
    #[serde(rename = "error_parsing")]
    ParseError,
    #[serde(rename = "error_validation")]
    ValidationError,
    #[serde(rename = "error_timeout")]
    TimeoutError,
    #[serde(rename = "error_image_encoding")]
    ImageEncodingError,
    #[serde(rename = "error_unknown")]
    UnknownError,
}

impl PageStatus {
    pub fn is_success(self) -> bool {
        matches!(self, PageStatus::Success | PageStatus::MockSuccess)
    }

    pub fn is_mock(self) -> bool {
        self == PageStatus::MockSuccess
    }

    pub fn is_error(self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageStatus::Success => "success",
            PageStatus::MockSuccess => "mock_success",
            PageStatus::ApiError => "error_api",
            PageStatus::ParseError => "error_parsing",
            PageStatus::ValidationError => "error_validation",
            PageStatus::TimeoutError => "error_timeout",
            PageStatus::ImageEncodingError => "error_image_encoding",
            PageStatus::UnknownError => "error_unknown",
        };
        f.write_str(s)
    }
}

/// A page answer. The user's prompt, not the pipeline, decides its shape,
/// so structured answers are kept as a schema-free JSON tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PagePayload {
    Text(String),
    Structured(serde_json::Value),
}

impl PagePayload {
    pub fn as_object(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            PagePayload::Structured(v) => v.as_object(),
            PagePayload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PagePayload::Text(s) => Some(s),
            PagePayload::Structured(_) => None,
        }
    }
}

/// Result of processing one rendered page. Exactly one per page.
///
/// Constructed only through the associated functions so that successful
/// outcomes always carry a payload and failed ones never carry one, except
/// for parse failures which keep the unparsed reply as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageOutcome {
    pub page_number: usize,
    pub status: PageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PagePayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl PageOutcome {
    pub fn success(page_number: usize, payload: PagePayload) -> Self {
        Self::completed(page_number, PageStatus::Success, payload)
    }

    pub fn mock_success(page_number: usize, payload: PagePayload) -> Self {
        Self::completed(page_number, PageStatus::MockSuccess, payload)
    }

    fn completed(page_number: usize, status: PageStatus, payload: PagePayload) -> Self {
        Self {
            page_number,
            status,
            data: Some(payload),
            error_message: None,
            raw_response: None,
            processed_at: Utc::now(),
        }
    }

    /// A failed page with no usable reply.
    pub fn failure(page_number: usize, status: PageStatus, message: impl Into<String>) -> Self {
        debug_assert!(status.is_error());
        Self {
            page_number,
            status,
            data: None,
            error_message: Some(message.into()),
            raw_response: None,
            processed_at: Utc::now(),
        }
    }

    /// A failed page whose model reply is kept for diagnostics.
    pub fn with_raw_response(mut self, raw: &str) -> Self {
        self.raw_response = Some(truncate_chars(raw, RAW_RESPONSE_LIMIT));
        self
    }

    /// A reply that could not be parsed. The unparsed text is kept both as
    /// the payload and as the raw response.
    pub fn unparsed(page_number: usize, message: impl Into<String>, raw: &str) -> Self {
        let mut outcome = Self::failure(page_number, PageStatus::ParseError, message);
        outcome.data = Some(PagePayload::Text(raw.to_string()));
        outcome.with_raw_response(raw)
    }
}

/// Keep at most `max` characters of `s`, never splitting a code point.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ── Raster pages ─────────────────────────────────────────────────────────

/// A single page rendered to an image file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterPage {
    /// 1-based, unique within a job.
    pub page_number: usize,
    pub path: PathBuf,
}

// ── Document metadata ────────────────────────────────────────────────────

/// Where the pages came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Document,
    Image,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Document => "document",
            SourceType::Image => "image",
        }
    }
}

/// A single metadata value after type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

/// Normalised document metadata, keyed by lower-case `snake_case` names.
///
/// Always contains a `pages` integer and a `source_type` tag once the
/// orchestrator has finished with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentMetadata(BTreeMap<String, MetadataValue>);

impl DocumentMetadata {
    pub const PAGE_COUNT_KEY: &'static str = "pages";
    pub const SOURCE_TYPE_KEY: &'static str = "source_type";

    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata for an image input: one page, source type `image`.
    pub fn for_image() -> Self {
        let mut meta = Self::new();
        meta.insert(Self::PAGE_COUNT_KEY, MetadataValue::Integer(1));
        meta.set_source_type(SourceType::Image);
        meta
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.0.insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Page count reported by the metadata tool, if it parsed as an integer.
    pub fn page_count(&self) -> Option<i64> {
        self.get(Self::PAGE_COUNT_KEY).and_then(MetadataValue::as_integer)
    }

    pub fn source_type(&self) -> Option<&str> {
        self.get(Self::SOURCE_TYPE_KEY).and_then(MetadataValue::as_text)
    }

    pub fn set_source_type(&mut self, source: SourceType) {
        self.insert(Self::SOURCE_TYPE_KEY, MetadataValue::from(source.as_str()));
    }

    /// Fill in the page count from the number of rendered pages when the
    /// metadata tool did not provide a usable one.
    pub fn ensure_page_count(&mut self, rendered: usize) {
        if self.page_count().is_none() {
            self.insert(Self::PAGE_COUNT_KEY, MetadataValue::Integer(rendered as i64));
        }
    }
}

// ── Aggregated result ────────────────────────────────────────────────────

/// Job-level summary embedded in the [`AggregatedResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub document_name: String,
    /// Page count reported by the document metadata.
    pub source_total_pages: usize,
    pub processed_pages_count: usize,
    /// Includes mock successes.
    pub successful_pages_count: usize,
    pub mock_pages_count: usize,
    pub pages_with_errors_count: usize,
    pub processing_prompt_used_snippet: String,
    pub aggregation_timestamp: DateTime<Utc>,
    pub total_processing_time_seconds: f64,
    pub aggregation_time_seconds: f64,
    pub pdf_metadata: DocumentMetadata,
}

/// The final, ordered output of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub job_id: String,
    pub processing_summary: JobSummary,
    /// Sorted ascending by page number.
    pub pages: Vec<PageOutcome>,
}

impl AggregatedResult {
    pub fn page(&self, page_number: usize) -> Option<&PageOutcome> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_format_parses_aliases() {
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Structured));
        assert_eq!("TEXT".parse::<OutputFormat>(), Ok(OutputFormat::RawText));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn status_wire_names() {
        let s = serde_json::to_string(&PageStatus::ImageEncodingError).unwrap();
        assert_eq!(s, "\"error_image_encoding\"");
        assert_eq!(PageStatus::ApiError.to_string(), "error_api");
        assert!(PageStatus::MockSuccess.is_success());
        assert!(PageStatus::MockSuccess.is_mock());
        assert!(PageStatus::TimeoutError.is_error());
    }

    #[test]
    fn failure_outcome_has_no_payload() {
        let o = PageOutcome::failure(2, PageStatus::ApiError, "boom");
        assert!(o.data.is_none());
        assert_eq!(o.error_message.as_deref(), Some("boom"));
        let v = serde_json::to_value(&o).unwrap();
        assert!(v.get("data").is_none());
    }

    #[test]
    fn unparsed_outcome_keeps_raw_text() {
        let o = PageOutcome::unparsed(1, "bad json", "not json");
        assert_eq!(o.status, PageStatus::ParseError);
        assert_eq!(o.data, Some(PagePayload::Text("not json".into())));
        assert_eq!(o.raw_response.as_deref(), Some("not json"));
    }

    #[test]
    fn raw_response_is_truncated_on_char_boundary() {
        let long = "é".repeat(RAW_RESPONSE_LIMIT + 10);
        let o = PageOutcome::failure(1, PageStatus::ValidationError, "x").with_raw_response(&long);
        assert_eq!(o.raw_response.unwrap().chars().count(), RAW_RESPONSE_LIMIT);
    }

    #[test]
    fn payload_serialises_untagged() {
        let p = PagePayload::Structured(json!({"a": 1}));
        assert_eq!(serde_json::to_value(&p).unwrap(), json!({"a": 1}));
        let t = PagePayload::Text("hello".into());
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("hello"));
    }

    #[test]
    fn metadata_page_count_fallback() {
        let mut meta = DocumentMetadata::new();
        meta.insert("pages", MetadataValue::from("garbled"));
        meta.ensure_page_count(7);
        assert_eq!(meta.page_count(), Some(7));

        let mut meta = DocumentMetadata::new();
        meta.insert("pages", MetadataValue::Integer(12));
        meta.ensure_page_count(3);
        assert_eq!(meta.page_count(), Some(12));
    }

    #[test]
    fn image_metadata() {
        let meta = DocumentMetadata::for_image();
        assert_eq!(meta.page_count(), Some(1));
        assert_eq!(meta.source_type(), Some("image"));
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            json!({"pages": 1, "source_type": "image"})
        );
    }
}
