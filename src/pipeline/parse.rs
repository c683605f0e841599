//! Model reply normalisation for the requested output format.
//!
//! Raw-text replies pass through untouched. Structured replies get the
//! usual model quirks removed (a ```` ```json ```` fence, HTML-escaped
//! quotes) and must then parse as a JSON object or array.

use crate::output::{OutputFormat, PagePayload};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static RE_OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```[A-Za-z]*[ \t]*\r?\n?").unwrap());

static RE_CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n?[ \t]*```$").unwrap());

/// Why a reply could not be turned into a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    /// Nothing left after stripping.
    #[error("Empty content returned from model")]
    Empty,

    /// Not valid JSON.
    #[error("Failed to parse model output as JSON: {0}")]
    Malformed(String),

    /// Valid JSON, but a bare scalar where an object or array was expected.
    #[error("Model output is valid JSON but not an object or array (got {0})")]
    NotStructured(&'static str),
}

/// Turn a model reply into a page payload according to `format`.
pub fn parse_model_output(text: &str, format: OutputFormat) -> Result<PagePayload, ParseFailure> {
    match format {
        OutputFormat::RawText => Ok(PagePayload::Text(text.to_string())),
        OutputFormat::Structured => {
            let cleaned = html_unescape(strip_code_fence(text));
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                return Err(ParseFailure::Empty);
            }
            let value: serde_json::Value = serde_json::from_str(cleaned)
                .map_err(|e| ParseFailure::Malformed(e.to_string()))?;
            match value {
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    Ok(PagePayload::Structured(value))
                }
                other => Err(ParseFailure::NotStructured(json_kind(&other))),
            }
        }
    }
}

/// Remove a leading ```` ```json ```` fence and a trailing ```` ``` ````
/// fence, each only if present. A reply cut off before its closing fence
/// still loses the opening one.
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = match RE_OPENING_FENCE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    };
    let text = match RE_CLOSING_FENCE.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    };
    text.trim()
}

/// Decode HTML character references, named (HTML5 table) and numeric.
pub fn html_unescape(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fenced_json_parses() {
        let p = parse_model_output("```json\n{\"a\":1}\n```", OutputFormat::Structured).unwrap();
        assert_eq!(p, PagePayload::Structured(json!({"a": 1})));
    }

    #[test]
    fn bare_fence_and_whitespace() {
        let p = parse_model_output("  ```\n[1, 2]\n```  \n", OutputFormat::Structured).unwrap();
        assert_eq!(p, PagePayload::Structured(json!([1, 2])));
    }

    #[test]
    fn unfenced_json_parses() {
        let p = parse_model_output("{\"total\": \"12.50\"}", OutputFormat::Structured).unwrap();
        assert_eq!(p.as_object().unwrap()["total"], "12.50");
    }

    #[test]
    fn html_escaped_json_parses() {
        let p = parse_model_output("{&quot;a&quot;: &quot;x &amp; y&quot;}", OutputFormat::Structured)
            .unwrap();
        assert_eq!(p, PagePayload::Structured(json!({"a": "x & y"})));
    }

    #[test]
    fn not_json_is_malformed() {
        let err = parse_model_output("not json", OutputFormat::Structured).unwrap_err();
        assert!(matches!(err, ParseFailure::Malformed(_)));
    }

    #[test]
    fn empty_fence_is_empty() {
        assert_eq!(
            parse_model_output("```json\n```", OutputFormat::Structured),
            Err(ParseFailure::Empty)
        );
        assert_eq!(
            parse_model_output("   ", OutputFormat::Structured),
            Err(ParseFailure::Empty)
        );
    }

    #[test]
    fn scalar_is_not_structured() {
        assert_eq!(
            parse_model_output("42", OutputFormat::Structured),
            Err(ParseFailure::NotStructured("a number"))
        );
        assert_eq!(
            parse_model_output("null", OutputFormat::Structured),
            Err(ParseFailure::NotStructured("null"))
        );
    }

    #[test]
    fn raw_text_is_verbatim() {
        let text = "```json\nnot { json\n```";
        assert_eq!(
            parse_model_output(text, OutputFormat::RawText),
            Ok(PagePayload::Text(text.to_string()))
        );
    }

    #[test]
    fn opening_fence_without_closing_fence() {
        let p = parse_model_output("```json\n{\"a\":1}", OutputFormat::Structured).unwrap();
        assert_eq!(p, PagePayload::Structured(json!({"a": 1})));
    }

    #[test]
    fn closing_fence_without_opening_fence() {
        let p = parse_model_output("{\"a\":1}\n```", OutputFormat::Structured).unwrap();
        assert_eq!(p, PagePayload::Structured(json!({"a": 1})));
    }

    #[test]
    fn inner_backticks_survive() {
        assert_eq!(
            strip_code_fence("```json\n{\"k\": \"`x`\"}\n```"),
            "{\"k\": \"`x`\"}"
        );
        assert_eq!(strip_code_fence("  plain  "), "plain");
    }

    #[test]
    fn unescape_named_and_numeric() {
        assert_eq!(html_unescape("&#39;a&#x41;"), "'aA");
        assert_eq!(html_unescape("a &lt;b&gt;"), "a <b>");
        assert_eq!(
            html_unescape("caf&eacute; l&rsquo;&eacute;t&eacute;"),
            "caf\u{e9} l\u{2019}\u{e9}t\u{e9}"
        );
    }

    #[test]
    fn accented_entities_inside_json() {
        let p = parse_model_output(
            "{&quot;city&quot;: &quot;Montr&eacute;al&quot;}",
            OutputFormat::Structured,
        )
        .unwrap();
        assert_eq!(p, PagePayload::Structured(json!({"city": "Montr\u{e9}al"})));
    }
}
