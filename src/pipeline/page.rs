//! The per-page unit of work: encode → infer → extract → parse.
//!
//! Always returns a [`PageOutcome`]. Every step has its own failure status,
//! and nothing escapes the page.

use crate::output::{OutputFormat, PageOutcome, PageStatus, RasterPage};
use crate::pipeline::encode::encode_image;
use crate::pipeline::inference::{call_inference, VisionModel, VisionRequest};
use crate::pipeline::parse::{parse_model_output, ParseFailure};
use std::time::Instant;
use tracing::{error, info, warn};

/// Process one rendered page with `prompt`.
pub async fn process_single_page(
    model: &dyn VisionModel,
    page: &RasterPage,
    prompt: &str,
    format: OutputFormat,
    timeout_secs: u64,
) -> PageOutcome {
    let n = page.page_number;
    let start = Instant::now();

    // 1. Encode
    let image = match encode_image(&page.path).await {
        Ok(img) => img,
        Err(e) => {
            error!(page = n, "Failed to encode image: {}", e);
            return PageOutcome::failure(
                n,
                PageStatus::ImageEncodingError,
                format!("Failed to encode image: {e}"),
            );
        }
    };

    // 2. Infer
    let request = VisionRequest {
        page_number: n,
        prompt: prompt.to_string(),
        image,
        format,
    };
    let reply = match call_inference(model, request, timeout_secs).await {
        Ok(reply) => reply,
        Err(e) => {
            let status = if e.is_timeout() {
                PageStatus::TimeoutError
            } else {
                PageStatus::ApiError
            };
            return PageOutcome::failure(n, status, e.to_string());
        }
    };

    // 3. Extract
    if reply.text.is_empty() {
        warn!(page = n, "Model returned empty content");
        return PageOutcome::failure(n, PageStatus::ParseError, ParseFailure::Empty.to_string());
    }

    // 4. Parse
    let outcome = match parse_model_output(&reply.text, format) {
        Ok(payload) if reply.synthetic => PageOutcome::mock_success(n, payload),
        Ok(payload) => PageOutcome::success(n, payload),
        Err(ParseFailure::NotStructured(kind)) => {
            warn!(page = n, "Reply is JSON {} rather than an object or array", kind);
            PageOutcome::failure(
                n,
                PageStatus::ValidationError,
                ParseFailure::NotStructured(kind).to_string(),
            )
            .with_raw_response(&reply.text)
        }
        Err(e @ ParseFailure::Empty) => {
            warn!(page = n, "{}", e);
            PageOutcome::failure(n, PageStatus::ParseError, e.to_string())
                .with_raw_response(&reply.text)
        }
        Err(e @ ParseFailure::Malformed(_)) => {
            warn!(page = n, "{}", e);
            PageOutcome::unparsed(n, e.to_string(), &reply.text)
        }
    };

    if outcome.status.is_success() {
        info!(
            page = n,
            elapsed_ms = start.elapsed().as_millis() as u64,
            status = %outcome.status,
            "Page processed"
        );
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::output::PagePayload;
    use crate::pipeline::inference::{DryRunModel, ModelReply};
    use async_trait::async_trait;
    use std::path::Path;

    struct Fixed(Result<&'static str, InferenceError>);

    #[async_trait]
    impl VisionModel for Fixed {
        async fn complete(&self, _request: VisionRequest) -> Result<ModelReply, InferenceError> {
            self.0.clone().map(ModelReply::new)
        }
    }

    fn page_in(dir: &Path) -> RasterPage {
        let path = dir.join("doc-1.png");
        std::fs::write(&path, b"png bytes").unwrap();
        RasterPage {
            page_number: 1,
            path,
        }
    }

    async fn run(model: Fixed, format: OutputFormat) -> PageOutcome {
        let dir = tempfile::tempdir().unwrap();
        let page = page_in(dir.path());
        process_single_page(&model, &page, "prompt", format, 30).await
    }

    #[tokio::test]
    async fn success_carries_payload() {
        let o = run(Fixed(Ok("{\"a\": 1}")), OutputFormat::Structured).await;
        assert_eq!(o.status, PageStatus::Success);
        assert!(o.data.is_some());
        assert!(o.error_message.is_none());
    }

    #[tokio::test]
    async fn missing_image_is_encoding_error() {
        let page = RasterPage {
            page_number: 4,
            path: "/nonexistent/page-4.png".into(),
        };
        let o = process_single_page(&Fixed(Ok("{}")), &page, "p", OutputFormat::Structured, 30).await;
        assert_eq!(o.status, PageStatus::ImageEncodingError);
        assert_eq!(o.page_number, 4);
        assert!(o.data.is_none());
    }

    #[tokio::test]
    async fn api_failure_is_api_error() {
        let o = run(
            Fixed(Err(InferenceError::Api {
                status: 500,
                body: "upstream".into(),
            })),
            OutputFormat::RawText,
        )
        .await;
        assert_eq!(o.status, PageStatus::ApiError);
        assert!(o.error_message.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn timeout_is_timeout_error() {
        let o = run(Fixed(Err(InferenceError::Timeout { secs: 30 })), OutputFormat::RawText).await;
        assert_eq!(o.status, PageStatus::TimeoutError);
    }

    #[tokio::test]
    async fn empty_reply_is_parse_error() {
        let o = run(Fixed(Ok("")), OutputFormat::RawText).await;
        assert_eq!(o.status, PageStatus::ParseError);
        assert!(o.data.is_none());
    }

    #[tokio::test]
    async fn malformed_json_keeps_raw_text() {
        let o = run(Fixed(Ok("not json")), OutputFormat::Structured).await;
        assert_eq!(o.status, PageStatus::ParseError);
        assert_eq!(o.data, Some(PagePayload::Text("not json".into())));
        assert_eq!(o.raw_response.as_deref(), Some("not json"));
    }

    #[tokio::test]
    async fn scalar_json_is_validation_error() {
        let o = run(Fixed(Ok("\"just a string\"")), OutputFormat::Structured).await;
        assert_eq!(o.status, PageStatus::ValidationError);
        assert!(o.data.is_none());
        assert!(o.raw_response.is_some());
    }

    #[tokio::test]
    async fn synthetic_reply_is_mock_success() {
        let dir = tempfile::tempdir().unwrap();
        let page = page_in(dir.path());
        let o = process_single_page(&DryRunModel, &page, "p", OutputFormat::Structured, 30).await;
        assert_eq!(o.status, PageStatus::MockSuccess);
        assert!(o.data.is_some());
    }
}
