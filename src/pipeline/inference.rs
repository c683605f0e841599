//! Inference adapter: one page image + prompt → one model reply.
//!
//! [`VisionModel`] is the seam between the pipeline and the remote model.
//! The production implementation, [`OpenAiCompatModel`], speaks the
//! OpenAI-compatible `chat/completions` API over `reqwest`. Tests and dry
//! runs plug in their own implementation via
//! [`crate::config::PipelineConfigBuilder::model_client`].
//!
//! ## Request shape
//!
//! A single user turn whose content is the page image (as a data URI)
//! followed by the prompt text. Sampling is fixed: the pipeline wants
//! faithful reading, not creativity.

use crate::config::PipelineConfig;
use crate::credential::Credential;
use crate::error::InferenceError;
use crate::output::{truncate_chars, OutputFormat};
use crate::pipeline::encode::EncodedImage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const TEMPERATURE: f32 = 0.2;
pub const TOP_P: f32 = 0.95;
pub const MAX_TOKENS: u32 = 8192;

/// Everything a model needs to answer for one page.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub page_number: usize,
    pub prompt: String,
    pub image: EncodedImage,
    pub format: OutputFormat,
}

/// Text of the first completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    /// The reply did not come from a real model (dry runs).
    pub synthetic: bool,
}

impl ModelReply {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            synthetic: false,
        }
    }
}

/// A vision-capable chat model.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Answer one page.
    async fn complete(&self, request: VisionRequest) -> Result<ModelReply, InferenceError>;

    /// Cheap capability check used once per job at admission.
    ///
    /// Models with nothing to check accept every credential.
    async fn probe(&self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Run one inference call under the per-call timeout.
///
/// A timeout affects only this call; sibling page tasks keep running.
pub async fn call_inference(
    model: &dyn VisionModel,
    request: VisionRequest,
    timeout_secs: u64,
) -> Result<ModelReply, InferenceError> {
    let page = request.page_number;
    let start = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), model.complete(request))
        .await
        .map_err(|_| InferenceError::Timeout { secs: timeout_secs })?;

    match &result {
        Ok(reply) => debug!(
            page,
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = reply.text.len(),
            "Model replied"
        ),
        Err(e) => warn!(page, "Model call failed: {}", e),
    }
    result
}

/// The model a job should use: the configured client if there is one,
/// otherwise an HTTP client for `config.base_url` carrying `credential`.
pub fn model_for(
    config: &PipelineConfig,
    credential: &Credential,
) -> Result<Arc<dyn VisionModel>, InferenceError> {
    if let Some(ref client) = config.model_client {
        return Ok(Arc::clone(client));
    }
    let model = OpenAiCompatModel::new(&config.base_url, &config.model, credential.clone())?;
    Ok(Arc::new(model))
}

// ── OpenAI-compatible HTTP client ────────────────────────────────────────

/// Client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
    credential: Credential,
}

impl std::fmt::Debug for OpenAiCompatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("credential", &self.credential)
            .finish()
    }
}

impl OpenAiCompatModel {
    pub fn new(
        base_url: &str,
        model: &str,
        credential: Credential,
    ) -> Result<Self, InferenceError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| InferenceError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            credential,
        })
    }

    fn authorised(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credential.secret() {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn error_for_status(response: reqwest::Response) -> InferenceError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        InferenceError::Api {
            status,
            body: truncate_chars(&body, 500),
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiCompatModel {
    async fn complete(&self, request: VisionRequest) -> Result<ModelReply, InferenceError> {
        let body = ChatRequest::for_page(&self.model, &request);
        debug!(
            page = request.page_number,
            image_bytes = request.image.data.len(),
            "Sending chat completion"
        );

        let response = self
            .authorised(self.http.post(format!("{}/chat/completions", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_for_status(response).await);
        }

        let raw: ChatResponseRaw = response
            .json()
            .await
            .map_err(|e| InferenceError::MalformedResponse(e.to_string()))?;

        raw.choices
            .into_iter()
            .next()
            .map(|c| ModelReply::new(c.message.content.unwrap_or_default()))
            .ok_or_else(|| InferenceError::MalformedResponse("response has no choices".into()))
    }

    async fn probe(&self) -> Result<(), InferenceError> {
        let response = self
            .authorised(self.http.get(format!("{}/models", self.base_url)))
            .send()
            .await
            .map_err(|e| InferenceError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::error_for_status(response).await)
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn for_page(model: &'a str, request: &VisionRequest) -> Self {
        Self {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: request.image.data_url(),
                        },
                    },
                    ContentPart::Text {
                        text: request.prompt.clone(),
                    },
                ],
            }],
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponseRaw {
    #[serde(default)]
    choices: Vec<ChoiceRaw>,
}

#[derive(Debug, Deserialize)]
struct ChoiceRaw {
    message: MessageRaw,
}

#[derive(Debug, Deserialize)]
struct MessageRaw {
    #[serde(default)]
    content: Option<String>,
}

// ── Dry run ──────────────────────────────────────────────────────────────

/// A model that answers every page with a canned reply, without any network.
///
/// Pages it answers are recorded as mock successes.
#[derive(Debug, Clone, Default)]
pub struct DryRunModel;

#[async_trait]
impl VisionModel for DryRunModel {
    async fn complete(&self, request: VisionRequest) -> Result<ModelReply, InferenceError> {
        let text = match request.format {
            OutputFormat::Structured => serde_json::json!({
                "page": request.page_number,
                "dry_run": true,
                "prompt_excerpt": truncate_chars(&request.prompt, 80),
                "image_bytes": request.image.data.len(),
            })
            .to_string(),
            OutputFormat::RawText => format!(
                "[dry run] page {} ({} bytes of {})",
                request.page_number,
                request.image.data.len(),
                request.image.mime
            ),
        };
        Ok(ModelReply {
            text,
            synthetic: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn request(format: OutputFormat) -> VisionRequest {
        VisionRequest {
            page_number: 2,
            prompt: "List the totals".into(),
            image: EncodedImage {
                data: "aGVsbG8=".into(),
                mime: "image/png",
            },
            format,
        }
    }

    /// Serve one canned HTTP response and hand back the raw request text.
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(end) = text.find("\r\n\r\n") {
                    let len = text[..end]
                        .lines()
                        .find_map(|l| {
                            let l = l.to_ascii_lowercase();
                            l.strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= end + 4 + len {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}/v1"), handle)
    }

    #[test]
    fn request_body_shape() {
        let body = ChatRequest::for_page("vision-1", &request(OutputFormat::Structured));
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "vision-1");
        assert_eq!(v["stream"], false);
        assert_eq!(v["max_tokens"], 8192);
        let content = &v["messages"][0]["content"];
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(content[0]["type"], "image_url");
        assert_eq!(content[0]["image_url"]["url"], "data:image/png;base64,aGVsbG8=");
        assert_eq!(content[1]["type"], "text");
        assert_eq!(content[1]["text"], "List the totals");
        assert!((v["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn completes_against_http_endpoint() {
        let (base, server) = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"total\": 3}"}}]}"#,
        )
        .await;
        let model = OpenAiCompatModel::new(&base, "vision-1", Credential::bearer("sk-1")).unwrap();
        let reply = model.complete(request(OutputFormat::Structured)).await.unwrap();
        assert_eq!(reply.text, "{\"total\": 3}");
        assert!(!reply.synthetic);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /v1/chat/completions"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer sk-1"));
    }

    #[tokio::test]
    async fn anonymous_probe_sends_no_authorization() {
        let (base, server) = serve_once("200 OK", r#"{"data":[]}"#).await;
        let model = OpenAiCompatModel::new(&base, "m", Credential::anonymous()).unwrap();
        model.probe().await.unwrap();
        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /v1/models"));
        assert!(!raw.to_ascii_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let (base, _server) = serve_once("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let model = OpenAiCompatModel::new(&base, "m", Credential::bearer("x")).unwrap();
        match model.probe().await.unwrap_err() {
            InferenceError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let (base, _server) = serve_once("200 OK", r#"{"choices":[]}"#).await;
        let model = OpenAiCompatModel::new(&base, "m", Credential::anonymous()).unwrap();
        let err = model.complete(request(OutputFormat::RawText)).await.unwrap_err();
        assert!(matches!(err, InferenceError::MalformedResponse(_)));
    }

    struct Stalled;

    #[async_trait]
    impl VisionModel for Stalled {
        async fn complete(&self, _request: VisionRequest) -> Result<ModelReply, InferenceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelReply::new("late"))
        }
    }

    #[tokio::test]
    async fn slow_call_times_out() {
        let err = call_inference(&Stalled, request(OutputFormat::RawText), 1)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn dry_run_is_synthetic_json() {
        let reply = DryRunModel.complete(request(OutputFormat::Structured)).await.unwrap();
        assert!(reply.synthetic);
        let v: serde_json::Value = serde_json::from_str(&reply.text).unwrap();
        assert_eq!(v["page"], 2);
        assert_eq!(v["dry_run"], true);
    }
}
