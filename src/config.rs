//! Configuration types for document processing.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is resolved once by the caller
//! (CLI flags, environment, a host service) and shared read-only by every
//! page task of a job.

use crate::error::PipelineError;
use crate::pipeline::inference::VisionModel;
use crate::progress::PipelineObserver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://models.au-syd.resetdata.ai/v1";
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-4-Maverick-17B-128E-Instruct:shared";

/// Configuration for a document processing run.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use pagescan::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .concurrency(8)
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 8);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root URL of the OpenAI-compatible inference endpoint.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Maximum number of page tasks in flight at once. Default: 5.
    ///
    /// Applies to both the context pre-pass and the main pass. Lower it if
    /// the endpoint starts answering `429`.
    pub concurrency: usize,

    /// Per inference call timeout in seconds. Default: 90.
    pub api_timeout_secs: u64,

    /// External executables.
    pub tools: ToolPaths,

    /// Root under which callers create per-job working directories.
    pub work_root: PathBuf,

    /// How admission treats a missing credential.
    pub credential_policy: CredentialPolicy,

    /// Pre-built model client. Takes precedence over the HTTP client built
    /// from `base_url` and `model`.
    pub model_client: Option<Arc<dyn VisionModel>>,

    /// Receives stage and page events.
    pub observer: Option<Arc<dyn PipelineObserver>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            concurrency: 5,
            api_timeout_secs: 90,
            tools: ToolPaths::default(),
            work_root: PathBuf::from("/tmp/pagescan"),
            credential_policy: CredentialPolicy::default(),
            model_client: None,
            observer: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("tools", &self.tools)
            .field("work_root", &self.work_root)
            .field("credential_policy", &self.credential_policy)
            .field(
                "model_client",
                &self.model_client.as_ref().map(|_| "<dyn VisionModel>"),
            )
            .field(
                "observer",
                &self.observer.as_ref().map(|_| "<dyn PipelineObserver>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn tools(mut self, tools: ToolPaths) -> Self {
        self.config.tools = tools;
        self
    }

    pub fn converter(mut self, cmd: impl Into<String>) -> Self {
        self.config.tools.converter = cmd.into();
        self
    }

    pub fn rasterizer(mut self, cmd: impl Into<String>) -> Self {
        self.config.tools.rasterizer = cmd.into();
        self
    }

    pub fn metadata_reader(mut self, cmd: impl Into<String>) -> Self {
        self.config.tools.metadata = cmd.into();
        self
    }

    pub fn work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.work_root = root.into();
        self
    }

    pub fn credential_policy(mut self, policy: CredentialPolicy) -> Self {
        self.config.credential_policy = policy;
        self
    }

    pub fn model_client(mut self, client: Arc<dyn VisionModel>) -> Self {
        self.config.model_client = Some(client);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.base_url.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Base URL must not be empty".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Model identifier must not be empty".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(PipelineError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        for (name, cmd) in c.tools.iter() {
            if cmd.trim().is_empty() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} command must not be empty"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Tools ────────────────────────────────────────────────────────────────

/// Names or paths of the three external executables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Document-to-PDF converter (LibreOffice).
    pub converter: String,
    /// PDF page rasterizer (poppler `pdftoppm`).
    pub rasterizer: String,
    /// PDF metadata reader (poppler `pdfinfo`).
    pub metadata: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            converter: "libreoffice".to_string(),
            rasterizer: "pdftoppm".to_string(),
            metadata: "pdfinfo".to_string(),
        }
    }
}

impl ToolPaths {
    /// `(role, command)` pairs, in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("converter", self.converter.as_str()),
            ("rasterizer", self.rasterizer.as_str()),
            ("metadata", self.metadata.as_str()),
        ]
        .into_iter()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// What admission does with a job that has no credential.
///
/// | Policy | no credential | credential present |
/// |--------|---------------|--------------------|
/// | `Strict` | rejected | probed, rejected on failure |
/// | `Permissive` | admitted anonymously | probed, rejected on failure |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CredentialPolicy {
    /// A credential is required. (default)
    #[default]
    Strict,
    /// Missing credentials are admitted; requests go out without an
    /// `Authorization` header. Meant for local endpoints.
    Permissive,
}

impl std::str::FromStr for CredentialPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(CredentialPolicy::Strict),
            "permissive" => Ok(CredentialPolicy::Permissive),
            other => Err(format!(
                "unknown credential policy '{other}' (expected strict or permissive)"
            )),
        }
    }
}
