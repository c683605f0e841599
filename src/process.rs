//! Document processing entry point: one input file → one aggregated result.
//!
//! ## Stages
//!
//! ```text
//! validating → converting → (rasterizing ‖ metadata) → [context-pass] → main-pass → aggregating
//! ```
//!
//! Any stage may fail the job; nothing is retried. Whatever happens, the
//! input file and the job working directory are removed before
//! [`process_document`] returns.
//!
//! ## Concurrency
//!
//! Pages run as independent tokio tasks, at most
//! [`PipelineConfig::concurrency`] at a time (`buffer_unordered`). Outcomes
//! are collected in completion order and sorted by the aggregator. A page
//! task that panics is caught at its join handle and recorded as
//! `error_unknown`, so every rendered page yields exactly one outcome.

use crate::aggregate::{aggregate, JobTiming};
use crate::cleanup::cleanup_job;
use crate::config::PipelineConfig;
use crate::credential::Credential;
use crate::error::PipelineError;
use crate::output::{
    AggregatedResult, DocumentMetadata, OutputFormat, PageOutcome, PagePayload, PageStatus,
    RasterPage, SourceType,
};
use crate::pipeline::document::{convert_to_pdf, display_name};
use crate::pipeline::inference::{model_for, VisionModel};
use crate::pipeline::metadata::read_metadata;
use crate::pipeline::page::process_single_page;
use crate::pipeline::render::rasterize_pdf;
use crate::progress::{NoopObserver, PipelineObserver, Stage};
use crate::prompts::{compose_prompt, context_block, CONTEXT_PROMPT, MAX_CONTEXT_PAGES};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Extensions treated as ready-made page images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// One document processing job.
///
/// The caller owns `input_path` and `work_dir`; both are deleted when the
/// job finishes.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub input_path: PathBuf,
    pub prompt: String,
    pub output_format: OutputFormat,
    /// Run the context pre-pass over the first pages before the main pass.
    pub context_pass: bool,
    pub credential: Credential,
    /// Exclusive to this job.
    pub work_dir: PathBuf,
    /// Defaults to a random UUID.
    pub job_id: String,
}

impl ProcessingRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        prompt: impl Into<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            prompt: prompt.into(),
            output_format: OutputFormat::default(),
            context_pass: false,
            credential: Credential::anonymous(),
            work_dir: work_dir.into(),
            job_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_context_pass(mut self, enabled: bool) -> Self {
        self.context_pass = enabled;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }
}

/// How an input file enters the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Already a page image; used as the single page.
    Image,
    /// Already a PDF; rasterised directly.
    Pdf,
    /// Anything else; converted to PDF first.
    Document,
}

impl InputKind {
    pub fn classify(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            InputKind::Image
        } else if ext == "pdf" {
            InputKind::Pdf
        } else {
            InputKind::Document
        }
    }
}

/// Process one document end to end.
///
/// Returns `Ok` with a well-formed result even when every page failed;
/// returns `Err` only when a job-level stage failed. The input file and
/// `work_dir` are gone once this returns, on both paths.
pub async fn process_document(
    request: ProcessingRequest,
    config: &PipelineConfig,
) -> Result<AggregatedResult, PipelineError> {
    let observer: Arc<dyn PipelineObserver> = config
        .observer
        .clone()
        .unwrap_or_else(|| Arc::new(NoopObserver));

    info!(
        job_id = %request.job_id,
        "Starting job for '{}' (format: {}, context pass: {})",
        display_name(&request.input_path),
        request.output_format,
        request.context_pass
    );

    let result = run_job(&request, config, observer.as_ref()).await;

    if let Err(ref e) = result {
        error!(job_id = %request.job_id, stage = e.stage(), "Job failed: {}", e);
    }

    observer.on_stage(&request.job_id, Stage::CleaningUp);
    cleanup_job(&request.input_path, &request.work_dir).await;

    result
}

async fn run_job(
    request: &ProcessingRequest,
    config: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<AggregatedResult, PipelineError> {
    let started_at = Utc::now();
    let job_id = request.job_id.as_str();

    // ── Validation ───────────────────────────────────────────────────────
    observer.on_stage(job_id, Stage::Validating);
    if !tokio::fs::try_exists(&request.input_path).await.unwrap_or(false) {
        return Err(PipelineError::InputNotFound {
            path: request.input_path.clone(),
        });
    }
    tokio::fs::create_dir_all(&request.work_dir)
        .await
        .map_err(|e| PipelineError::WorkDir {
            path: request.work_dir.clone(),
            source: e,
        })?;
    let model = model_for(config, &request.credential)
        .map_err(|e| PipelineError::Internal(format!("could not build model client: {e}")))?;

    // ── Pages and metadata ───────────────────────────────────────────────
    let kind = InputKind::classify(&request.input_path);
    let (pages, metadata) = match kind {
        InputKind::Image => {
            info!(job_id, "Input is an image; skipping conversion and rasterisation");
            let page = RasterPage {
                page_number: 1,
                path: request.input_path.clone(),
            };
            (vec![page], DocumentMetadata::for_image())
        }
        InputKind::Pdf => {
            debug!(job_id, "Input is already a PDF; skipping conversion");
            render_document(&request.input_path, request, config, observer).await?
        }
        InputKind::Document => {
            observer.on_stage(job_id, Stage::Converting);
            let pdf = convert_to_pdf(
                &request.input_path,
                &request.work_dir.join("converted"),
                &config.tools.converter,
            )
            .await?;
            render_document(&pdf, request, config, observer).await?
        }
    };
    info!(job_id, "{} pages to process", pages.len());

    // ── Context pre-pass ─────────────────────────────────────────────────
    let context = if request.context_pass && kind != InputKind::Image {
        observer.on_stage(job_id, Stage::ContextPass);
        context_pass(&model, &pages, config, job_id).await
    } else {
        None
    };

    // ── Main pass ────────────────────────────────────────────────────────
    observer.on_stage(job_id, Stage::MainPass);
    observer.on_job_start(job_id, pages.len());
    let prompt = compose_prompt(context.as_deref(), &request.prompt);
    let outcomes = run_pages(
        &model,
        &pages,
        &prompt,
        request.output_format,
        config,
        job_id,
        Some(observer),
    )
    .await;

    // ── Aggregation ──────────────────────────────────────────────────────
    observer.on_stage(job_id, Stage::Aggregating);
    if outcomes.is_empty() && !pages.is_empty() {
        return Err(PipelineError::NoOutcomesCollected {
            expected: pages.len(),
        });
    }
    let aggregation_started_at = Utc::now();
    let result = aggregate(
        job_id,
        &display_name(&request.input_path),
        outcomes,
        metadata,
        &request.prompt,
        JobTiming::ending_now(started_at, aggregation_started_at),
    );
    let summary = &result.processing_summary;
    observer.on_job_complete(
        job_id,
        summary.successful_pages_count,
        summary.pages_with_errors_count,
    );
    Ok(result)
}

/// Rasterise `pdf` and read its metadata concurrently.
///
/// Rasterisation failure fails the job. Metadata failure is logged and the
/// page count falls back to the number of rendered pages.
async fn render_document(
    pdf: &Path,
    request: &ProcessingRequest,
    config: &PipelineConfig,
    observer: &dyn PipelineObserver,
) -> Result<(Vec<RasterPage>, DocumentMetadata), PipelineError> {
    let job_id = request.job_id.as_str();
    observer.on_stage(job_id, Stage::Rasterizing);

    let pages_dir = request.work_dir.join("pages");
    let (meta_result, raster_result) = tokio::join!(
        read_metadata(pdf, &config.tools.metadata),
        rasterize_pdf(pdf, &pages_dir, &config.tools.rasterizer),
    );

    let mut metadata = match meta_result {
        Ok(m) => {
            debug!(job_id, "Metadata reports {:?} pages", m.page_count());
            m
        }
        Err(e) => {
            warn!(job_id, "Continuing without document metadata: {}", e);
            observer.on_warning(job_id, &e.to_string());
            DocumentMetadata::new()
        }
    };

    let rasterized = raster_result?;
    if let Some(ref warning) = rasterized.warning {
        observer.on_warning(job_id, warning);
    }

    metadata.set_source_type(SourceType::Document);
    metadata.ensure_page_count(rasterized.pages.len());
    Ok((rasterized.pages, metadata))
}

/// Scan the first pages with [`CONTEXT_PROMPT`] and build the context block.
///
/// Failed pages are logged and skipped; `None` when nothing succeeded.
async fn context_pass(
    model: &Arc<dyn VisionModel>,
    pages: &[RasterPage],
    config: &PipelineConfig,
    job_id: &str,
) -> Option<String> {
    let prefix = &pages[..pages.len().min(MAX_CONTEXT_PAGES)];
    info!(job_id, "Running context pass over {} pages", prefix.len());

    let mut outcomes = run_pages(
        model,
        prefix,
        CONTEXT_PROMPT,
        OutputFormat::Structured,
        config,
        job_id,
        None,
    )
    .await;
    outcomes.sort_by_key(|o| o.page_number);

    let mut entries = Vec::new();
    for outcome in outcomes {
        match (outcome.status.is_success(), outcome.data) {
            (true, Some(PagePayload::Structured(value))) if value.is_object() => {
                entries.push((outcome.page_number, value));
            }
            _ => warn!(
                job_id,
                page = outcome.page_number,
                "Context pass page failed: {} {}",
                outcome.status,
                outcome.error_message.as_deref().unwrap_or("")
            ),
        }
    }

    let block = context_block(&entries);
    match &block {
        Some(b) => debug!(job_id, "Context block: {}", b),
        None => warn!(job_id, "Context pass yielded no usable pages"),
    }
    block
}

/// Run [`process_single_page`] over `pages` with bounded concurrency.
///
/// Returns one outcome per page, in completion order.
async fn run_pages(
    model: &Arc<dyn VisionModel>,
    pages: &[RasterPage],
    prompt: &str,
    format: OutputFormat,
    config: &PipelineConfig,
    job_id: &str,
    observer: Option<&dyn PipelineObserver>,
) -> Vec<PageOutcome> {
    let total = pages.len();
    let prompt: Arc<str> = Arc::from(prompt);
    let timeout_secs = config.api_timeout_secs;
    let mut done = 0usize;

    stream::iter(pages.iter().cloned().map(|page| {
        let model = Arc::clone(model);
        let prompt = Arc::clone(&prompt);
        async move {
            let n = page.page_number;
            let task = tokio::spawn(async move {
                process_single_page(model.as_ref(), &page, &prompt, format, timeout_secs).await
            });
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(page = n, "Page task failed: {}", e);
                    PageOutcome::failure(n, PageStatus::UnknownError, format!("Page task failed: {e}"))
                }
            }
        }
    }))
    .buffer_unordered(config.concurrency.max(1))
    .inspect(|outcome| {
        done += 1;
        info!(
            job_id,
            page = outcome.page_number,
            status = %outcome.status,
            "Completed page ({}/{})",
            done,
            total
        );
        if let Some(obs) = observer {
            obs.on_page_complete(job_id, outcome.page_number, outcome.status);
        }
    })
    .collect()
    .await
}
