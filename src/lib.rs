//! # pagescan
//!
//! Turn documents into structured, per-page data using a vision model.
//!
//! Office documents and PDFs are rendered to one PNG per page; each page
//! image is sent to an OpenAI-compatible vision endpoint together with a
//! user prompt, and the replies are parsed and merged into one ordered
//! result with a job summary.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Validate   input exists, working directory ready
//!  ├─ 2. Convert    office formats → PDF (LibreOffice, headless)
//!  ├─ 3. Render     PDF → PNG per page (pdftoppm, 300 DPI) ‖ metadata (pdfinfo)
//!  ├─ 4. Context    optional pre-pass over the first pages
//!  ├─ 5. Infer      concurrent vision calls, one task per page
//!  ├─ 6. Aggregate  sort, count, summarise
//!  └─ 7. Clean up   input and working directory removed, always
//! ```
//!
//! A failed page never fails the job: it is recorded with an error status
//! next to its successful siblings.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagescan::{admit_credential, process_document, PipelineConfig, ProcessingRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().concurrency(4).build()?;
//!     let key = std::env::var("LLM_API_KEY").ok();
//!     let credential = admit_credential(&config, key.as_deref()).await?;
//!
//!     let request = ProcessingRequest::new(
//!         "/tmp/pagescan/job_1/upload/invoice.docx",
//!         "Extract the invoice number and line items.",
//!         "/tmp/pagescan/job_1",
//!     )
//!     .with_credential(credential);
//!
//!     let result = process_document(request, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagescan` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External Tools
//!
//! | Tool | Used for | Config field |
//! |------|----------|--------------|
//! | `libreoffice` | document → PDF | [`ToolPaths::converter`] |
//! | `pdftoppm`    | PDF → PNG pages | [`ToolPaths::rasterizer`] |
//! | `pdfinfo`     | document metadata | [`ToolPaths::metadata`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod cleanup;
pub mod config;
pub mod credential;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{aggregate, JobTiming};
pub use cleanup::cleanup_job;
pub use config::{CredentialPolicy, PipelineConfig, PipelineConfigBuilder, ToolPaths};
pub use credential::{admit_credential, Credential};
pub use error::{EncodeError, InferenceError, PipelineError};
pub use output::{
    AggregatedResult, DocumentMetadata, JobSummary, MetadataValue, OutputFormat, PageOutcome,
    PagePayload, PageStatus, RasterPage, SourceType,
};
pub use pipeline::inference::{DryRunModel, ModelReply, OpenAiCompatModel, VisionModel, VisionRequest};
pub use pipeline::tool::tool_available;
pub use process::{process_document, InputKind, ProcessingRequest};
pub use progress::{NoopObserver, PipelineObserver, SharedObserver, Stage};
