//! CLI binary for pagescan.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`,
//! stages the input in a fresh job directory, and prints the aggregated
//! result as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pagescan::{
    admit_credential, process_document, tool_available, CredentialPolicy, DryRunModel,
    OutputFormat, PageStatus, PipelineConfig, PipelineObserver, ProcessingRequest, Stage,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress observer ────────────────────────────────────────────────────

/// Renders stage changes as a spinner and the main pass as a progress bar.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage(&self, _job_id: &str, stage: Stage) {
        if stage != Stage::MainPass {
            self.bar.set_message(stage.to_string());
        }
    }

    fn on_job_start(&self, _job_id: &str, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Scanning");
    }

    fn on_page_complete(&self, _job_id: &str, page_number: usize, status: PageStatus) {
        let mark = if status.is_success() { green("✓") } else { red("✗") };
        self.bar
            .println(format!("  {} Page {:>3}  {}", mark, page_number, dim(&status.to_string())));
        self.bar.inc(1);
    }

    fn on_warning(&self, _job_id: &str, message: &str) {
        self.bar.println(format!("  {} {}", bold("!"), message));
    }

    fn on_job_complete(&self, _job_id: &str, successful: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} pages processed", green("✔"), bold(&successful.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} failed)",
                red("✘"),
                bold(&successful.to_string()),
                successful + failed,
                red(&failed.to_string())
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract structured data from an office document
  pagescan invoice.docx --prompt "List the invoice number and line items"

  # Plain-text replies, saved to a file
  pagescan slides.pptx --prompt-file prompt.txt --format text -o slides.json

  # Summarise the first pages first and feed that context to every page
  pagescan contract.pdf --prompt "Extract every party and date" --context-pass

  # Exercise the tool chain without calling a model
  pagescan report.odt --prompt "anything" --dry-run

  # Check that the external tools are installed
  pagescan --check-tools

ENVIRONMENT VARIABLES:
  LLM_API_KEY           Bearer credential for the endpoint
  LLM_BASE_URL          OpenAI-compatible endpoint root
  LLM_MODEL             Vision model id
  MAX_WORKERS           Concurrent page calls
  PROCESS_TIMEOUT       Per-page inference timeout (seconds)
  LIBREOFFICE_COMMAND   Document-to-PDF converter
  PDFTOPPM_COMMAND      PDF rasterizer
  PDFINFO_COMMAND       PDF metadata reader
  TEMP_DIR_BASE         Root for job working directories
"#;

/// Extract structured per-page data from documents with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pagescan",
    version,
    about = "Extract structured per-page data from documents with a vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to process (office format, PDF, or page image).
    #[arg(required_unless_present = "check_tools")]
    input: Option<PathBuf>,

    /// Instruction sent with every page.
    #[arg(short, long, conflicts_with = "prompt_file")]
    prompt: Option<String>,

    /// Read the instruction from a file.
    #[arg(long)]
    prompt_file: Option<PathBuf>,

    /// Reply format: json or text.
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Run the context pre-pass over the first pages.
    #[arg(long)]
    context_pass: bool,

    /// Answer every page with a canned reply instead of calling the model.
    #[arg(long)]
    dry_run: bool,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Bearer credential for the endpoint.
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// What to do without a credential: strict or permissive.
    #[arg(long, env = "CREDENTIAL_POLICY", default_value = "strict")]
    credential_policy: CredentialPolicy,

    /// OpenAI-compatible endpoint root.
    #[arg(long, env = "LLM_BASE_URL")]
    base_url: Option<String>,

    /// Vision model id.
    #[arg(long, env = "LLM_MODEL")]
    model: Option<String>,

    /// Concurrent page calls.
    #[arg(short, long, env = "MAX_WORKERS", default_value_t = 5)]
    concurrency: usize,

    /// Per-page inference timeout in seconds.
    #[arg(long, env = "PROCESS_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// Document-to-PDF converter.
    #[arg(long, env = "LIBREOFFICE_COMMAND", default_value = "libreoffice")]
    converter: String,

    /// PDF rasterizer.
    #[arg(long, env = "PDFTOPPM_COMMAND", default_value = "pdftoppm")]
    rasterizer: String,

    /// PDF metadata reader.
    #[arg(long, env = "PDFINFO_COMMAND", default_value = "pdfinfo")]
    metadata_reader: String,

    /// Root for job working directories.
    #[arg(long, env = "TEMP_DIR_BASE", default_value = "/tmp/pagescan")]
    work_root: PathBuf,

    /// Report which external tools are installed, then exit.
    #[arg(long)]
    check_tools: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.check_tools;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli, show_progress)?;

    // ── Tool check ───────────────────────────────────────────────────────
    if cli.check_tools {
        let mut missing = 0;
        for (role, command) in config.tools.iter() {
            match tool_available(command) {
                Some(path) => println!("{:<11} {}  {}", role, green("available"), dim(&path.display().to_string())),
                None => {
                    missing += 1;
                    println!("{:<11} {}  {}", role, red("missing"), command);
                }
            }
        }
        if missing > 0 {
            anyhow::bail!("{missing} required tool(s) missing");
        }
        return Ok(());
    }

    let input = cli
        .input
        .as_deref()
        .context("An input document is required")?;
    let prompt = read_prompt(&cli).await?;

    // ── Admission ────────────────────────────────────────────────────────
    let credential = admit_credential(&config, cli.api_key.as_deref())
        .await
        .context("Credential not accepted")?;

    // ── Stage the input ──────────────────────────────────────────────────
    let job_id = uuid::Uuid::new_v4().to_string();
    let work_dir = config.work_root.join(format!("job_{job_id}"));
    let staged = stage_input(input, &work_dir).await?;

    let request = ProcessingRequest::new(staged, prompt, &work_dir)
        .with_format(cli.format)
        .with_context_pass(cli.context_pass)
        .with_credential(credential)
        .with_job_id(job_id);

    let result = process_document(request, &config)
        .await
        .context("Processing failed")?;

    let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
    match cli.output {
        Some(ref path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("→ {}", bold(&path.display().to_string()));
            }
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, show_progress: bool) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .api_timeout_secs(cli.api_timeout)
        .converter(&cli.converter)
        .rasterizer(&cli.rasterizer)
        .metadata_reader(&cli.metadata_reader)
        .work_root(&cli.work_root)
        .credential_policy(cli.credential_policy);

    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if cli.dry_run {
        builder = builder
            .model_client(Arc::new(DryRunModel))
            .credential_policy(CredentialPolicy::Permissive);
    }
    if show_progress {
        builder = builder.observer(CliObserver::new());
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(cli: &Cli) -> Result<String> {
    let prompt = match (&cli.prompt, &cli.prompt_file) {
        (Some(p), _) => p.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {}", path.display()))?,
        (None, None) => anyhow::bail!("One of --prompt or --prompt-file is required"),
    };
    if prompt.trim().is_empty() {
        anyhow::bail!("The prompt is empty");
    }
    Ok(prompt)
}

/// Copy `input` into `<work_dir>/upload/`; the pipeline deletes its input.
///
/// On failure `work_dir` is removed again, since no pipeline run will
/// clean it up.
async fn stage_input(input: &Path, work_dir: &Path) -> Result<PathBuf> {
    let name = input
        .file_name()
        .with_context(|| format!("Not a file path: {}", input.display()))?;
    let upload = work_dir.join("upload");
    tokio::fs::create_dir_all(&upload)
        .await
        .with_context(|| format!("Failed to create {}", upload.display()))?;
    let staged = upload.join(name);
    match tokio::fs::copy(input, &staged).await {
        Ok(_) => Ok(staged),
        Err(e) => {
            let _ = tokio::fs::remove_dir_all(work_dir).await;
            Err(e).with_context(|| format!("Failed to copy {}", input.display()))
        }
    }
}
