//! CLI binary for esg2sheet.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one document or a directory of documents and
//! prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use esg2sheet::batch::jobs_for;
use esg2sheet::{
    collect_pdfs, run_batch, BatchJob, BatchReport, LlamaParseClient, LlmClassifier, OutputFormat,
    PipelineConfig, PipelineProgressCallback, PipelineStage, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar over all segments of all documents in flight,
/// plus a log line per stage change and per finished document.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start per document, for the completion line.
    start_times: Mutex<HashMap<String, Instant>>,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} segments  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Parsing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            skipped: AtomicUsize::new(0),
        })
    }

    fn elapsed(&self, document: &str) -> String {
        let secs = self
            .start_times
            .lock()
            .unwrap()
            .remove(document)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        if skipped > 0 {
            eprintln!(
                "{} {} segments skipped (unparseable model output)",
                cyan("⚠"),
                bold(&skipped.to_string())
            );
        }
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage(&self, document: &str, stage: PipelineStage) {
        match stage {
            PipelineStage::Submitted => {
                self.start_times
                    .lock()
                    .unwrap()
                    .insert(document.to_string(), Instant::now());
                self.bar
                    .println(format!("{} {}", cyan("◆"), bold(&format!("Submitted {document}"))));
            }
            PipelineStage::Polling => self.bar.set_message(format!("waiting for {document}")),
            PipelineStage::Classifying => {
                self.bar.set_prefix("Classifying");
                self.bar.set_message(document.to_string());
            }
            PipelineStage::Failed => {
                let elapsed = self.elapsed(document);
                self.bar
                    .println(format!("  {} {}  {}", red("✗"), document, elapsed));
            }
            _ => {}
        }
    }

    fn on_segments_ready(&self, _document: &str, total_segments: usize) {
        self.bar.inc_length(total_segments as u64);
    }

    fn on_segment_complete(&self, _document: &str, _index: usize, _total: usize, _rows: usize) {
        self.bar.inc(1);
    }

    fn on_segment_error(&self, document: &str, index: usize, total: usize, error: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {} segment {:>3}/{:<3}  {}",
            cyan("⚠"),
            document,
            index + 1,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, document: &str, rows: usize) {
        let elapsed = self.elapsed(document);
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("✓"),
            document,
            dim(&format!("{rows:>5} rows")),
            elapsed
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One report to a workbook
  esg2sheet report-2023.pdf -o report-2023.xlsx

  # CSV instead of XLSX
  esg2sheet report-2023.pdf -o report-2023.csv

  # Every PDF in a directory, two at a time, CSV output
  esg2sheet reports/ -o sheets/ --jobs 2 --format csv

  # Slow parsing queue: poll every 30 s, give up after 30 min
  esg2sheet big.pdf --check-interval 30 --timeout 1800

SECTIONS:
  overview      company profile, letters, report scope, appendices
  governance    sustainability management, corporate governance, ethics, risk
  environment   emissions, energy, water, waste, climate
  social        employees, safety, community, supply chain, customers

SOURCE TYPES:
  summary  highlight or executive-summary text
  body     ordinary narrative text
  chart    value read from a table or figure
  note     footnote or remark

ENVIRONMENT VARIABLES:
  LLAMA_PARSE_API_KEY     LlamaParse API key (required)
  OPENAI_API_KEY          OpenAI API key (default classification provider)
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Override log filter

  Variables are also read from a .env file in the working directory.
"#;

/// Extract classified ESG facts from sustainability-report PDFs into a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "esg2sheet",
    version,
    about = "Extract classified ESG facts from sustainability-report PDFs into a spreadsheet",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file, or a directory of PDFs for batch mode.
    input: PathBuf,

    /// Output spreadsheet (single file) or directory (batch mode).
    /// Defaults to the input's name with the output extension, or the
    /// input directory.
    #[arg(short, long, env = "ESG2SHEET_OUTPUT")]
    output: Option<PathBuf>,

    /// Seconds between parsing-job status queries.
    #[arg(long, env = "ESG2SHEET_CHECK_INTERVAL", default_value_t = 10)]
    check_interval: u64,

    /// Seconds to wait for a parsing job before giving up.
    #[arg(long, env = "ESG2SHEET_TIMEOUT", default_value_t = 600)]
    timeout: u64,

    /// Consecutive failed status queries tolerated per job.
    #[arg(long, env = "ESG2SHEET_MAX_POLL_FAILURES", default_value_t = 3)]
    max_poll_failures: u32,

    /// Seconds before a single upload or download request is abandoned.
    #[arg(long, env = "ESG2SHEET_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Maximum characters per classification segment.
    #[arg(long, env = "ESG2SHEET_SEGMENT_CHARS", default_value_t = 6000,
          value_parser = clap::value_parser!(u64).range(1..))]
    segment_chars: u64,

    /// Concurrent classification calls per document.
    #[arg(short, long, env = "ESG2SHEET_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Documents processed at once in batch mode.
    #[arg(long, env = "ESG2SHEET_JOBS", default_value_t = 2)]
    jobs: usize,

    /// LLM model ID (default: gpt-4o).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ESG2SHEET_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per segment.
    #[arg(long, env = "ESG2SHEET_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Path to a text file containing a custom classification prompt.
    #[arg(long, env = "ESG2SHEET_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Drop exact duplicate rows before writing.
    #[arg(long, env = "ESG2SHEET_DEDUP")]
    dedup: bool,

    /// Output format; inferred from the output extension when omitted.
    #[arg(long, env = "ESG2SHEET_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Base URL of the LlamaParse parsing API.
    #[arg(long, env = "LLAMA_PARSE_BASE_URL")]
    parser_url: Option<String>,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "ESG2SHEET_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ESG2SHEET_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ESG2SHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ESG2SHEET_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Xlsx,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Xlsx => OutputFormat::Xlsx,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Build config and services ────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn PipelineProgressCallback>),
    )
    .await?;

    let parser = LlamaParseClient::from_env(&config)
        .context("Parsing service is not configured")?;
    let classifier =
        LlmClassifier::from_config(&config).context("Classification provider is not configured")?;

    let jobs = plan_jobs(&cli)?;
    if jobs.is_empty() {
        anyhow::bail!("No PDF files found in {}", cli.input.display());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = run_batch(jobs, &parser, &classifier, &config).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    }
    if !cli.quiet {
        print_summary(&report);
    }
    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .check_interval_secs(cli.check_interval)
        .timeout_secs(cli.timeout)
        .max_poll_failures(cli.max_poll_failures)
        .request_timeout_secs(cli.request_timeout)
        .max_segment_chars(cli.segment_chars as usize)
        .concurrency(cli.concurrency)
        .batch_concurrency(cli.jobs)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .dedup(cli.dedup);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(format) = cli.format {
        builder = builder.output_format(format.into());
    }
    if let Some(ref url) = cli.parser_url {
        builder = builder.parser_base_url(url);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// One job for a file input, one per PDF for a directory input.
fn plan_jobs(cli: &Cli) -> Result<Vec<BatchJob>> {
    let extension = cli
        .format
        .map(OutputFormat::from)
        .unwrap_or_default()
        .extension();

    if cli.input.is_dir() {
        let pdfs = collect_pdfs(&cli.input)
            .with_context(|| format!("Failed to list {}", cli.input.display()))?;
        let out_dir = cli.output.clone().unwrap_or_else(|| cli.input.clone());
        return Ok(jobs_for(&pdfs, &out_dir, extension));
    }

    let output = match cli.output {
        Some(ref o) => o.clone(),
        None => default_output(&cli.input, extension),
    };
    Ok(vec![BatchJob::new(&cli.input, output)])
}

fn default_output(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

fn print_summary(report: &BatchReport) {
    for summary in report.succeeded() {
        let s = &summary.stats;
        eprintln!(
            "{}  {} rows ({} with data)  {}/{} segments  {}ms  →  {}",
            green("✔"),
            s.total_rows,
            s.rows_with_data,
            summary.parsed_segments(),
            summary.segments,
            summary.duration_ms,
            bold(&summary.output.display().to_string()),
        );
        eprintln!(
            "   {} sections  /  {} source types  /  {} items",
            dim(&s.sections.to_string()),
            dim(&s.source_types.to_string()),
            dim(&s.distinct_items.to_string()),
        );
    }
    for (input, failure) in report.failures() {
        eprintln!(
            "{}  {}  {} at {}: {}",
            red("✘"),
            bold(&input.display().to_string()),
            failure.kind,
            failure.stage,
            failure.message
        );
    }

    let total = report.results.len();
    if total > 1 {
        let ok = report.succeeded().count();
        eprintln!(
            "{} {}/{} documents exported",
            if ok == total { green("◆") } else { cyan("◆") },
            bold(&ok.to_string()),
            total
        );
    }
}
