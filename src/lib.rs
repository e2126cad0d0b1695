//! # esg2sheet
//!
//! Turn corporate ESG / sustainability report PDFs into a four-column
//! spreadsheet of classified facts.
//!
//! A report is parsed to Markdown by a hosted parsing service
//! (LlamaParse), split into model-sized segments, and each segment is sent
//! to an LLM that returns one row per ESG fact: which **section** it belongs
//! to (overview, governance, environment, social), where in the report it
//! came from (**source type**: summary, body, chart, note), the **item**
//! and its **data**. Rows are collected in document order and written to
//! `.xlsx` or `.csv`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Submit    upload to the parsing service, get a job id
//!  ├─ 2. Poll      wait for the job (interval, timeout, retry bound)
//!  ├─ 3. Fetch     retrieve parsed Markdown once
//!  ├─ 4. Segment   lossless, deterministic chunking
//!  ├─ 5. Classify  concurrent LLM calls → ExtractedRow per fact
//!  └─ 6. Export    ordered ReportTable → spreadsheet (atomic write)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use esg2sheet::{process_document, LlamaParseClient, LlmClassifier, PipelineConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().timeout_secs(900).build()?;
//!     // Reads LLAMA_PARSE_API_KEY; the model provider is auto-detected.
//!     let parser = LlamaParseClient::from_env(&config)?;
//!     let classifier = LlmClassifier::from_config(&config)?;
//!
//!     let summary = process_document(
//!         &parser,
//!         &classifier,
//!         Path::new("report-2023.pdf"),
//!         Path::new("report-2023.xlsx"),
//!         &config,
//!     )
//!     .await?;
//!     eprintln!("{} rows", summary.stats.total_rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `esg2sheet` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! esg2sheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod run;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{collect_pdfs, run_batch, BatchJob, BatchReport, DocumentFailure, DocumentResult};
pub use config::{OutputFormat, PipelineConfig, PipelineConfigBuilder};
pub use error::{ErrorKind, Esg2SheetError, SegmentError, ServiceError};
pub use model::{
    ExtractedRow, Job, JobStatus, ParsedDocument, PipelineStage, ReportStats, ReportTable,
    Section, Segment, SegmentOutcome, SourceType, StatusReport,
};
pub use pipeline::classify::{Classifier, LlmClassifier};
pub use pipeline::parser::{LlamaParseClient, ParsingService};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use run::{process_document, DocumentSummary};
