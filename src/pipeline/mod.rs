//! Pipeline stages for ESG-report-to-spreadsheet extraction.
//!
//! Each submodule implements one step and can be tested on its own. The
//! two network-facing stages sit behind traits ([`parser::ParsingService`],
//! [`classify::Classifier`]) so the rest runs against fakes.
//!
//! ## Data Flow
//!
//! ```text
//! parser ──▶ poll ──▶ parser ──▶ segment ──▶ classify ──▶ export
//! (upload)   (wait)   (fetch)    (chunk)     (LLM rows)   (xlsx/csv)
//! ```
//!
//! 1. [`parser`]   — submit the PDF, later fetch its parsed Markdown
//! 2. [`poll`]     — wait for the parsing job with bounded time and retries
//! 3. [`segment`]  — lossless split into model-sized chunks
//! 4. [`classify`] — concurrent model calls, response → [`crate::model::ExtractedRow`]s
//! 5. [`postprocess`] — text cleanup shared by the classifier
//! 6. [`export`]   — atomic spreadsheet write

pub mod classify;
pub mod export;
pub mod parser;
pub mod poll;
pub mod postprocess;
pub mod segment;
