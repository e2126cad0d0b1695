//! Per-document entry point: one PDF in, one spreadsheet out.
//!
//! [`process_document`] drives a document through every stage in order and
//! tracks its [`PipelineStage`]. Any fatal error moves the document to
//! `Failed` and is returned as is; nothing is written in that case because
//! export is the last step.

use crate::config::PipelineConfig;
use crate::error::Esg2SheetError;
use crate::model::{PipelineStage, ReportStats, ReportTable, Segment};
use crate::pipeline::classify::{classify_segments, Classifier};
use crate::pipeline::parser::{fetch_document, submit_document, ParsingService};
use crate::pipeline::poll::{wait_for_completion, PollSettings};
use crate::pipeline::{export, segment};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// What a successfully exported document produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub job_id: String,
    /// Number of segments the document was split into.
    pub segments: usize,
    /// Segments whose model response could not be parsed.
    pub skipped_segments: usize,
    pub stats: ReportStats,
    pub duration_ms: u64,
}

impl DocumentSummary {
    pub fn parsed_segments(&self) -> usize {
        self.segments - self.skipped_segments
    }
}

/// Run the full pipeline for one document.
///
/// # Errors
/// The first fatal error of any stage. Segment parse failures are not
/// fatal; they show up as `skipped_segments`.
pub async fn process_document(
    parser: &dyn ParsingService,
    classifier: &dyn Classifier,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
) -> Result<DocumentSummary, Esg2SheetError> {
    let label = document_label(input);
    let mut tracker = StageTracker::new(&label, config);

    let result = run_stages(parser, classifier, input, output, config, &mut tracker).await;
    if let Err(ref e) = result {
        error!(
            "{}: failed while {} ({}): {}",
            label,
            tracker.stage,
            e.kind(),
            e
        );
        tracker.advance(PipelineStage::Failed);
    }
    result
}

async fn run_stages(
    parser: &dyn ParsingService,
    classifier: &dyn Classifier,
    input: &Path,
    output: &Path,
    config: &PipelineConfig,
    tracker: &mut StageTracker<'_>,
) -> Result<DocumentSummary, Esg2SheetError> {
    let start = Instant::now();
    let label = tracker.document;

    // ── Step 1: Submit ───────────────────────────────────────────────────
    let mut job = submit_document(parser, input).await?;
    tracker.advance(PipelineStage::Submitted);

    // ── Step 2: Wait for the parsing job ─────────────────────────────────
    tracker.advance(PipelineStage::Polling);
    wait_for_completion(parser, &mut job, PollSettings::from(config)).await?;

    // ── Step 3: Fetch parsed text ────────────────────────────────────────
    let document = fetch_document(parser, &job).await?;
    tracker.advance(PipelineStage::Parsed);
    info!(
        "{}: fetched {} chars from job {}",
        label,
        document.raw_text.chars().count(),
        job.job_id
    );

    // ── Step 4: Segment ──────────────────────────────────────────────────
    tracker.advance(PipelineStage::Segmenting);
    let segments: Vec<Segment> =
        segment::segment(&document.raw_text, config.max_segment_chars).collect();
    info!("{}: {} segments", label, segments.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_segments_ready(label, segments.len());
    }

    // ── Step 5: Classify ─────────────────────────────────────────────────
    tracker.advance(PipelineStage::Classifying);
    let outcomes = classify_segments(classifier, &segments, config, label).await?;
    let skipped = outcomes.iter().filter(|o| o.result.is_err()).count();
    if skipped > 0 {
        warn!(
            "{}: {}/{} segments skipped as unparseable",
            label,
            skipped,
            segments.len()
        );
    }

    // ── Step 6: Aggregate ────────────────────────────────────────────────
    let mut table = ReportTable::from_outcomes(outcomes);
    if config.dedup {
        let before = table.len();
        table.dedup();
        debug!("{}: dedup removed {} rows", label, before - table.len());
    }
    let stats = table.stats();

    // ── Step 7: Export ───────────────────────────────────────────────────
    let format = config.format_for(output);
    let out = output.to_path_buf();
    tokio::task::spawn_blocking(move || export::write_table(&table, &out, format))
        .await
        .map_err(|e| Esg2SheetError::Export {
            path: output.to_path_buf(),
            reason: format!("export task panicked: {e}"),
        })??;
    tracker.advance(PipelineStage::Exported);

    let summary = DocumentSummary {
        input: input.to_path_buf(),
        output: output.to_path_buf(),
        job_id: job.job_id,
        segments: segments.len(),
        skipped_segments: skipped,
        stats,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "{}: {} rows ({} with data) across {} sections, {} source types, {} items; segments {}/{} parsed; {}ms",
        label,
        stats.total_rows,
        stats.rows_with_data,
        stats.sections,
        stats.source_types,
        stats.distinct_items,
        summary.parsed_segments(),
        summary.segments,
        summary.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_complete(label, stats.total_rows);
    }
    Ok(summary)
}

/// File name of `input`, used to label logs and progress events.
pub(crate) fn document_label(input: &Path) -> String {
    input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| input.display().to_string())
}

/// Current stage of one document; reports each transition.
struct StageTracker<'a> {
    document: &'a str,
    stage: PipelineStage,
    config: &'a PipelineConfig,
}

impl<'a> StageTracker<'a> {
    fn new(document: &'a str, config: &'a PipelineConfig) -> Self {
        Self {
            document,
            stage: PipelineStage::Created,
            config,
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        if !self.stage.can_advance_to(next) {
            warn!(
                "{}: ignoring illegal transition {} → {}",
                self.document, self.stage, next
            );
            return;
        }
        debug!("{}: {} → {}", self.document, self.stage, next);
        self.stage = next;
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(self.document, next);
        }
    }
}
