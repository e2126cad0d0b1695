//! Classification: prompt the model per segment and parse its rows.
//!
//! The model is reached through the [`Classifier`] trait, an opaque
//! `classify(instruction, text) -> text` call. [`LlmClassifier`] backs it
//! with an `edgequake_llm` provider; tests use scripted fakes.
//!
//! ## Failure policy
//!
//! * Transport or API failure → [`Esg2SheetError::Classification`]; the
//!   document aborts. Calls already in flight are allowed to finish but no
//!   new segment is started. There is no retry.
//! * A response that breaks the row grammar → [`SegmentError::Parse`]
//!   stored in the segment's [`SegmentOutcome`]; logged and skipped.
//!
//! ## Row grammar
//!
//! After [`postprocess::clean_response`], every non-blank line must be a
//! pipe row. The header row (first cell `section`) and separator rows are
//! skipped. Each remaining row needs exactly four cells: a known section
//! label, a known source-type label, a non-empty item and a data cell
//! (`null`, `none`, `n/a` and `-` mean "no data"). Any violation rejects
//! the whole response; missing fields are never filled in.

use crate::config::PipelineConfig;
use crate::error::{Esg2SheetError, SegmentError, ServiceError};
use crate::model::{ExtractedRow, Section, Segment, SegmentOutcome, SourceType};
use crate::pipeline::postprocess;
use crate::prompts::{segment_message, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const NO_DATA: [&str; 4] = ["null", "none", "n/a", "-"];

/// Capability interface over the classification model.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Send the instruction and user text, return the model's raw answer.
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, ServiceError>;
}

/// [`Classifier`] backed by an `edgequake_llm` provider.
pub struct LlmClassifier {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
        }
    }

    /// Resolve the provider from `config` and the environment.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, Esg2SheetError> {
        Ok(Self::new(resolve_provider(config)?, config))
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, instruction: &str, text: &str) -> Result<String, ServiceError> {
        let messages = vec![ChatMessage::system(instruction), ChatMessage::user(text)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        debug!(
            "{} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Build `CompletionOptions` from the pipeline config.
fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Esg2SheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Esg2SheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is.
/// 2. `config.provider_name` + `config.model` (default [`DEFAULT_MODEL`]).
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI, when `OPENAI_API_KEY` is set.
/// 5. `ProviderFactory::from_env` auto-detection.
pub fn resolve_provider(config: &PipelineConfig) -> Result<Arc<dyn LLMProvider>, Esg2SheetError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Esg2SheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

// ── Row grammar ──────────────────────────────────────────────────────────

/// Parse a model response into rows, or reject it as a whole.
pub fn parse_rows(segment: usize, response: &str) -> Result<Vec<ExtractedRow>, SegmentError> {
    let reject = |line_no: usize, detail: String| SegmentError::Parse {
        segment,
        detail: format!("line {}: {}", line_no + 1, detail),
    };

    let cleaned = postprocess::clean_response(response);
    let mut rows = Vec::new();

    for (line_no, line) in cleaned.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || postprocess::is_separator_row(line) {
            continue;
        }
        if !postprocess::is_table_row(line) {
            return Err(reject(line_no, format!("not a table row: {:?}", truncate(line))));
        }

        let cells = postprocess::split_cells(line);
        if cells.len() != 4 {
            return Err(reject(
                line_no,
                format!("expected 4 cells, found {}", cells.len()),
            ));
        }
        if cells[0].eq_ignore_ascii_case("section") {
            continue;
        }

        let section = Section::parse(&cells[0])
            .ok_or_else(|| reject(line_no, format!("unknown section '{}'", cells[0])))?;
        let source_type = SourceType::parse(&cells[1])
            .ok_or_else(|| reject(line_no, format!("unknown source type '{}'", cells[1])))?;
        if cells[2].is_empty() {
            return Err(reject(line_no, "empty item".to_string()));
        }
        let data = if NO_DATA.iter().any(|n| cells[3].eq_ignore_ascii_case(n)) {
            String::new()
        } else {
            cells[3].clone()
        };

        rows.push(ExtractedRow::new(section, source_type, cells[2].clone(), data));
    }

    Ok(rows)
}

fn truncate(line: &str) -> String {
    const MAX: usize = 60;
    if line.chars().count() > MAX {
        let head: String = line.chars().take(MAX - 1).collect();
        format!("{head}\u{2026}")
    } else {
        line.to_string()
    }
}

// ── Stage functions ──────────────────────────────────────────────────────

/// Classify one segment.
///
/// Returns `Ok` with a tagged outcome whether or not the response parsed;
/// `Err` only when the model call itself failed.
pub async fn classify_segment(
    classifier: &dyn Classifier,
    segment: &Segment,
    instruction: &str,
) -> Result<SegmentOutcome, Esg2SheetError> {
    let start = Instant::now();
    let text = postprocess::clean_segment_text(&segment.text);
    if text.is_empty() {
        debug!("Segment {}: blank, skipping model call", segment.index);
        return Ok(SegmentOutcome {
            index: segment.index,
            result: Ok(Vec::new()),
        });
    }

    let user = segment_message(segment.index + 1, &text);
    let response = classifier
        .classify(instruction, &user)
        .await
        .map_err(|e| Esg2SheetError::Classification {
            segment: segment.index,
            reason: e.to_string(),
        })?;

    let result = parse_rows(segment.index, &response);
    match &result {
        Ok(rows) => debug!(
            "Segment {}: {} rows in {:?}",
            segment.index,
            rows.len(),
            start.elapsed()
        ),
        Err(e) => warn!("{}; segment skipped", e),
    }

    Ok(SegmentOutcome {
        index: segment.index,
        result,
    })
}

/// Classify every segment of a document with up to `config.concurrency`
/// calls in flight.
///
/// Outcomes come back in completion order; [`crate::model::ReportTable`]
/// restores segment order. On the first fatal error no further segment is
/// started, in-flight calls run to completion, and that error is returned.
pub async fn classify_segments(
    classifier: &dyn Classifier,
    segments: &[Segment],
    config: &PipelineConfig,
    document: &str,
) -> Result<Vec<SegmentOutcome>, Esg2SheetError> {
    let instruction = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);
    let total = segments.len();
    let aborted = AtomicBool::new(false);

    let results: Vec<Option<Result<SegmentOutcome, Esg2SheetError>>> =
        stream::iter(segments.iter().map(|segment| {
            let aborted = &aborted;
            async move {
                if aborted.load(Ordering::SeqCst) {
                    return None;
                }
                let result = classify_segment(classifier, segment, instruction).await;
                if let Some(ref cb) = config.progress_callback {
                    match &result {
                        Ok(SegmentOutcome { result: Ok(rows), .. }) => {
                            cb.on_segment_complete(document, segment.index, total, rows.len())
                        }
                        Ok(SegmentOutcome { result: Err(e), .. }) => {
                            cb.on_segment_error(document, segment.index, total, &e.to_string())
                        }
                        Err(_) => {}
                    }
                }
                if result.is_err() {
                    aborted.store(true, Ordering::SeqCst);
                }
                Some(result)
            }
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut outcomes = Vec::with_capacity(total);
    let mut first_error = None;
    for result in results.into_iter().flatten() {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(outcomes),
    }
}
