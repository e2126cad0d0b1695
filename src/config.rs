//! Configuration types for ESG report extraction.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built
//! via its [`PipelineConfigBuilder`]. One struct is shared by every document
//! of a batch, so it is cheap to clone (the provider and progress callback
//! are behind `Arc`).

use crate::error::Esg2SheetError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Default parsing-service endpoint.
pub const DEFAULT_PARSER_BASE_URL: &str = "https://api.cloud.llamaindex.ai/api/parsing";

/// Configuration for one or more document runs.
///
/// # Example
/// ```rust
/// use esg2sheet::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .check_interval_secs(5)
///     .timeout_secs(300)
///     .max_segment_chars(4000)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Seconds to wait before each job status query. Default: 10.
    pub check_interval_secs: u64,

    /// Give up on a parsing job after this many seconds. Default: 600.
    ///
    /// Large reports (200+ pages with charts) routinely take 3–5 minutes on
    /// the hosted parser.
    pub timeout_secs: u64,

    /// Consecutive failed status queries tolerated before polling aborts.
    /// Default: 3.
    pub max_poll_failures: u32,

    /// Maximum characters per classification segment. Default: 6000.
    ///
    /// Roughly two report pages. Larger segments save calls but the model
    /// starts skipping metrics buried in the middle of long prompts.
    pub max_segment_chars: usize,

    /// Concurrent classification calls per document. Default: 4.
    pub concurrency: usize,

    /// Documents processed concurrently in batch mode. Default: 2.
    pub batch_concurrency: usize,

    /// LLM model identifier. Default: "gpt-4o".
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the model may generate per segment. Default: 4096.
    pub max_tokens: usize,

    /// Custom extraction instruction. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Drop exact duplicate rows before export. Default: false.
    pub dedup: bool,

    /// Output format. If None, chosen from the output file extension.
    pub output_format: Option<OutputFormat>,

    /// Parsing-service base URL.
    pub parser_base_url: String,

    /// Per-request HTTP timeout for the parsing service, in seconds.
    /// Default: 120.
    ///
    /// Bounds the upload and the content download; a stalled call fails
    /// its stage instead of hanging the document.
    pub request_timeout_secs: u64,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 10,
            timeout_secs: 600,
            max_poll_failures: 3,
            max_segment_chars: 6000,
            concurrency: 4,
            batch_concurrency: 2,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            system_prompt: None,
            dedup: false,
            output_format: None,
            parser_base_url: DEFAULT_PARSER_BASE_URL.to_string(),
            request_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("check_interval_secs", &self.check_interval_secs)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_poll_failures", &self.max_poll_failures)
            .field("max_segment_chars", &self.max_segment_chars)
            .field("concurrency", &self.concurrency)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("dedup", &self.dedup)
            .field("output_format", &self.output_format)
            .field("parser_base_url", &self.parser_base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
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

    /// Output format for `path`: the configured one, else by extension.
    pub fn format_for(&self, path: &Path) -> OutputFormat {
        self.output_format
            .unwrap_or_else(|| OutputFormat::from_path(path))
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn check_interval_secs(mut self, secs: u64) -> Self {
        self.config.check_interval_secs = secs;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_poll_failures(mut self, n: u32) -> Self {
        self.config.max_poll_failures = n;
        self
    }

    pub fn max_segment_chars(mut self, n: usize) -> Self {
        self.config.max_segment_chars = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn dedup(mut self, v: bool) -> Self {
        self.config.dedup = v;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = Some(format);
        self
    }

    pub fn parser_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.parser_base_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Esg2SheetError> {
        let c = &self.config;
        if c.check_interval_secs == 0 {
            return Err(Esg2SheetError::InvalidConfig(
                "check interval must be ≥ 1 second".into(),
            ));
        }
        if c.timeout_secs < c.check_interval_secs {
            return Err(Esg2SheetError::InvalidConfig(format!(
                "timeout ({}s) must be at least the check interval ({}s)",
                c.timeout_secs, c.check_interval_secs
            )));
        }
        if c.max_segment_chars == 0 {
            return Err(Esg2SheetError::InvalidConfig(
                "segment size must be ≥ 1 character".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(Esg2SheetError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.parser_base_url.trim().is_empty() {
            return Err(Esg2SheetError::InvalidConfig(
                "parser base URL is empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Spreadsheet file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Excel workbook with header styling and column widths. (default)
    #[default]
    Xlsx,
    /// Plain comma-separated values.
    Csv,
}

impl OutputFormat {
    /// `.csv` (any case) → CSV, anything else → XLSX.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Xlsx,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Xlsx => "xlsx",
            Self::Csv => "csv",
        }
    }
}
