//! Data model shared by every pipeline stage.
//!
//! ```text
//! Job ──▶ ParsedDocument ──▶ Segment* ──▶ SegmentOutcome* ──▶ ReportTable
//! ```
//!
//! A [`Job`] is the parsing service's unit of work. Once it reaches
//! [`JobStatus::Succeeded`] the fetched text becomes an immutable
//! [`ParsedDocument`], which the segmenter splits into ordered [`Segment`]s.
//! Each segment is classified independently into [`ExtractedRow`]s and the
//! per-segment outcomes are concatenated in segment order into the
//! [`ReportTable`] that lands in the spreadsheet.

use crate::error::SegmentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ── Job ──────────────────────────────────────────────────────────────────

/// Status of an asynchronous parsing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// States from which no further transition occurs.
    pub const TERMINAL: [JobStatus; 2] = [JobStatus::Succeeded, JobStatus::Failed];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Map a vendor status string onto the status enum.
    ///
    /// Matching is case-insensitive. Returns `None` for strings the
    /// service is not documented to send.
    pub fn from_vendor(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => Some(Self::Pending),
            "RUNNING" | "PROCESSING" | "IN_PROGRESS" => Some(Self::Running),
            "SUCCESS" | "SUCCEEDED" | "COMPLETED" => Some(Self::Succeeded),
            "ERROR" | "FAILED" | "CANCELED" | "CANCELLED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One answer from a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Error text reported by the service for failed jobs.
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// A submitted parsing job.
///
/// Created by the submitter in `Pending` state; only the poller advances it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    /// Service-supplied reason when the job ended in `Failed`.
    pub failure_reason: Option<String>,
}

impl Job {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            submitted_at: Utc::now(),
            failure_reason: None,
        }
    }

    /// Record a status report. Reports arriving after a terminal state
    /// are ignored.
    pub fn observe(&mut self, report: StatusReport) {
        if self.status.is_terminal() {
            return;
        }
        self.status = report.status;
        if report.status == JobStatus::Failed {
            self.failure_reason = report.error;
        }
    }
}

// ── Document & segments ─────────────────────────────────────────────────

/// Text retrieved from a succeeded job. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub job_id: String,
    pub raw_text: String,
    pub retrieved_at: DateTime<Utc>,
}

impl ParsedDocument {
    pub fn new(job_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            raw_text: raw_text.into(),
            retrieved_at: Utc::now(),
        }
    }
}

/// A bounded chunk of document text sized for one classification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// 0-based position in the document.
    pub index: usize,
    pub text: String,
}

// ── Rows ─────────────────────────────────────────────────────────────────

/// Report chapter a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Foreword, chairman's letter, about this report, appendix.
    Overview,
    /// Sustainability management, corporate governance, economic performance.
    Governance,
    Environment,
    Social,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Overview,
        Section::Governance,
        Section::Environment,
        Section::Social,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Governance => "governance",
            Self::Environment => "environment",
            Self::Social => "social",
        }
    }

    /// Parse a label as written by the model, including the chapter names
    /// used in Traditional Chinese reports.
    pub fn parse(label: &str) -> Option<Self> {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "overview" | "introduction" | "appendix" | "導言" | "附錄" => Some(Self::Overview),
            "governance" | "sustainability management" | "實踐永續管理" | "營運與治理" => {
                Some(Self::Governance)
            }
            "environment" | "environmental" | "環境永續" => Some(Self::Environment),
            "social" | "society" | "社會共融" => Some(Self::Social),
            _ => None,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where on the page a row's information came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Summary,
    Body,
    Chart,
    Note,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Summary,
        SourceType::Body,
        SourceType::Chart,
        SourceType::Note,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Body => "body",
            Self::Chart => "chart",
            Self::Note => "note",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "summary" | "摘要" => Some(Self::Summary),
            "body" | "text" | "內文" => Some(Self::Body),
            "chart" | "table" | "figure" | "圖表" => Some(Self::Chart),
            "note" | "footnote" | "註釋" => Some(Self::Note),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One classified record: (section, source type, item, data).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractedRow {
    pub section: Section,
    pub source_type: SourceType,
    pub item: String,
    /// Figures, units and dates; empty when the item has no data.
    pub data: String,
}

impl ExtractedRow {
    pub fn new(
        section: Section,
        source_type: SourceType,
        item: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            section,
            source_type,
            item: item.into(),
            data: data.into(),
        }
    }
}

/// Tagged per-segment classification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentOutcome {
    pub index: usize,
    pub result: Result<Vec<ExtractedRow>, SegmentError>,
}

impl SegmentOutcome {
    pub fn rows(&self) -> &[ExtractedRow] {
        match &self.result {
            Ok(rows) => rows,
            Err(_) => &[],
        }
    }
}

// ── Report table ─────────────────────────────────────────────────────────

/// Final ordered collection of rows written to the spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTable {
    pub rows: Vec<ExtractedRow>,
}

impl ReportTable {
    /// Concatenate per-segment rows in ascending segment index, whatever
    /// order the outcomes arrived in. Failed segments contribute nothing.
    pub fn from_outcomes(mut outcomes: Vec<SegmentOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let rows = outcomes
            .into_iter()
            .filter_map(|o| o.result.ok())
            .flatten()
            .collect();
        Self { rows }
    }

    /// Drop exact duplicate rows, keeping the first occurrence.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::new();
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stats(&self) -> ReportStats {
        let sections: HashSet<_> = self.rows.iter().map(|r| r.section).collect();
        let sources: HashSet<_> = self.rows.iter().map(|r| r.source_type).collect();
        let items: HashSet<_> = self.rows.iter().map(|r| r.item.as_str()).collect();
        ReportStats {
            sections: sections.len(),
            source_types: sources.len(),
            distinct_items: items.len(),
            rows_with_data: self.rows.iter().filter(|r| !r.data.is_empty()).count(),
            total_rows: self.rows.len(),
        }
    }
}

/// Summary counts logged after export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub sections: usize,
    pub source_types: usize,
    pub distinct_items: usize,
    pub rows_with_data: usize,
    pub total_rows: usize,
}

// ── Pipeline state ──────────────────────────────────────────────────────

/// Per-document pipeline state.
///
/// ```text
/// created → submitted → polling → parsed → segmenting → classifying → exported
///     └──────────┴──────────┴────────┴──────────┴────────────┴──▶ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    Submitted,
    Polling,
    Parsed,
    Segmenting,
    Classifying,
    Exported,
    Failed,
}

impl PipelineStage {
    /// The next state on the success path, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::Submitted),
            Self::Submitted => Some(Self::Polling),
            Self::Polling => Some(Self::Parsed),
            Self::Parsed => Some(Self::Segmenting),
            Self::Segmenting => Some(Self::Classifying),
            Self::Classifying => Some(Self::Exported),
            Self::Exported | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exported | Self::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || self.successor() == Some(next)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Parsed => "parsed",
            Self::Segmenting => "segmenting",
            Self::Classifying => "classifying",
            Self::Exported => "exported",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(item: &str) -> ExtractedRow {
        ExtractedRow::new(Section::Environment, SourceType::Chart, item, "1")
    }

    #[test]
    fn vendor_status_mapping() {
        assert_eq!(JobStatus::from_vendor("SUCCESS"), Some(JobStatus::Succeeded));
        assert_eq!(JobStatus::from_vendor("completed"), Some(JobStatus::Succeeded));
        assert_eq!(JobStatus::from_vendor("PENDING"), Some(JobStatus::Pending));
        assert_eq!(JobStatus::from_vendor("processing"), Some(JobStatus::Running));
        assert_eq!(JobStatus::from_vendor("CANCELED"), Some(JobStatus::Failed));
        assert_eq!(JobStatus::from_vendor("bogus"), None);
    }

    #[test]
    fn terminal_set() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_ignores_reports_after_terminal() {
        let mut job = Job::new("j1");
        job.observe(StatusReport::new(JobStatus::Running));
        job.observe(StatusReport::failed("bad pdf"));
        job.observe(StatusReport::new(JobStatus::Succeeded));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("bad pdf"));
    }

    #[test]
    fn section_labels_accept_chinese_chapter_names() {
        assert_eq!(Section::parse("環境永續"), Some(Section::Environment));
        assert_eq!(Section::parse("營運與治理"), Some(Section::Governance));
        assert_eq!(Section::parse(" Social "), Some(Section::Social));
        assert_eq!(Section::parse("finance"), None);
        assert_eq!(SourceType::parse("圖表"), Some(SourceType::Chart));
        assert_eq!(SourceType::parse("NOTE"), Some(SourceType::Note));
    }

    #[test]
    fn table_orders_by_segment_index() {
        let outcomes = vec![
            SegmentOutcome {
                index: 2,
                result: Ok(vec![row("c")]),
            },
            SegmentOutcome {
                index: 0,
                result: Ok(vec![row("a1"), row("a2")]),
            },
            SegmentOutcome {
                index: 1,
                result: Err(SegmentError::Parse {
                    segment: 1,
                    detail: "junk".into(),
                }),
            },
        ];
        let table = ReportTable::from_outcomes(outcomes);
        let items: Vec<_> = table.rows.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["a1", "a2", "c"]);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let mut table = ReportTable {
            rows: vec![row("a"), row("b"), row("a")],
        };
        table.dedup();
        let items: Vec<_> = table.rows.iter().map(|r| r.item.as_str()).collect();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[test]
    fn stats_counts() {
        let table = ReportTable {
            rows: vec![
                row("a"),
                ExtractedRow::new(Section::Social, SourceType::Body, "b", ""),
                row("a"),
            ],
        };
        let s = table.stats();
        assert_eq!(s.sections, 2);
        assert_eq!(s.source_types, 2);
        assert_eq!(s.distinct_items, 2);
        assert_eq!(s.rows_with_data, 2);
        assert_eq!(s.total_rows, 3);
    }

    #[test]
    fn stage_transitions() {
        assert!(PipelineStage::Created.can_advance_to(PipelineStage::Submitted));
        assert!(PipelineStage::Polling.can_advance_to(PipelineStage::Failed));
        assert!(!PipelineStage::Created.can_advance_to(PipelineStage::Parsed));
        assert!(!PipelineStage::Failed.can_advance_to(PipelineStage::Created));
        assert!(!PipelineStage::Exported.can_advance_to(PipelineStage::Failed));
    }
}
