//! Batch driver: many documents, bounded concurrency, one report.
//!
//! Each document runs through [`process_document`] independently; one
//! document failing never stops the others. The [`BatchReport`] lists
//! results in the order the jobs were given.

use crate::config::PipelineConfig;
use crate::error::{Esg2SheetError, ErrorKind};
use crate::model::PipelineStage;
use crate::pipeline::classify::Classifier;
use crate::pipeline::parser::ParsingService;
use crate::run::{process_document, DocumentSummary};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One document to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl BatchJob {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Why a document did not produce a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub kind: ErrorKind,
    /// Stage the document could not reach.
    pub stage: PipelineStage,
    pub message: String,
}

impl From<&Esg2SheetError> for DocumentFailure {
    fn from(e: &Esg2SheetError) -> Self {
        Self {
            kind: e.kind(),
            stage: e.stage(),
            message: e.to_string(),
        }
    }
}

/// Outcome of one [`BatchJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub outcome: Result<DocumentSummary, DocumentFailure>,
}

/// All results of a batch, in job order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub results: Vec<DocumentResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &DocumentSummary> {
        self.results.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &DocumentFailure)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|f| (r.input.as_path(), f)))
    }

    /// True when every document was exported.
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }
}

/// Process `jobs` with up to `config.batch_concurrency` documents in flight.
pub async fn run_batch(
    jobs: Vec<BatchJob>,
    parser: &dyn ParsingService,
    classifier: &dyn Classifier,
    config: &PipelineConfig,
) -> BatchReport {
    let total = jobs.len();
    info!(
        "Processing {} documents ({} at a time)",
        total, config.batch_concurrency
    );

    let mut indexed: Vec<(usize, DocumentResult)> =
        stream::iter(jobs.into_iter().enumerate().map(|(i, job)| async move {
            let outcome = process_document(parser, classifier, &job.input, &job.output, config)
                .await
                .map_err(|e| DocumentFailure::from(&e));
            (
                i,
                DocumentResult {
                    input: job.input,
                    output: job.output,
                    outcome,
                },
            )
        }))
        .buffer_unordered(config.batch_concurrency.max(1))
        .collect()
        .await;
    indexed.sort_by_key(|(i, _)| *i);

    let report = BatchReport {
        results: indexed.into_iter().map(|(_, r)| r).collect(),
    };
    let failed = report.failures().count();
    if failed > 0 {
        warn!("Batch finished: {}/{} documents failed", failed, total);
    } else {
        info!("Batch finished: {} documents exported", total);
    }
    report
}

/// PDF files directly inside `dir` (extension matched case-insensitively),
/// sorted by path.
pub fn collect_pdfs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// Pair each input with `out_dir/<stem>.<ext>`.
pub fn jobs_for(inputs: &[PathBuf], out_dir: &Path, extension: &str) -> Vec<BatchJob> {
    inputs
        .iter()
        .map(|input| {
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "report".to_string());
            BatchJob::new(input, out_dir.join(format!("{stem}.{extension}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::model::StatusReport;
    use async_trait::async_trait;
    use std::time::Duration;

    /// Services that must not be called.
    struct Unreachable;

    #[async_trait]
    impl ParsingService for Unreachable {
        async fn submit(&self, _path: &Path) -> Result<String, ServiceError> {
            unreachable!()
        }
        async fn poll_status(&self, _job_id: &str) -> Result<StatusReport, ServiceError> {
            unreachable!()
        }
        async fn fetch_content(&self, _job_id: &str) -> Result<String, ServiceError> {
            unreachable!()
        }
    }

    #[async_trait]
    impl Classifier for Unreachable {
        async fn classify(&self, _instruction: &str, _text: &str) -> Result<String, ServiceError> {
            unreachable!()
        }
    }

    #[test]
    fn collect_pdfs_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt", "c.pdf.bak"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap();
        std::fs::write(dir.path().join("sub.pdf").join("d.pdf"), b"x").unwrap();

        let names: Vec<String> = collect_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn collect_pdfs_missing_dir_errors() {
        assert!(collect_pdfs(Path::new("/nonexistent/esg/reports")).is_err());
    }

    #[test]
    fn jobs_use_stem_and_extension() {
        let jobs = jobs_for(
            &[PathBuf::from("/in/acme 2023.pdf")],
            Path::new("/out"),
            "csv",
        );
        assert_eq!(jobs, vec![BatchJob::new("/in/acme 2023.pdf", "/out/acme 2023.csv")]);
    }

    #[tokio::test]
    async fn zero_batch_concurrency_still_runs_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            batch_concurrency: 0,
            ..PipelineConfig::default()
        };
        let jobs = vec![
            BatchJob::new(dir.path().join("missing-a.pdf"), dir.path().join("a.csv")),
            BatchJob::new(dir.path().join("missing-b.pdf"), dir.path().join("b.csv")),
        ];

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            run_batch(jobs, &Unreachable, &Unreachable, &config),
        )
        .await
        .expect("batch stalled");

        assert_eq!(report.results.len(), 2);
        let kinds: Vec<ErrorKind> = report.failures().map(|(_, f)| f.kind).collect();
        assert_eq!(kinds, vec![ErrorKind::Submission, ErrorKind::Submission]);
    }

    #[test]
    fn failure_from_error_names_kind_and_stage() {
        let err = Esg2SheetError::Fetch {
            job_id: "j1".into(),
            reason: "500".into(),
        };
        let f = DocumentFailure::from(&err);
        assert_eq!(f.kind, ErrorKind::Fetch);
        assert_eq!(f.stage, PipelineStage::Parsed);
        assert!(f.message.contains("j1"));
    }
}
