//! Integration tests for the document pipeline.
//!
//! Both external services are replaced by in-process fakes, so these tests
//! need no network and no API keys. Timing-sensitive tests run on tokio's
//! paused clock: sleeps complete instantly while `Instant` still advances.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use esg2sheet::pipeline::classify::classify_segment;
use esg2sheet::pipeline::poll::{wait_for_completion, PollSettings};
use esg2sheet::{
    process_document, run_batch, BatchJob, Classifier, ErrorKind, Esg2SheetError, Job, JobStatus,
    ParsingService, PipelineConfig, PipelineProgressCallback, PipelineStage, Section, Segment,
    SegmentError, ServiceError, SourceType, StatusReport,
};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Parsing service keyed by file name: each document is `Running` for
/// `running_polls` queries, then `Succeeded` (or `Failed` when listed in
/// `failed_jobs`). Documents in `broken_fetch` fail on retrieval.
#[derive(Default)]
struct FakeParser {
    content: HashMap<String, String>,
    running_polls: usize,
    failed_jobs: Vec<String>,
    broken_fetch: Vec<String>,
    polls: Mutex<HashMap<String, usize>>,
    fetches: AtomicUsize,
}

impl FakeParser {
    fn with_document(mut self, name: &str, text: &str) -> Self {
        self.content.insert(name.to_string(), text.to_string());
        self
    }
}

#[async_trait]
impl ParsingService for FakeParser {
    async fn submit(&self, path: &Path) -> Result<String, ServiceError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        Ok(name)
    }

    async fn poll_status(&self, job_id: &str) -> Result<StatusReport, ServiceError> {
        let mut polls = self.polls.lock().unwrap();
        let n = polls.entry(job_id.to_string()).or_insert(0);
        *n += 1;
        if *n <= self.running_polls {
            Ok(StatusReport::new(JobStatus::Running))
        } else if self.failed_jobs.iter().any(|j| j == job_id) {
            Ok(StatusReport::failed("unsupported file"))
        } else {
            Ok(StatusReport::new(JobStatus::Succeeded))
        }
    }

    async fn fetch_content(&self, job_id: &str) -> Result<String, ServiceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken_fetch.iter().any(|j| j == job_id) {
            return Err(ServiceError::Http {
                status: 500,
                body: "internal error".into(),
            });
        }
        self.content
            .get(job_id)
            .cloned()
            .ok_or_else(|| ServiceError::Http {
                status: 404,
                body: "no such job".into(),
            })
    }
}

/// Status-only fake that replays a script and then repeats its last answer.
struct ScriptedStatus {
    script: Mutex<VecDeque<JobStatus>>,
    last: Mutex<JobStatus>,
    queries: AtomicUsize,
}

impl ScriptedStatus {
    fn new(script: &[JobStatus]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            last: Mutex::new(JobStatus::Pending),
            queries: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ParsingService for ScriptedStatus {
    async fn submit(&self, _path: &Path) -> Result<String, ServiceError> {
        Ok("job".into())
    }

    async fn poll_status(&self, _job_id: &str) -> Result<StatusReport, ServiceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(StatusReport::new(*last))
    }

    async fn fetch_content(&self, _job_id: &str) -> Result<String, ServiceError> {
        Ok(String::new())
    }
}

/// Classifier that answers by keyword: the first rule whose keyword occurs
/// in the prompt text wins. Each rule may delay its answer.
#[derive(Default)]
struct FakeClassifier {
    rules: Vec<(String, Duration, Result<String, String>)>,
    calls: Mutex<Vec<String>>,
}

impl FakeClassifier {
    fn answer(mut self, keyword: &str, response: &str) -> Self {
        self.rules
            .push((keyword.into(), Duration::ZERO, Ok(response.into())));
        self
    }

    fn answer_after(mut self, keyword: &str, delay: Duration, response: &str) -> Self {
        self.rules.push((keyword.into(), delay, Ok(response.into())));
        self
    }

    fn fail(mut self, keyword: &str, error: &str) -> Self {
        self.rules
            .push((keyword.into(), Duration::ZERO, Err(error.into())));
        self
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, _instruction: &str, text: &str) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(text.to_string());
        let rule = self.rules.iter().find(|(k, _, _)| text.contains(k.as_str()));
        match rule {
            Some((_, delay, answer)) => {
                tokio::time::sleep(*delay).await;
                answer.clone().map_err(ServiceError::Transport)
            }
            None => Ok(String::new()),
        }
    }
}

#[derive(Default)]
struct StageRecorder {
    stages: Mutex<Vec<(String, PipelineStage)>>,
}

impl PipelineProgressCallback for StageRecorder {
    fn on_stage(&self, document: &str, stage: PipelineStage) {
        self.stages.lock().unwrap().push((document.to_string(), stage));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Two segments at 30 chars: "Alpha…\n\n" and "Bravo…".
const REPORT: &str = "Alpha: emissions fell.\n\nBravo: training hours rose.";

const ALPHA_ROWS: &str = "| section | source_type | item | data |\n\
                          | --- | --- | --- | --- |\n\
                          | environment | chart | Scope 1 emissions | 12,400 tCO2e |\n\
                          | environment | body | Renewable electricity share | 38% |";

const BRAVO_ROWS: &str = "| social | summary | Training hours per employee | 32 |";

fn config() -> PipelineConfig {
    PipelineConfig::builder()
        .check_interval_secs(1)
        .timeout_secs(30)
        .max_segment_chars(30)
        .build()
        .unwrap()
}

fn pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.7 fake").unwrap();
    path
}

fn csv_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

// ── Poller ───────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_poller_waits_three_intervals() {
    let service = ScriptedStatus::new(&[JobStatus::Pending, JobStatus::Running, JobStatus::Succeeded]);
    let mut job = Job::new("job");
    let settings = PollSettings {
        check_interval: Duration::from_secs(1),
        timeout: Duration::from_secs(60),
        max_failures: 3,
    };

    let start = Instant::now();
    let status = wait_for_completion(&service, &mut job, settings).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(status, JobStatus::Succeeded);
    assert_eq!(job.status, JobStatus::Succeeded);
    assert_eq!(service.queries.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_poller_times_out() {
    let service = ScriptedStatus::new(&[JobStatus::Running]);
    let mut job = Job::new("job");
    let settings = PollSettings {
        check_interval: Duration::from_secs(2),
        timeout: Duration::from_secs(9),
        max_failures: 3,
    };

    let start = Instant::now();
    let err = wait_for_completion(&service, &mut job, settings)
        .await
        .unwrap_err();

    assert!(matches!(err, Esg2SheetError::Timeout { secs: 9, .. }), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() >= Duration::from_secs(9));
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(service.queries.load(Ordering::SeqCst), 4);
}

// ── Classifier ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_classifier_single_row() {
    let classifier = FakeClassifier::default().answer(
        "Scope",
        "| environment | chart | Scope 1 emissions | 12,400 tCO2e |",
    );
    let segment = Segment {
        index: 3,
        text: "Scope 1 emissions were 12,400 tCO2e in 2023.".into(),
    };

    let outcome = classify_segment(&classifier, &segment, "instruction")
        .await
        .unwrap();
    assert_eq!(outcome.index, 3);
    let rows = outcome.result.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].section, Section::Environment);
    assert_eq!(rows[0].source_type, SourceType::Chart);
    assert_eq!(rows[0].item, "Scope 1 emissions");
    assert_eq!(rows[0].data, "12,400 tCO2e");
}

#[tokio::test]
async fn test_classifier_malformed_response() {
    let classifier = FakeClassifier::default().answer("Scope", "| environment | chart | Scope 1 |");
    let segment = Segment {
        index: 7,
        text: "Scope 1 emissions".into(),
    };

    let outcome = classify_segment(&classifier, &segment, "instruction")
        .await
        .unwrap();
    match outcome.result {
        Err(SegmentError::Parse { segment, .. }) => assert_eq!(segment, 7),
        Ok(rows) => panic!("expected parse error, got {rows:?}"),
    }
}

// ── Whole document ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_document_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("out/acme.csv");

    let parser = FakeParser {
        running_polls: 2,
        ..Default::default()
    }
    .with_document("acme.pdf", REPORT);
    let classifier = FakeClassifier::default()
        .answer("Alpha", ALPHA_ROWS)
        .answer("Bravo", BRAVO_ROWS);

    let summary = process_document(&parser, &classifier, &input, &output, &config())
        .await
        .unwrap();

    assert_eq!(summary.segments, 2);
    assert_eq!(summary.skipped_segments, 0);
    assert_eq!(summary.stats.total_rows, 3);
    assert_eq!(summary.stats.sections, 2);
    assert_eq!(parser.fetches.load(Ordering::SeqCst), 1);
    assert_eq!(classifier.call_count(), 2);

    let lines = csv_lines(&output);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "Section,Source Type,Item,Data");
    assert!(lines[1].starts_with("environment,chart,Scope 1 emissions"));
    assert!(lines[2].starts_with("environment,body,Renewable electricity share"));
    assert!(lines[3].starts_with("social,summary,Training hours per employee"));
}

#[tokio::test(start_paused = true)]
async fn test_order_kept_when_segments_finish_out_of_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("acme.csv");

    let parser = FakeParser::default().with_document("acme.pdf", REPORT);
    // First segment answers last.
    let classifier = FakeClassifier::default()
        .answer_after("Alpha", Duration::from_secs(5), ALPHA_ROWS)
        .answer("Bravo", BRAVO_ROWS);

    process_document(&parser, &classifier, &input, &output, &config())
        .await
        .unwrap();

    let lines = csv_lines(&output);
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("environment,"));
    assert!(lines[2].starts_with("environment,"));
    assert!(lines[3].starts_with("social,"));
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_segment_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("acme.csv");

    let parser = FakeParser::default().with_document("acme.pdf", REPORT);
    let classifier = FakeClassifier::default()
        .answer("Alpha", "Sorry, I cannot help with that.")
        .answer("Bravo", BRAVO_ROWS);

    let summary = process_document(&parser, &classifier, &input, &output, &config())
        .await
        .unwrap();

    assert_eq!(summary.segments, 2);
    assert_eq!(summary.skipped_segments, 1);
    assert_eq!(summary.parsed_segments(), 1);
    assert_eq!(csv_lines(&output).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_classification_failure_aborts_document() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("acme.xlsx");

    let parser = FakeParser::default().with_document("acme.pdf", REPORT);
    let classifier = FakeClassifier::default()
        .answer("Alpha", ALPHA_ROWS)
        .fail("Bravo", "rate limited");
    let recorder = Arc::new(StageRecorder::default());
    let config = PipelineConfig::builder()
        .check_interval_secs(1)
        .timeout_secs(30)
        .max_segment_chars(30)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let err = process_document(&parser, &classifier, &input, &output, &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Classification);
    assert!(!output.exists());
    let stages: Vec<PipelineStage> = recorder.stages.lock().unwrap().iter().map(|(_, s)| *s).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Submitted,
            PipelineStage::Polling,
            PipelineStage::Parsed,
            PipelineStage::Segmenting,
            PipelineStage::Classifying,
            PipelineStage::Failed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_is_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("acme.xlsx");

    let parser = FakeParser {
        failed_jobs: vec!["acme.pdf".into()],
        ..Default::default()
    }
    .with_document("acme.pdf", REPORT);
    let classifier = FakeClassifier::default();

    let err = process_document(&parser, &classifier, &input, &output, &config())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Fetch);
    assert!(err.to_string().contains("unsupported file"), "{err}");
    assert_eq!(parser.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(classifier.call_count(), 0);
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_input_is_submission_error() {
    let dir = tempfile::tempdir().unwrap();
    let parser = FakeParser::default();
    let classifier = FakeClassifier::default();

    let err = process_document(
        &parser,
        &classifier,
        &dir.path().join("missing.pdf"),
        &dir.path().join("missing.xlsx"),
        &config(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Esg2SheetError::FileNotFound { .. }));
    assert_eq!(err.kind(), ErrorKind::Submission);
}

#[tokio::test(start_paused = true)]
async fn test_xlsx_output_by_extension() {
    let dir = tempfile::tempdir().unwrap();
    let input = pdf(dir.path(), "acme.pdf");
    let output = dir.path().join("acme.xlsx");

    let parser = FakeParser::default().with_document("acme.pdf", REPORT);
    let classifier = FakeClassifier::default()
        .answer("Alpha", ALPHA_ROWS)
        .answer("Bravo", BRAVO_ROWS);

    process_document(&parser, &classifier, &input, &output, &config())
        .await
        .unwrap();

    let bytes = std::fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_batch_with_one_fetch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("sheets");

    let parser = FakeParser {
        running_polls: 1,
        broken_fetch: vec!["b.pdf".into()],
        ..Default::default()
    }
    .with_document("a.pdf", REPORT)
    .with_document("b.pdf", REPORT)
    .with_document("c.pdf", REPORT);
    let classifier = FakeClassifier::default()
        .answer("Alpha", ALPHA_ROWS)
        .answer("Bravo", BRAVO_ROWS);

    let jobs: Vec<BatchJob> = ["a", "b", "c"]
        .iter()
        .map(|stem| {
            BatchJob::new(
                pdf(dir.path(), &format!("{stem}.pdf")),
                out_dir.join(format!("{stem}.csv")),
            )
        })
        .collect();

    let report = run_batch(jobs, &parser, &classifier, &config()).await;

    assert_eq!(report.results.len(), 3);
    let inputs: Vec<String> = report
        .results
        .iter()
        .map(|r| r.input.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(inputs, vec!["a.pdf", "b.pdf", "c.pdf"]);

    assert_eq!(report.succeeded().count(), 2);
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].0.ends_with("b.pdf"));
    assert_eq!(failures[0].1.kind, ErrorKind::Fetch);
    assert_eq!(failures[0].1.stage, PipelineStage::Parsed);
    assert!(!report.all_succeeded());

    assert_eq!(csv_lines(&out_dir.join("a.csv")).len(), 4);
    assert_eq!(csv_lines(&out_dir.join("c.csv")).len(), 4);
    assert!(!out_dir.join("b.csv").exists());
    let mut written: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    written.sort();
    assert_eq!(written, vec!["a.csv", "c.csv"]);
}
