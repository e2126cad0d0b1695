//! Parsing-service client: submit a PDF, query job status, fetch the text.
//!
//! The pipeline only sees the [`ParsingService`] trait so it can be driven
//! by a fake in tests. [`LlamaParseClient`] is the production
//! implementation for the hosted LlamaParse API:
//!
//! | Call          | Endpoint                                  |
//! |---------------|-------------------------------------------|
//! | submit        | `POST {base}/upload` (multipart `file`)    |
//! | poll_status   | `GET  {base}/job/{id}`                     |
//! | fetch_content | `GET  {base}/job/{id}/result/markdown`     |
//!
//! Job status is read from `GET {base}/job/{id}` as in LlamaParse's
//! published REST reference, not from a `/job/{id}/status` sub-path.
//!
//! Every call is bounded by the client's request timeout; a stalled
//! connection surfaces as [`ServiceError::Transport`].

use crate::config::PipelineConfig;
use crate::error::{Esg2SheetError, ServiceError};
use crate::model::{Job, JobStatus, ParsedDocument, StatusReport};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Capability interface over the external parsing service.
#[async_trait]
pub trait ParsingService: Send + Sync {
    /// Upload a document and return the service's job identifier.
    async fn submit(&self, path: &Path) -> Result<String, ServiceError>;

    /// Query the current status of a job.
    async fn poll_status(&self, job_id: &str) -> Result<StatusReport, ServiceError>;

    /// Retrieve the parsed Markdown of a finished job.
    async fn fetch_content(&self, job_id: &str) -> Result<String, ServiceError>;
}

/// HTTP client for the LlamaParse API.
#[derive(Clone)]
pub struct LlamaParseClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlamaParseClient {
    /// Environment variable holding the API key.
    pub const API_KEY_VAR: &'static str = "LLAMA_PARSE_API_KEY";

    /// Build a client whose every request gives up after `request_timeout`.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, Esg2SheetError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Esg2SheetError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create from the `LLAMA_PARSE_API_KEY` environment variable, using
    /// the base URL and request timeout of `config`.
    pub fn from_env(config: &PipelineConfig) -> Result<Self, Esg2SheetError> {
        match std::env::var(Self::API_KEY_VAR) {
            Ok(key) if !key.trim().is_empty() => Self::new(
                key,
                config.parser_base_url.as_str(),
                Duration::from_secs(config.request_timeout_secs),
            ),
            _ => Err(Esg2SheetError::MissingCredential {
                var: Self::API_KEY_VAR.to_string(),
            }),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, ServiceError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", self.bearer())
            .header("Accept", "application/json")
            .send()
            .await?;
        decode(response).await
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(alias = "job_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default, alias = "error_message")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarkdownResponse {
    markdown: String,
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Http {
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| ServiceError::Decode(e.to_string()))
}

#[async_trait]
impl ParsingService for LlamaParseClient {
    async fn submit(&self, path: &Path) -> Result<String, ServiceError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")
            .map_err(ServiceError::from)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;

        let upload: UploadResponse = decode(response).await?;
        Ok(upload.id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<StatusReport, ServiceError> {
        let body: StatusResponse = self
            .get_json(&format!("{}/job/{}", self.base_url, job_id))
            .await?;
        let status = JobStatus::from_vendor(&body.status)
            .ok_or_else(|| ServiceError::Decode(format!("unknown job status '{}'", body.status)))?;
        Ok(StatusReport {
            status,
            error: body.error,
        })
    }

    async fn fetch_content(&self, job_id: &str) -> Result<String, ServiceError> {
        let body: MarkdownResponse = self
            .get_json(&format!("{}/job/{}/result/markdown", self.base_url, job_id))
            .await?;
        Ok(body.markdown)
    }
}

// ── Stage functions ──────────────────────────────────────────────────────

/// Upload `path` and return the new job in `Pending` state.
///
/// # Errors
/// [`Esg2SheetError::FileNotFound`] when the path is not a readable file,
/// [`Esg2SheetError::Submission`] on any transport or service failure.
pub async fn submit_document(
    service: &dyn ParsingService,
    path: &Path,
) -> Result<Job, Esg2SheetError> {
    if !path.is_file() {
        return Err(Esg2SheetError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    info!("Submitting {}", path.display());

    let job_id = service
        .submit(path)
        .await
        .map_err(|e| Esg2SheetError::Submission {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    info!("Submitted {} as job {}", path.display(), job_id);
    Ok(Job::new(job_id))
}

/// Retrieve the parsed text of a succeeded job, exactly once.
///
/// # Errors
/// [`Esg2SheetError::Fetch`] when the job is not in `Succeeded` state or
/// the retrieval call fails.
pub async fn fetch_document(
    service: &dyn ParsingService,
    job: &Job,
) -> Result<ParsedDocument, Esg2SheetError> {
    if job.status != JobStatus::Succeeded {
        let reason = match &job.failure_reason {
            Some(r) => format!("job is {}: {}", job.status, r),
            None => format!("job is {}", job.status),
        };
        return Err(Esg2SheetError::Fetch {
            job_id: job.job_id.clone(),
            reason,
        });
    }

    let text = service
        .fetch_content(&job.job_id)
        .await
        .map_err(|e| Esg2SheetError::Fetch {
            job_id: job.job_id.clone(),
            reason: e.to_string(),
        })?;

    debug!("Fetched {} chars for job {}", text.len(), job.job_id);
    Ok(ParsedDocument::new(job.job_id.clone(), text))
}
