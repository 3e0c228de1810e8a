use std::time::Duration;

use async_trait::async_trait;
use exam_core::DrainedAnswer;
use exam_core::model::{AssessmentId, EngineSettings};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::SubmissionError;

/// Body sent to the grading backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub assessment_id: AssessmentId,
    /// Time the attempt took, from start to submission.
    pub duration_ms: u64,
    pub answers: Vec<DrainedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub result_id: String,
    #[serde(default)]
    pub summary: Option<serde_json::Value>,
}

/// Delivers a finished attempt for grading.
#[async_trait]
pub trait SubmissionService: Send + Sync {
    /// # Errors
    ///
    /// Returns `SubmissionError` when the attempt could not be delivered.
    async fn submit(&self, payload: &SubmissionPayload)
    -> Result<SubmissionReceipt, SubmissionError>;
}

/// JSON-over-HTTP submission client.
#[derive(Clone)]
pub struct HttpSubmissionClient {
    client: Client,
    base_url: Option<String>,
}

impl HttpSubmissionClient {
    /// # Errors
    ///
    /// Returns `SubmissionError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: Option<String>, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// # Errors
    ///
    /// Returns `SubmissionError::Http` if the HTTP client cannot be built.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, SubmissionError> {
        Self::new(
            settings.submission_base_url().map(str::to_owned),
            Duration::from_secs(settings.submission_timeout_secs()),
        )
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.base_url.is_some()
    }

    fn endpoint(base_url: &str, assessment_id: &AssessmentId) -> String {
        format!(
            "{}/assessments/{}/submissions",
            base_url.trim_end_matches('/'),
            assessment_id
        )
    }
}

#[async_trait]
impl SubmissionService for HttpSubmissionClient {
    async fn submit(
        &self,
        payload: &SubmissionPayload,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let base_url = self.base_url.as_deref().ok_or(SubmissionError::Disabled)?;
        let url = Self::endpoint(base_url, &payload.assessment_id);

        let response = self.client.post(url).json(payload).send().await?;
        if !response.status().is_success() {
            return Err(SubmissionError::HttpStatus(response.status()));
        }

        Ok(response.json().await?)
    }
}
