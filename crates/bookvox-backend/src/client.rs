//! HTTP client for the conversion backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use bookvox_jobs::{JobId, StatusError, StatusSnapshot, StatusSource};
use bookvox_speech::{AudioClip, SpeechBackend, SpeechError, SpeechResult};

use crate::error::BackendError;
use crate::types::{SplitResponse, SubmitReceipt};

const USER_AGENT: &str = concat!("bookvox/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One client per backend; cheap to clone, connection pool shared.
///
/// Also the production implementation of the two engine seams: it feeds
/// the job poller ([`StatusSource`]) and the playback pipeline
/// ([`SpeechBackend`]).
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Upload a recorded voice query. The backend answers with the job it
    /// opened for it.
    pub async fn submit_recording(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<SubmitReceipt, BackendError> {
        let url = self.url("recognize");
        debug!(target: "backend", url = %url, bytes = bytes.len(), "submitting recording");

        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::expect_json(response).await
    }

    /// Current status snapshot for a job.
    pub async fn status(&self, job: &JobId) -> Result<StatusSnapshot, BackendError> {
        let url = self.url(&format!("status/{job}"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::expect_json(response).await
    }

    /// Split `text` into playable sentences.
    pub async fn split_text(&self, text: &str) -> Result<Vec<String>, BackendError> {
        let url = self.url("speak");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "text": text, "split": true }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let split: SplitResponse = Self::expect_json(response).await?;
        Ok(split.sentences)
    }

    /// Synthesize one sentence; the body is the audio, returned untouched.
    pub async fn synthesize_text(&self, sentence: &str) -> Result<Vec<u8>, BackendError> {
        let url = self.url("speak");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "text": sentence }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let response = Self::expect_success(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Send the user's answer to a clarifying question, so the job can be
    /// re-processed.
    pub async fn answer_clarification(
        &self,
        job: &JobId,
        answer: &str,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("clarify/{job}"));
        debug!(target: "backend", url = %url, "answering clarification");
        let response = self
            .http
            .post(&url)
            .json(&json!({ "answer": answer }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Ask the backend to acquire and convert the guessed book.
    pub async fn request_fetch(&self, job: &JobId) -> Result<(), BackendError> {
        let url = self.url(&format!("fetch/{job}"));
        debug!(target: "backend", url = %url, "requesting book fetch");
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        Self::expect_success(response).await?;
        Ok(())
    }

    /// Section listing of the converted book.
    ///
    /// The index appears on disk only once conversion finished, so any
    /// unsuccessful status maps to [`BackendError::NotReady`] and callers
    /// poll until it shows up.
    pub async fn ebook_index(&self, job: &JobId) -> Result<Vec<String>, BackendError> {
        let url = self.url(&format!("ebooks/{job}/parsed/index.json"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::NotReady);
        }
        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }

    /// Plain text of one converted section.
    pub async fn ebook_section(
        &self,
        job: &JobId,
        section: &str,
    ) -> Result<String, BackendError> {
        let url = self.url(&format!("ebooks/{job}/parsed/{section}"));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let response = Self::expect_success(response).await?;
        response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))
    }

    async fn expect_success(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Api {
            code: status.as_u16(),
            body,
        })
    }

    async fn expect_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let response = Self::expect_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

#[async_trait]
impl StatusSource for BackendClient {
    async fn fetch_status(&self, job: &JobId) -> Result<StatusSnapshot, StatusError> {
        self.status(job).await.map_err(|err| match err {
            BackendError::Parse(message) => StatusError::Parse(message),
            other => StatusError::Transport(other.to_string()),
        })
    }
}

#[async_trait]
impl SpeechBackend for BackendClient {
    async fn split(&self, text: &str) -> SpeechResult<Vec<String>> {
        self.split_text(text)
            .await
            .map_err(|e| SpeechError::Split(e.to_string()))
    }

    async fn synthesize(&self, sentence: &str) -> SpeechResult<AudioClip> {
        self.synthesize_text(sentence)
            .await
            .map(AudioClip::from)
            .map_err(|e| SpeechError::Synthesis(e.to_string()))
    }
}
