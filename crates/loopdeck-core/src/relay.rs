use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub const DEFAULT_SEND_ATTEMPTS: usize = 3;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RelayError {
    /// The host identity must be known before any send attempt.
    #[error("missing chat id; sign in through the host app first")]
    MissingChatId,
    #[error("relay request failed: {0}")]
    Request(String),
    #[error("relay returned status {status}: {body}")]
    Server { status: u16, body: String },
    #[error("relay rejected the clip: {description}")]
    Rejected { description: String },
    #[error("send failed after {attempts} attempts: {last_error}")]
    AllAttemptsFailed { attempts: usize, last_error: String },
}

/// Response body of the relay's `POST /send-audio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAudioResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One delivery attempt. The trait seam exists so tests can inject failing
/// transports without touching the network.
pub trait RelayTransport {
    fn post_audio(
        &self,
        chat_id: &str,
        audio: &[u8],
        filename: &str,
    ) -> Result<SendAudioResponse, RelayError>;
}

/// Multipart HTTP transport against the serverless relay endpoint.
pub struct HttpRelayTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpRelayTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RelayError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_ATTEMPT_TIMEOUT)
            .build()
            .map_err(|error| RelayError::Request(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl RelayTransport for HttpRelayTransport {
    fn post_audio(
        &self,
        chat_id: &str,
        audio: &[u8],
        filename: &str,
    ) -> Result<SendAudioResponse, RelayError> {
        let mime = if filename.ends_with(".mp3") {
            "audio/mpeg"
        } else {
            "audio/wav"
        };
        let part = reqwest::blocking::multipart::Part::bytes(audio.to_vec())
            .file_name(filename.to_string())
            .mime_str(mime)
            .map_err(|error| RelayError::Request(error.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("audio", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .map_err(|error| RelayError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(RelayError::Server {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<SendAudioResponse>()
            .map_err(|error| RelayError::Request(error.to_string()))
    }
}

/// Retrying wrapper around a transport: a bounded number of attempts with a
/// fixed backoff, then a final user-visible failure. Never retries forever.
pub struct RelayClient<T: RelayTransport> {
    transport: T,
    attempts: usize,
    backoff: Duration,
}

impl<T: RelayTransport> RelayClient<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            attempts: DEFAULT_SEND_ATTEMPTS,
            backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, attempts: usize, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    #[instrument(skip(self, audio), fields(bytes = audio.len(), filename))]
    pub fn send_audio(
        &self,
        chat_id: &str,
        audio: &[u8],
        filename: &str,
    ) -> Result<SendAudioResponse, RelayError> {
        if chat_id.trim().is_empty() {
            return Err(RelayError::MissingChatId);
        }

        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            match self.transport.post_audio(chat_id, audio, filename) {
                Ok(response) if response.ok => {
                    info!(attempt, "audio delivered");
                    return Ok(response);
                }
                Ok(response) => {
                    let description = response
                        .description
                        .unwrap_or_else(|| "no description".to_string());
                    last_error = RelayError::Rejected { description }.to_string();
                }
                Err(error) => {
                    last_error = error.to_string();
                }
            }

            if attempt < self.attempts {
                warn!(attempt, %last_error, "send attempt failed, retrying");
                thread::sleep(self.backoff);
            }
        }

        Err(RelayError::AllAttemptsFailed {
            attempts: self.attempts,
            last_error,
        })
    }
}
