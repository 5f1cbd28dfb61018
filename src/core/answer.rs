//! Remote answer service client
//!
//! Information Hiding:
//! - Request/response wire format and endpoint path hidden behind `AnswerService`
//! - API key travels only in the request body
//! - Every call is bounded by a timeout and never retried

use crate::error::AnswerServiceError;
use crate::storage::Exchange;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;

/// One prior turn as the answer service expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub answer: String,
}

impl From<&Exchange> for HistoryEntry {
    fn from(exchange: &Exchange) -> Self {
        Self {
            question: exchange.question.clone(),
            answer: exchange.answer.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRequest {
    pub question: String,
    pub history: Vec<HistoryEntry>,
}

impl AnswerRequest {
    /// History is passed oldest first
    pub fn new(question: impl Into<String>, history: &[Exchange]) -> Self {
        Self {
            question: question.into(),
            history: history.iter().map(HistoryEntry::from).collect(),
        }
    }
}

/// Remote answer generation
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn generate(&self, request: &AnswerRequest) -> Result<String, AnswerServiceError>;
}

#[derive(Debug, Serialize)]
struct AnswerPayload<'a> {
    question: &'a str,
    history: &'a [HistoryEntry],
    api_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: Option<String>,
}

pub struct HttpAnswerClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl HttpAnswerClient {
    pub fn new(api_base: &str, api_key: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/api/answer", api_base.trim_end_matches('/')),
            api_key,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: &AnswerRequest) -> Result<String, AnswerServiceError> {
        let payload = AnswerPayload {
            question: &request.question,
            history: &request.history,
            api_key: &self.api_key,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AnswerServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: AnswerResponse = serde_json::from_str(&body)
            .map_err(|e| AnswerServiceError::Malformed(e.to_string()))?;

        match parsed.answer {
            Some(answer) if !answer.trim().is_empty() => Ok(answer),
            Some(_) => Err(AnswerServiceError::Malformed("empty 'answer' field".to_string())),
            None => Err(AnswerServiceError::Malformed("missing 'answer' field".to_string())),
        }
    }
}

#[async_trait]
impl AnswerService for HttpAnswerClient {
    async fn generate(&self, request: &AnswerRequest) -> Result<String, AnswerServiceError> {
        tracing::debug!(
            "[HttpAnswerClient] Asking {} with {} prior exchanges",
            self.endpoint,
            request.history.len()
        );

        match timeout(self.timeout, self.post(request)).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(e)) => {
                tracing::warn!("[HttpAnswerClient] Request failed: {}", e);
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    "[HttpAnswerClient] No response within {:?}",
                    self.timeout
                );
                Err(AnswerServiceError::Timeout(self.timeout))
            }
        }
    }
}
