use crate::models::{ChatMessage, HistoryMode};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Shown when a successful reply carries neither `text` nor `message`.
pub const REPLY_PLACEHOLDER: &str = "Response received";

// Trait defining the remote calls the app makes against a Flowise instance
#[async_trait]
pub trait FlowiseApi: Send + Sync {
    /// Posts one chat turn to a prediction endpoint.
    async fn predict(
        &self,
        url: &str,
        request: &PredictionRequest,
    ) -> Result<PredictionReply, PredictionError>;

    /// Fetches stored messages from a (derived) chatmessage URL.
    async fn fetch_history(
        &self,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<Value, HistoryFetchError>;

    /// Posts a hand-written JSON body and reports whatever comes back.
    async fn send_raw(&self, url: &str, body: &str) -> EndpointTestResult;
}

// --- Prediction ---

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteTurn {
    pub role: &'static str,
    pub content: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    pub question: String,
    pub chat_id: String,
    // Only present in client mode; server mode must not send the key at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<RemoteTurn>>,
}

impl PredictionRequest {
    /// Builds the body for `mode`. `prior` is the message list as it was
    /// before the new question was appended.
    pub fn for_mode(
        question: &str,
        chat_id: &str,
        mode: HistoryMode,
        prior: &[ChatMessage],
    ) -> Self {
        let history = match mode {
            HistoryMode::Client => Some(
                prior
                    .iter()
                    .map(|msg| RemoteTurn {
                        role: msg.role.remote_name(),
                        content: msg.content.clone(),
                    })
                    .collect(),
            ),
            HistoryMode::Server => None,
        };
        Self {
            question: question.to_string(),
            chat_id: chat_id.to_string(),
            history,
        }
    }
}

/// A decoded 2xx prediction body.
#[derive(Debug, Clone)]
pub struct PredictionReply(pub Value);

impl PredictionReply {
    /// `text`, then `message`, then the fixed placeholder.
    pub fn content(&self) -> String {
        ["text", "message"]
            .iter()
            .filter_map(|field| self.0.get(*field).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or(REPLY_PLACEHOLDER)
            .to_string()
    }
}

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    // Display is only the server's message, which is what the chat shows
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("invalid JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

// --- History ---

/// Ways a history fetch can fail. All of them are soft: callers log and move on.
#[derive(Debug, Error)]
pub enum HistoryFetchError {
    #[error("authentication required; an API key may be needed")]
    Unauthorized,

    #[error("history endpoint not found")]
    NotFound,

    #[error("history request failed with status {0}")]
    Status(u16),

    #[error("history endpoint returned non-JSON content ({0:?})")]
    NotJson(Option<String>),

    #[error("history request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("history response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

// --- Endpoint testing ---

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EndpointTestResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// --- Flowise HTTP implementation ---

#[derive(Debug, Clone, Default)]
pub struct FlowiseClient {
    client: Client,
}

impl FlowiseClient {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

#[async_trait]
impl FlowiseApi for FlowiseClient {
    async fn predict(
        &self,
        url: &str,
        request: &PredictionRequest,
    ) -> Result<PredictionReply, PredictionError> {
        log::info!(
            "Sending prediction for chat {} to {} (history: {})",
            request.chat_id,
            url,
            request.history.as_ref().map_or(0, Vec::len)
        );

        let response = self.client.post(url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // The body is decoded before the status is checked so error replies
        // can contribute their `message`
        let data: Value = serde_json::from_str(&body)?;
        if !status.is_success() {
            let message = error_message(&data).unwrap_or_else(|| "Error in response".to_string());
            log::error!("Prediction request to {} failed with status {}: {}", url, status, message);
            return Err(PredictionError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(PredictionReply(data))
    }

    async fn fetch_history(
        &self,
        url: &str,
        api_key: Option<&str>,
    ) -> Result<Value, HistoryFetchError> {
        log::debug!("Fetching chat history from {}", url);
        let mut request = self.client.get(url).header(CONTENT_TYPE, "application/json");
        if let Some(key) = api_key {
            // Flowise deployments differ in which header they read
            request = request.bearer_auth(key).header("X-API-Key", key);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(HistoryFetchError::Unauthorized),
            StatusCode::NOT_FOUND => return Err(HistoryFetchError::NotFound),
            status if !status.is_success() => {
                return Err(HistoryFetchError::Status(status.as_u16()))
            }
            _ => {}
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !content_type.as_deref().is_some_and(|ct| ct.contains("application/json")) {
            return Err(HistoryFetchError::NotJson(content_type));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_raw(&self, url: &str, body: &str) -> EndpointTestResult {
        log::info!("Testing endpoint {}", url);
        let response = match self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Endpoint test against {} failed: {}", url, e);
                return EndpointTestResult {
                    success: false,
                    status: None,
                    data: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let status = response.status();
        let parsed = match response.text().await {
            Ok(text) => serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match parsed {
            Ok(data) => EndpointTestResult {
                success: status.is_success(),
                status: Some(status.as_u16()),
                error: if status.is_success() {
                    None
                } else {
                    Some(error_message(&data).unwrap_or_else(|| "Unknown error".to_string()))
                },
                data: Some(data),
            },
            // Same as a connection error in the endpoint test UI: no status shown
            Err(e) => EndpointTestResult {
                success: false,
                status: None,
                data: None,
                error: Some(e),
            },
        }
    }
}
