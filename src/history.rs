//! Best-effort loading of a chat's messages from the Flowise history API.
//!
//! Nothing here is allowed to fail loudly: every problem is logged and the
//! caller gets an empty list.

use crate::api::FlowiseApi;
use crate::error::{AppError, AppResult};
use crate::models::{Chat, ChatMessage, HistoryMode, Role};
use crate::state::AppState;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

const PREDICTION_SEGMENT: &str = "/api/v1/prediction/";
const CHATMESSAGE_SEGMENT: &str = "/api/v1/chatmessage/";

/// Derives the history URL from a prediction URL.
///
/// URLs that don't follow the Flowise layout are only given the query string.
pub fn history_url(endpoint_url: &str, chat_id: &str) -> String {
    format!(
        "{}?chatId={}",
        endpoint_url.replace(PREDICTION_SEGMENT, CHATMESSAGE_SEGMENT),
        chat_id
    )
}

/// One message as the remote returns it. Every field is optional and any
/// JSON type is accepted; the defaulting rules below decide what to keep.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub role: Option<Value>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default)]
    pub created_date: Option<Value>,
}

/// The two response shapes the history API is known to produce. Entries are
/// decoded one by one so a single odd entry cannot sink the whole list.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum HistoryPayload {
    Bare(Vec<Value>),
    Wrapped { data: Vec<Value> },
}

impl HistoryPayload {
    pub fn into_messages(self) -> Vec<ChatMessage> {
        let entries = match self {
            HistoryPayload::Bare(entries) => entries,
            HistoryPayload::Wrapped { data } => data,
        };
        entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RemoteMessage>(entry) {
                Ok(remote) => Some(to_chat_message(remote)),
                Err(e) => {
                    log::warn!("Skipping history entry that is not an object: {}", e);
                    None
                }
            })
            .collect()
    }
}

// --- Defaulting rules for missing or odd fields ---

pub fn role_from_remote(role: Option<&Value>) -> Role {
    match role.and_then(Value::as_str) {
        Some("userMessage") => Role::User,
        _ => Role::Assistant,
    }
}

// Numbers and booleans are shown as written; null, arrays and objects are not text
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `content`, else `message`, else empty. Empty strings count as missing.
pub fn content_or_fallback(content: Option<&Value>, message: Option<&Value>) -> String {
    content
        .and_then(as_text)
        .or_else(|| message.and_then(as_text))
        .unwrap_or_default()
}

/// String or numeric id, otherwise the current time in milliseconds.
pub fn id_or_now(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => Utc::now().timestamp_millis().to_string(),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Epoch millis or RFC 3339 from `timestamp`, then `createdDate`, else now.
pub fn timestamp_or_now(
    timestamp: Option<&Value>,
    created_date: Option<&Value>,
) -> DateTime<Utc> {
    timestamp
        .and_then(parse_timestamp)
        .or_else(|| created_date.and_then(parse_timestamp))
        .unwrap_or_else(Utc::now)
}

fn to_chat_message(remote: RemoteMessage) -> ChatMessage {
    ChatMessage {
        id: id_or_now(remote.id.as_ref()),
        role: role_from_remote(remote.role.as_ref()),
        content: content_or_fallback(remote.content.as_ref(), remote.message.as_ref()),
        timestamp: timestamp_or_now(remote.timestamp.as_ref(), remote.created_date.as_ref()),
    }
}

/// Loads the remote history for `chat_id`. Returns an empty list on any failure.
pub async fn reconcile(
    api: &dyn FlowiseApi,
    chat_id: &str,
    endpoint_url: &str,
    api_key: Option<&str>,
) -> Vec<ChatMessage> {
    let url = history_url(endpoint_url, chat_id);

    let body = match api.fetch_history(&url, api_key).await {
        Ok(body) => body,
        Err(e) => {
            log::warn!("Could not load history from {}: {}", url, e);
            return Vec::new();
        }
    };

    match serde_json::from_value::<HistoryPayload>(body) {
        Ok(payload) => {
            let messages = payload.into_messages();
            log::info!("Loaded {} history messages from {}", messages.len(), url);
            messages
        }
        Err(e) => {
            log::warn!("History from {} has an unexpected shape: {}", url, e);
            Vec::new()
        }
    }
}

/// Replaces a server-mode chat's messages with the remote history.
pub async fn refresh_history(state: &AppState, id: &str) -> AppResult<Chat> {
    let (chat_id, endpoint_id) = {
        let chats = state.chats.lock().await;
        let chat = chats.get(id).ok_or_else(|| AppError::ChatNotFound(id.to_string()))?;
        if chat.history_mode == HistoryMode::Client {
            return Err(AppError::HistoryDisabled(id.to_string()));
        }
        (chat.chat_id.clone(), chat.endpoint_id.clone())
    };

    let endpoint = {
        let endpoints = state.endpoints.lock().await;
        endpoints
            .get(&endpoint_id)
            .cloned()
            .ok_or(AppError::EndpointNotFound(endpoint_id))?
    };

    let messages = reconcile(
        state.api_provider.as_ref(),
        &chat_id,
        &endpoint.url,
        endpoint.api_key.as_deref(),
    )
    .await;
    if messages.is_empty() {
        return Err(AppError::HistoryUnavailable);
    }

    let mut chats = state.chats.lock().await;
    chats
        .replace_messages(id, messages)
        .await?
        .ok_or_else(|| AppError::ChatNotFound(id.to_string()))
}
