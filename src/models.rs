use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// Who authored a message, in the app's own vocabulary
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Role name used by the Flowise prediction and history APIs.
    pub fn remote_name(self) -> &'static str {
        match self {
            Role::User => "userMessage",
            Role::Assistant => "apiMessage",
        }
    }
}

/// Whether the full message list travels with every turn (`Client`) or the
/// remote flow keeps it, keyed by `chatId` (`Server`).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
    #[default]
    Client,
    Server,
}

// A single message in a chat. Never mutated after creation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChatMessage {
    #[serde(default = "new_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// A user-registered Flowise target
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default = "new_id")]
    pub id: String,
    pub name: String,
    pub url: String, // e.g. https://host/api/v1/prediction/<flow-id>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    // Only needed for loading server-side history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

// Form input for registering an endpoint
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewEndpoint {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// A conversation bound to one endpoint.
///
/// `endpoint_name` is copied from the endpoint when the chat is created and is
/// not updated if the endpoint is later renamed or deleted.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub endpoint_id: String,
    pub endpoint_name: String,
    /// Correlation id the remote flow groups turns by.
    pub chat_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_message_at: DateTime<Utc>,
    #[serde(default)]
    pub history_mode: HistoryMode,
}

// Form input for creating a chat
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewChat {
    pub title: String,
    pub endpoint_id: String,
    // Reuse an existing remote conversation; generated when absent
    #[serde(default)]
    pub chat_id: Option<String>,
    // Falls back to the process-wide HistoryConfig
    #[serde(default)]
    pub history_mode: Option<HistoryMode>,
}

// Process-wide defaults for new chats
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    pub history_mode: HistoryMode,
    pub auto_load_history: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            history_mode: HistoryMode::Client,
            auto_load_history: true,
        }
    }
}

// Transcription settings. The OpenAI key is stored on its own, never in here.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WhisperConfig {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: Some("es".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_serializes_with_camel_case_and_millis() {
        let created = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let chat = Chat {
            id: "1".into(),
            title: "Demo".into(),
            endpoint_id: "ep".into(),
            endpoint_name: "Flow".into(),
            chat_id: "test-123".into(),
            messages: vec![],
            created_at: created,
            last_message_at: created,
            history_mode: HistoryMode::Server,
        };

        let value = serde_json::to_value(&chat).unwrap();
        assert_eq!(value["endpointId"], "ep");
        assert_eq!(value["chatId"], "test-123");
        assert_eq!(value["createdAt"], 1_700_000_000_123_i64);
        assert_eq!(value["historyMode"], "server");
    }

    #[test]
    fn endpoint_omits_absent_optionals() {
        let endpoint = Endpoint {
            id: "1".into(),
            name: "Flow".into(),
            url: "https://flowise.local/api/v1/prediction/abc".into(),
            description: None,
            api_key: None,
        };
        let value = serde_json::to_value(&endpoint).unwrap();
        assert!(value.get("apiKey").is_none());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn history_config_defaults_to_client_with_autoload() {
        let config = HistoryConfig::default();
        assert_eq!(config.history_mode, HistoryMode::Client);
        assert!(config.auto_load_history);
    }

    #[test]
    fn roles_map_to_remote_vocabulary() {
        assert_eq!(Role::User.remote_name(), "userMessage");
        assert_eq!(Role::Assistant.remote_name(), "apiMessage");
    }
}
