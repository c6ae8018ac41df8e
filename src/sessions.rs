use crate::config;
use crate::error::{AppError, AppResult};
use crate::history;
use crate::models::{Chat, ChatMessage, NewChat};
use crate::state::AppState;
use crate::storage::{keys, StorageManager};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// All chats, newest first, mirrored wholesale to local storage after every
/// change.
#[derive(Debug)]
pub struct ChatStore {
    storage: Arc<StorageManager>,
    chats: Vec<Chat>,
}

impl ChatStore {
    pub async fn load(storage: Arc<StorageManager>) -> Result<Self, anyhow::Error> {
        let chats: Vec<Chat> = storage
            .get_json_or_default(keys::CHATS)
            .await
            .context("Failed to load chats")?;
        log::info!("Loaded {} chats", chats.len());
        Ok(Self { storage, chats })
    }

    pub fn list(&self) -> &[Chat] {
        &self.chats
    }

    pub fn get(&self, id: &str) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Puts a chat at the top of the list.
    pub async fn insert(&mut self, chat: Chat) -> Result<(), anyhow::Error> {
        self.chats.insert(0, chat);
        self.flush().await
    }

    pub async fn remove(&mut self, id: &str) -> Result<bool, anyhow::Error> {
        let before = self.chats.len();
        self.chats.retain(|c| c.id != id);
        let removed = self.chats.len() != before;
        if removed {
            self.flush().await?;
        }
        Ok(removed)
    }

    /// Appends a message and bumps `last_message_at`. `None` if the chat is gone.
    pub async fn append_message(
        &mut self,
        id: &str,
        message: ChatMessage,
    ) -> Result<Option<Chat>, anyhow::Error> {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        chat.messages.push(message);
        chat.last_message_at = Utc::now();
        let updated = chat.clone();

        self.flush().await?;
        Ok(Some(updated))
    }

    /// Swaps in a whole new message list, as a history refresh does.
    pub async fn replace_messages(
        &mut self,
        id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Option<Chat>, anyhow::Error> {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        chat.messages = messages;
        chat.last_message_at = Utc::now();
        let updated = chat.clone();

        self.flush().await?;
        Ok(Some(updated))
    }

    async fn flush(&self) -> Result<(), anyhow::Error> {
        self.storage
            .set_json(keys::CHATS, &self.chats)
            .await
            .context("Failed to persist chats")
    }
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `chat_<epoch millis>_<9 random base-36 chars>`. Collisions are not checked.
pub fn generate_chat_id() -> String {
    // 122 random bits; nine base-36 digits use under 47 of them
    let mut bits = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(9);
    for _ in 0..9 {
        suffix.push(BASE36[(bits % 36) as usize] as char);
        bits /= 36;
    }
    format!("chat_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Creates a chat against a registered endpoint, seeding it with remote
/// history when an existing `chat_id` is reused and auto-load is on.
pub async fn create_chat(state: &AppState, new: NewChat) -> AppResult<Chat> {
    let title = new.title.trim();
    if title.is_empty() || new.endpoint_id.is_empty() {
        return Err(AppError::Validation(
            "Please enter a title and select an endpoint".to_string(),
        ));
    }

    let endpoint = state
        .endpoints
        .lock()
        .await
        .get(&new.endpoint_id)
        .cloned()
        .ok_or_else(|| AppError::EndpointNotFound(new.endpoint_id.clone()))?;
    let history_config = config::load_history_config(&state.storage).await?;

    let supplied_id = new
        .chat_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let messages = match &supplied_id {
        Some(chat_id) if history_config.auto_load_history => {
            history::reconcile(
                state.api_provider.as_ref(),
                chat_id,
                &endpoint.url,
                endpoint.api_key.as_deref(),
            )
            .await
        }
        _ => Vec::new(),
    };

    let now = Utc::now();
    let chat = Chat {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        endpoint_id: endpoint.id.clone(),
        endpoint_name: endpoint.name.clone(),
        chat_id: supplied_id.unwrap_or_else(generate_chat_id),
        messages,
        created_at: now,
        last_message_at: now,
        history_mode: new.history_mode.unwrap_or(history_config.history_mode),
    };
    log::info!(
        "Created chat {} ('{}') on endpoint {} with {} preloaded messages",
        chat.id,
        chat.title,
        endpoint.name,
        chat.messages.len()
    );

    state.chats.lock().await.insert(chat.clone()).await?;
    Ok(chat)
}

pub async fn delete_chat(state: &AppState, id: &str) -> AppResult<bool> {
    log::warn!("Deleting chat {}", id);
    Ok(state.chats.lock().await.remove(id).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HistoryConfig, HistoryMode, NewEndpoint, Role};
    use crate::state::test_state;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn add_endpoint(state: &AppState, url: &str) -> String {
        state
            .endpoints
            .lock()
            .await
            .add(NewEndpoint {
                name: "Flow".into(),
                url: url.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[test]
    fn generated_chat_ids_follow_the_pattern() {
        let id = generate_chat_id();
        let parts: Vec<_> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "chat");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn generated_suffixes_use_the_whole_alphabet_at_every_position() {
        let ids: Vec<String> = (0..500).map(|_| generate_chat_id()).collect();
        for position in 0..9 {
            let seen: std::collections::HashSet<char> = ids
                .iter()
                .map(|id| id.rsplit('_').next().unwrap().chars().nth(position).unwrap())
                .collect();
            assert!(seen.len() > 24, "position {} only saw {} symbols", position, seen.len());
        }
    }

    #[tokio::test]
    async fn create_requires_title_and_endpoint() {
        let state = test_state().await;
        let err = create_chat(
            &state,
            NewChat {
                title: "  ".into(),
                endpoint_id: "x".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = create_chat(
            &state,
            NewChat {
                title: "Hi".into(),
                endpoint_id: "missing".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::EndpointNotFound(_)));
        assert!(state.chats.lock().await.list().is_empty());
    }

    #[tokio::test]
    async fn new_chats_use_configured_mode_and_go_first() {
        let state = test_state().await;
        config::save_history_config(
            &state.storage,
            &HistoryConfig {
                history_mode: HistoryMode::Server,
                auto_load_history: true,
            },
        )
        .await
        .unwrap();
        let endpoint_id = add_endpoint(&state, "https://flowise.invalid/api/v1/prediction/x").await;

        let first = create_chat(
            &state,
            NewChat {
                title: "One".into(),
                endpoint_id: endpoint_id.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let second = create_chat(
            &state,
            NewChat {
                title: "Two".into(),
                endpoint_id,
                history_mode: Some(HistoryMode::Client),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(first.history_mode, HistoryMode::Server);
        assert_eq!(second.history_mode, HistoryMode::Client);
        assert!(first.chat_id.starts_with("chat_"));
        assert!(first.messages.is_empty());

        let chats = state.chats.lock().await;
        assert_eq!(chats.list()[0].id, second.id);
        assert_eq!(chats.list()[1].id, first.id);
    }

    #[tokio::test]
    async fn supplied_chat_id_preloads_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("chatId", "existing-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
                {"role": "userMessage", "content": "earlier question"},
                {"role": "apiMessage", "content": "earlier answer"}
            ]})))
            .expect(1)
            .mount(&server)
            .await;

        let state = test_state().await;
        let url = format!("{}/api/v1/prediction/flow", server.uri());
        let endpoint_id = add_endpoint(&state, &url).await;

        let chat = create_chat(
            &state,
            NewChat {
                title: "Resume".into(),
                endpoint_id,
                chat_id: Some(" existing-1 ".into()),
                history_mode: Some(HistoryMode::Server),
            },
        )
        .await
        .unwrap();

        assert_eq!(chat.chat_id, "existing-1");
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, Role::User);
        assert_eq!(chat.messages[1].content, "earlier answer");
    }

    #[tokio::test]
    async fn auto_load_off_skips_history_fetch() {
        let server = MockServer::start().await;
        let state = test_state().await;
        config::save_history_config(
            &state.storage,
            &HistoryConfig {
                history_mode: HistoryMode::Client,
                auto_load_history: false,
            },
        )
        .await
        .unwrap();
        let url = format!("{}/api/v1/prediction/flow", server.uri());
        let endpoint_id = add_endpoint(&state, &url).await;

        let chat = create_chat(
            &state,
            NewChat {
                title: "Resume".into(),
                endpoint_id,
                chat_id: Some("existing-1".into()),
                history_mode: None,
            },
        )
        .await
        .unwrap();

        assert!(chat.messages.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_endpoint_leaves_chat_dangling_and_name_stale() {
        let state = test_state().await;
        let endpoint_id = add_endpoint(&state, "https://flowise.invalid/api/v1/prediction/x").await;
        let chat = create_chat(
            &state,
            NewChat {
                title: "Kept".into(),
                endpoint_id: endpoint_id.clone(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        {
            let mut endpoints = state.endpoints.lock().await;
            let mut renamed = endpoints.get(&endpoint_id).cloned().unwrap();
            renamed.name = "Renamed".into();
            endpoints.update(renamed).await.unwrap();
        }
        assert_eq!(state.chats.lock().await.get(&chat.id).unwrap().endpoint_name, "Flow");

        assert!(state.endpoints.lock().await.delete(&endpoint_id).await.unwrap());
        let chats = state.chats.lock().await;
        let kept = chats.get(&chat.id).unwrap();
        assert_eq!(kept.endpoint_id, endpoint_id);
        assert_eq!(kept.endpoint_name, "Flow");
    }

    #[tokio::test]
    async fn delete_chat_reports_whether_it_existed() {
        let state = test_state().await;
        let endpoint_id = add_endpoint(&state, "https://flowise.invalid/api/v1/prediction/x").await;
        let chat = create_chat(
            &state,
            NewChat {
                title: "Gone".into(),
                endpoint_id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(delete_chat(&state, &chat.id).await.unwrap());
        assert!(!delete_chat(&state, &chat.id).await.unwrap());

        let reloaded = ChatStore::load(state.storage.clone()).await.unwrap();
        assert!(reloaded.list().is_empty());
    }
}
