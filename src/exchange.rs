use crate::api::PredictionRequest;
use crate::error::{AppError, AppResult};
use crate::models::{Chat, ChatMessage, Role};
use crate::state::AppState;
use dashmap::DashMap;
use std::sync::Arc;

// Removes the chat from the in-flight set however the send ends
struct InFlightGuard {
    in_flight: Arc<DashMap<String, ()>>,
    chat_id: String,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<DashMap<String, ()>>, chat_id: &str) -> Option<Self> {
        if in_flight.insert(chat_id.to_string(), ()).is_some() {
            return None;
        }
        Some(Self {
            in_flight: in_flight.clone(),
            chat_id: chat_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.chat_id);
    }
}

/// Sends `text` to the chat's endpoint and records both sides of the turn.
///
/// The user message is stored before the request goes out. Whatever happens
/// remotely, an assistant message is appended: the reply, or `Error: ...`.
/// Only local problems (blank text, unknown chat, a send already running,
/// storage failures) are returned as errors.
pub async fn send_message(state: &AppState, id: &str, text: &str) -> AppResult<Chat> {
    let question = text.trim();
    if question.is_empty() {
        return Err(AppError::Validation("Message cannot be empty".to_string()));
    }

    let Some(_guard) = InFlightGuard::acquire(&state.in_flight, id) else {
        return Err(AppError::Busy(id.to_string()));
    };

    // --- Optimistic append of the user message ---
    let (request, endpoint_id) = {
        let mut chats = state.chats.lock().await;
        let chat = chats.get(id).ok_or_else(|| AppError::ChatNotFound(id.to_string()))?;
        let request = PredictionRequest::for_mode(
            question,
            &chat.chat_id,
            chat.history_mode,
            &chat.messages,
        );
        let endpoint_id = chat.endpoint_id.clone();

        chats
            .append_message(id, ChatMessage::new(Role::User, question))
            .await?;
        (request, endpoint_id)
    };

    let endpoint = state.endpoints.lock().await.get(&endpoint_id).cloned();

    // --- Remote call ---
    let content = match endpoint {
        None => {
            log::error!("Chat {} points at missing endpoint {}", id, endpoint_id);
            "Error: Endpoint not found".to_string()
        }
        Some(endpoint) => match state.api_provider.predict(&endpoint.url, &request).await {
            Ok(reply) => reply.content(),
            Err(e) => {
                log::error!("Send failed for chat {}: {}", id, e);
                format!("Error: {}", e)
            }
        },
    };

    // --- Record the reply ---
    let mut chats = state.chats.lock().await;
    match chats
        .append_message(id, ChatMessage::new(Role::Assistant, content))
        .await?
    {
        Some(chat) => Ok(chat),
        None => {
            log::warn!("Chat {} was deleted before its reply arrived; dropping reply", id);
            Err(AppError::ChatNotFound(id.to_string()))
        }
    }
}
