// Tauri commands exposed to the webview front-end

use crate::api::EndpointTestResult;
use crate::config;
use crate::exchange;
use crate::history;
use crate::models::{Chat, Endpoint, HistoryConfig, NewChat, NewEndpoint, WhisperConfig};
use crate::sessions;
use crate::state::AppState;
use crate::voice::{format_duration, RecordingState};
use serde::Serialize;
use tauri::State;

// --- Endpoint Commands ---

#[tauri::command]
pub async fn list_endpoints(state: State<'_, AppState>) -> Result<Vec<Endpoint>, String> {
    log::info!("Frontend requested to list endpoints");
    Ok(state.endpoints.lock().await.list().to_vec())
}

#[tauri::command]
pub async fn add_endpoint(
    state: State<'_, AppState>,
    endpoint: NewEndpoint,
) -> Result<Endpoint, String> {
    log::info!("Frontend requested to add endpoint: {}", endpoint.name);
    let mut endpoints = state.endpoints.lock().await;
    endpoints
        .add(endpoint)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn update_endpoint(
    state: State<'_, AppState>,
    endpoint: Endpoint,
) -> Result<Endpoint, String> {
    log::info!("Frontend requested to update endpoint: {}", endpoint.id);
    let mut endpoints = state.endpoints.lock().await;
    endpoints
        .update(endpoint)
        .await
        .map_err(|e| format!("Failed to update endpoint: {}", e))
}

#[tauri::command]
pub async fn delete_endpoint(
    state: State<'_, AppState>,
    endpoint_id: String,
) -> Result<bool, String> {
    log::warn!("Frontend requested to delete endpoint ID: {}", endpoint_id);
    let mut endpoints = state.endpoints.lock().await;
    endpoints
        .delete(&endpoint_id)
        .await
        .map_err(|e| format!("Failed to delete endpoint: {}", e))
}

/// Posts a hand-written JSON body to an endpoint and shows the raw result.
#[tauri::command]
pub async fn test_endpoint(
    state: State<'_, AppState>,
    endpoint_id: String,
    payload: String,
) -> Result<EndpointTestResult, String> {
    if endpoint_id.is_empty() || payload.trim().is_empty() {
        return Err("Please select an endpoint and provide test data".to_string());
    }
    let Some(endpoint) = state.endpoints.lock().await.get(&endpoint_id).cloned() else {
        return Err(format!("Endpoint {} not found", endpoint_id));
    };
    Ok(state.api_provider.send_raw(&endpoint.url, &payload).await)
}

// --- Chat Commands ---

#[tauri::command]
pub async fn list_chats(state: State<'_, AppState>) -> Result<Vec<Chat>, String> {
    log::info!("Frontend requested to list chats");
    Ok(state.chats.lock().await.list().to_vec())
}

#[tauri::command]
pub async fn create_chat(state: State<'_, AppState>, chat: NewChat) -> Result<Chat, String> {
    log::info!("Frontend requested to create chat '{}'", chat.title);
    sessions::create_chat(&state, chat).await.map_err(|e| {
        log::error!("Failed to create chat: {}", e);
        e.to_string()
    })
}

#[tauri::command]
pub async fn delete_chat(state: State<'_, AppState>, chat_id: String) -> Result<bool, String> {
    sessions::delete_chat(&state, &chat_id)
        .await
        .map_err(|e| format!("Failed to delete chat: {}", e))
}

// Remote failures come back inside the chat as an assistant message
#[tauri::command]
pub async fn send_message(
    state: State<'_, AppState>,
    chat_id: String,
    content: String,
) -> Result<Chat, String> {
    log::info!("Frontend requested to send message to chat ID: {}", chat_id);
    exchange::send_message(&state, &chat_id, &content)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn refresh_history(state: State<'_, AppState>, chat_id: String) -> Result<Chat, String> {
    log::info!("Frontend requested history refresh for chat ID: {}", chat_id);
    history::refresh_history(&state, &chat_id)
        .await
        .map_err(|e| e.to_string())
}

// --- Settings Commands ---

#[tauri::command]
pub async fn get_history_config(state: State<'_, AppState>) -> Result<HistoryConfig, String> {
    config::load_history_config(&state.storage)
        .await
        .map_err(|e| format!("Failed to load history settings: {}", e))
}

#[tauri::command]
pub async fn set_history_config(
    state: State<'_, AppState>,
    config: HistoryConfig,
) -> Result<(), String> {
    config::save_history_config(&state.storage, &config)
        .await
        .map_err(|e| format!("Failed to save history settings: {}", e))
}

#[tauri::command]
pub async fn get_whisper_config(state: State<'_, AppState>) -> Result<WhisperConfig, String> {
    config::load_whisper_config(&state.storage)
        .await
        .map_err(|e| format!("Failed to load Whisper settings: {}", e))
}

#[tauri::command]
pub async fn set_whisper_config(
    state: State<'_, AppState>,
    config: WhisperConfig,
) -> Result<(), String> {
    config::save_whisper_config(&state.storage, &config)
        .await
        .map_err(|e| format!("Failed to save Whisper settings: {}", e))
}

#[tauri::command]
pub async fn has_openai_api_key(state: State<'_, AppState>) -> Result<bool, String> {
    config::get_openai_api_key(&state.storage)
        .await
        .map(|key| key.is_some())
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn set_openai_api_key(state: State<'_, AppState>, api_key: String) -> Result<(), String> {
    config::set_openai_api_key(&state.storage, &api_key)
        .await
        .map_err(|e| format!("Failed to save API key: {}", e))
}

// --- Voice Commands ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderStatus {
    state: RecordingState,
    elapsed_secs: u64,
    elapsed: String,
}

#[tauri::command]
pub async fn recorder_status(state: State<'_, AppState>) -> Result<RecorderStatus, String> {
    let elapsed_secs = state.recorder.elapsed_secs();
    Ok(RecorderStatus {
        state: state.recorder.state().await,
        elapsed_secs,
        elapsed: format_duration(elapsed_secs),
    })
}

#[tauri::command]
pub async fn start_recording(state: State<'_, AppState>) -> Result<(), String> {
    state
        .recorder
        .start()
        .await
        .map_err(|e| format!("Microphone access error: {}", e))
}

#[tauri::command]
pub async fn push_audio_chunk(state: State<'_, AppState>, chunk: Vec<u8>) -> Result<(), String> {
    state.recorder.push_chunk(&chunk).await.map_err(|e| e.to_string())
}

/// Stops recording and returns the transcribed text.
#[tauri::command]
pub async fn stop_recording(state: State<'_, AppState>) -> Result<String, String> {
    state
        .recorder
        .stop_and_transcribe(&state.transcriber, &state.storage)
        .await
}
