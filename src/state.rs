use crate::api::FlowiseApi;
use crate::registry::EndpointRegistry;
use crate::sessions::ChatStore;
use crate::storage::StorageManager;
use crate::transcription::WhisperClient;
use crate::voice::{MediaDevices, VoiceRecorder};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

// Core application state shared by every command
#[derive(Clone)] // Allow cloning for background tasks
pub struct AppState {
    pub storage: Arc<StorageManager>,
    // Both stores cache their lists in memory and flush on every change
    pub endpoints: Arc<Mutex<EndpointRegistry>>,
    pub chats: Arc<Mutex<ChatStore>>,
    pub api_provider: Arc<dyn FlowiseApi>, // Hold the trait object
    pub transcriber: Arc<WhisperClient>,
    pub recorder: Arc<VoiceRecorder>,
    pub in_flight: Arc<DashMap<String, ()>>, // Chat ids with a send in progress
}

impl AppState {
    /// Loads endpoints and chats from storage and wires up the services.
    pub async fn load(
        storage: StorageManager,
        api_provider: Arc<dyn FlowiseApi>,
        transcriber: WhisperClient,
        devices: Arc<dyn MediaDevices>,
    ) -> Result<Self, anyhow::Error> {
        let storage = Arc::new(storage);
        let endpoints = EndpointRegistry::load(storage.clone()).await?;
        let chats = ChatStore::load(storage.clone()).await?;

        Ok(Self {
            storage,
            endpoints: Arc::new(Mutex::new(endpoints)),
            chats: Arc::new(Mutex::new(chats)),
            api_provider,
            transcriber: Arc::new(transcriber),
            recorder: Arc::new(VoiceRecorder::new(devices)),
            in_flight: Arc::new(DashMap::new()),
        })
    }
}

#[cfg(test)]
pub(crate) async fn test_state() -> AppState {
    test_state_with(Arc::new(crate::api::FlowiseClient::new())).await
}

#[cfg(test)]
pub(crate) async fn test_state_with(api_provider: Arc<dyn FlowiseApi>) -> AppState {
    use crate::voice::PushedAudioDevices;

    let storage = StorageManager::in_memory().await.unwrap();
    AppState::load(
        storage,
        api_provider,
        WhisperClient::new(),
        Arc::new(PushedAudioDevices),
    )
    .await
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FlowiseClient;
    use crate::storage::keys;
    use crate::voice::PushedAudioDevices;

    #[tokio::test]
    async fn loads_with_corrupt_chats_and_endpoints() {
        let storage = StorageManager::in_memory().await.unwrap();
        storage.set_item(keys::CHATS, "{not json").await.unwrap();
        storage.set_item(keys::ENDPOINTS, "[{\"id\": 1}").await.unwrap();

        let state = AppState::load(
            storage,
            Arc::new(FlowiseClient::new()),
            WhisperClient::new(),
            Arc::new(PushedAudioDevices),
        )
        .await
        .unwrap();

        assert!(state.chats.lock().await.list().is_empty());
        assert!(state.endpoints.lock().await.list().is_empty());
        assert_eq!(
            state.storage.get_item("flowise-chats.corrupt").await.unwrap().as_deref(),
            Some("{not json")
        );
        assert!(state
            .storage
            .get_item("flowise-endpoints.corrupt")
            .await
            .unwrap()
            .is_some());
    }
}
