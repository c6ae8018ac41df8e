use crate::models::{HistoryConfig, WhisperConfig};
use crate::storage::{keys, StorageManager};
use anyhow::Result;

// --- Chat history defaults ---

/// History settings applied to new chats, or the defaults if none were saved.
pub async fn load_history_config(storage: &StorageManager) -> Result<HistoryConfig> {
    storage.get_json_or_default(keys::HISTORY_CONFIG).await
}

pub async fn save_history_config(storage: &StorageManager, config: &HistoryConfig) -> Result<()> {
    log::info!(
        "Saving history config: mode={:?}, auto_load={}",
        config.history_mode,
        config.auto_load_history
    );
    storage.set_json(keys::HISTORY_CONFIG, config).await
}

// --- Whisper settings ---

pub async fn load_whisper_config(storage: &StorageManager) -> Result<WhisperConfig> {
    storage.get_json_or_default(keys::WHISPER_CONFIG).await
}

pub async fn save_whisper_config(storage: &StorageManager, config: &WhisperConfig) -> Result<()> {
    storage.set_json(keys::WHISPER_CONFIG, config).await
}

// --- OpenAI API key ---

/// The stored OpenAI key, if one has been configured.
/// Blank values count as not configured.
pub async fn get_openai_api_key(storage: &StorageManager) -> Result<Option<String>> {
    let key = storage.get_item(keys::OPENAI_API_KEY).await?;
    Ok(key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty()))
}

/// Stores the OpenAI key under its own entry. An empty key clears it.
pub async fn set_openai_api_key(storage: &StorageManager, api_key: &str) -> Result<()> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        log::info!("Clearing stored OpenAI API key");
        return storage.remove_item(keys::OPENAI_API_KEY).await;
    }
    log::info!("Storing OpenAI API key");
    storage.set_item(keys::OPENAI_API_KEY, api_key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HistoryMode;

    #[tokio::test]
    async fn unset_configs_fall_back_to_defaults() {
        let storage = StorageManager::in_memory().await.unwrap();

        assert_eq!(load_history_config(&storage).await.unwrap(), HistoryConfig::default());
        assert_eq!(load_whisper_config(&storage).await.unwrap(), WhisperConfig::default());
        assert!(get_openai_api_key(&storage).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_config_round_trips_through_storage() {
        let storage = StorageManager::in_memory().await.unwrap();
        let config = HistoryConfig {
            history_mode: HistoryMode::Server,
            auto_load_history: false,
        };
        save_history_config(&storage, &config).await.unwrap();

        assert_eq!(load_history_config(&storage).await.unwrap(), config);
    }

    #[tokio::test]
    async fn partial_history_config_falls_back_to_defaults() {
        let storage = StorageManager::in_memory().await.unwrap();
        storage
            .set_item(keys::HISTORY_CONFIG, r#"{"historyMode":"server""#)
            .await
            .unwrap();

        assert_eq!(load_history_config(&storage).await.unwrap(), HistoryConfig::default());
        assert!(storage
            .get_item("flowise-history-config.corrupt")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn api_key_is_kept_apart_from_whisper_config() {
        let storage = StorageManager::in_memory().await.unwrap();
        save_whisper_config(&storage, &WhisperConfig::default()).await.unwrap();
        set_openai_api_key(&storage, "  sk-test  ").await.unwrap();

        let raw = storage.get_item(keys::WHISPER_CONFIG).await.unwrap().unwrap();
        assert!(!raw.contains("sk-test"));
        assert_eq!(get_openai_api_key(&storage).await.unwrap().as_deref(), Some("sk-test"));

        set_openai_api_key(&storage, "").await.unwrap();
        assert!(get_openai_api_key(&storage).await.unwrap().is_none());
    }
}
