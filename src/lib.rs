//! Native core of a mobile chat client for Flowise endpoints, with Whisper
//! voice input. With the `app` feature it also builds the Tauri shell that
//! serves the webview front-end.

pub mod api;
pub mod config;
pub mod error;
pub mod exchange;
pub mod history;
pub mod models;
pub mod registry;
pub mod sessions;
pub mod state;
pub mod storage;
pub mod transcription;
pub mod voice;

#[cfg(feature = "app")]
pub mod commands;

/// Initialises `env_logger`, defaulting to `info` unless `RUST_LOG` says
/// otherwise. Safe to call more than once.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

#[cfg(feature = "app")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use crate::api::{FlowiseApi, FlowiseClient};
    use crate::state::AppState;
    use crate::storage::StorageManager;
    use crate::transcription::WhisperClient;
    use crate::voice::PushedAudioDevices;
    use std::sync::Arc;
    use tauri::Manager;

    init_logging();

    tauri::Builder::default()
        .setup(|app| {
            // setup is synchronous, loading the stores is not; block once here
            let db_path = app
                .path()
                .resolve("flowchat.sqlite", tauri::path::BaseDirectory::AppLocalData)?;
            let api_provider: Arc<dyn FlowiseApi> = Arc::new(FlowiseClient::new());

            let app_state = tauri::async_runtime::block_on(async {
                let storage = StorageManager::new(&db_path).await?;
                AppState::load(
                    storage,
                    api_provider,
                    WhisperClient::new(),
                    Arc::new(PushedAudioDevices),
                )
                .await
            })?;

            app.manage(app_state);
            Ok(())
        })
        .plugin(tauri_plugin_dialog::init())
        .invoke_handler(tauri::generate_handler![
            commands::list_endpoints,
            commands::add_endpoint,
            commands::update_endpoint,
            commands::delete_endpoint,
            commands::test_endpoint,
            commands::list_chats,
            commands::create_chat,
            commands::delete_chat,
            commands::send_message,
            commands::refresh_history,
            commands::get_history_config,
            commands::set_history_config,
            commands::get_whisper_config,
            commands::set_whisper_config,
            commands::has_openai_api_key,
            commands::set_openai_api_key,
            commands::recorder_status,
            commands::start_recording,
            commands::push_audio_chunk,
            commands::stop_recording
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
