use thiserror::Error;

/// Errors surfaced to the user by chat and endpoint operations.
///
/// Remote failures during a send never show up here; they become assistant
/// messages instead (see `exchange::send_message`).
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or blank required input. Nothing was changed.
    #[error("{0}")]
    Validation(String),

    #[error("Chat {0} not found")]
    ChatNotFound(String),

    #[error("Endpoint {0} not found")]
    EndpointNotFound(String),

    #[error("A message is already being sent in chat {0}")]
    Busy(String),

    #[error("Chat {0} keeps its history on this device; nothing to refresh")]
    HistoryDisabled(String),

    #[error(
        "Could not load history. Check that the endpoint supports history \
         and that the API key is correct."
    )]
    HistoryUnavailable,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;
