use std::time::Duration;

use teloxide::{ApiError, RequestError};
use thiserror::Error;

/// Failures surfaced by the store, the engines and the outbound transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BotError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limited, retry after {}s", .0.as_secs())]
    RateLimited(Duration),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("insufficient rights: {0}")]
    PermissionDenied(String),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type BotResult<T> = Result<T, BotError>;

const PRIVILEGE_MARKERS: [&str; 5] = [
    "member list is inaccessible",
    "not enough rights",
    "chat_admin_required",
    "need administrator rights",
    "bot is not a member",
];

fn is_privilege_error(text: &str) -> bool {
    let lowered = text.to_lowercase();
    PRIVILEGE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn classify_api_error(err: ApiError) -> BotError {
    let text = err.to_string();
    match err {
        ApiError::BotBlocked
        | ApiError::BotKicked
        | ApiError::ChatNotFound
        | ApiError::UserNotFound
        | ApiError::UserDeactivated
        | ApiError::MessageToDeleteNotFound => BotError::NotFound(text),
        _ if is_privilege_error(&text) => BotError::PermissionDenied(text),
        _ => BotError::Transport(text),
    }
}

impl From<RequestError> for BotError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(wait) => BotError::RateLimited(wait.duration()),
            RequestError::Api(api) => classify_api_error(api),
            other => BotError::Transport(other.to_string()),
        }
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Storage(err.to_string())
    }
}
