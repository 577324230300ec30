use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use tracing::warn;

use crate::errors::{BotError, BotResult};

const DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const DOWNLOAD_BASE_DELAY_MS: u64 = 400;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

pub fn get_http_client() -> &'static Client {
    &HTTP_CLIENT
}

fn should_retry_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Fetches a file body, retrying timeouts, connect failures and 5xx/429 responses.
pub async fn download_bytes(url: &str) -> BotResult<Vec<u8>> {
    let client = get_http_client();
    let mut last_error = String::new();
    for attempt in 0..DOWNLOAD_MAX_ATTEMPTS {
        let delay = Duration::from_millis(DOWNLOAD_BASE_DELAY_MS << attempt);
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|err| BotError::Transport(err.without_url().to_string()))?;
                return Ok(bytes.to_vec());
            }
            Ok(response) => {
                let status = response.status();
                warn!(
                    "File download failed with status {} (attempt={}/{})",
                    status,
                    attempt + 1,
                    DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = format!("download failed with status {status}");
                if status == StatusCode::NOT_FOUND {
                    return Err(BotError::NotFound(last_error));
                }
                if !should_retry_status(status) {
                    break;
                }
            }
            Err(err) => {
                let retry = should_retry_error(&err);
                let (timeout, connect) = (err.is_timeout(), err.is_connect());
                // File URLs embed the bot token.
                let err = err.without_url();
                warn!(
                    "File download failed: {} (timeout={}, connect={}, attempt={}/{})",
                    err,
                    timeout,
                    connect,
                    attempt + 1,
                    DOWNLOAD_MAX_ATTEMPTS
                );
                last_error = err.to_string();
                if !retry {
                    break;
                }
            }
        }
        if attempt + 1 < DOWNLOAD_MAX_ATTEMPTS {
            tokio::time::sleep(delay).await;
        }
    }
    Err(BotError::Transport(last_error))
}
