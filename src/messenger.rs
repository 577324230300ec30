use std::time::Duration;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId, ParseMode, Recipient};
use teloxide::RequestError;
use tracing::warn;

use crate::db::models::{MediaKind, PendingMedia};
use crate::errors::{BotError, BotResult};
use crate::utils::http::download_bytes;
use crate::utils::thumbnail::prepare_thumbnail;

const SEND_RETRY_ATTEMPTS: usize = 3;

/// Caption to attach to a relayed media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub text: String,
    pub html: bool,
}

/// Outbound calls the engines need from the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends `media`, with `cover` attached as its thumbnail when given.
    async fn send_media(
        &self,
        chat_id: i64,
        media: &PendingMedia,
        cover: Option<&str>,
        caption: Option<&Caption>,
    ) -> BotResult<i32>;

    async fn copy_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32)
        -> BotResult<i32>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()>;

    /// Whether `user_id` is currently present in `channel` (an id or `@username`).
    async fn chat_member_status(&self, channel: &str, user_id: i64) -> BotResult<bool>;
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        TelegramMessenger { bot }
    }

    async fn download_file(&self, file_id: &str) -> BotResult<Vec<u8>> {
        let file = self.bot.get_file(FileId(file_id.to_string())).await?;
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        );
        download_bytes(&url).await
    }

    async fn fetch_thumbnail(&self, cover: &str) -> BotResult<InputFile> {
        let bytes = self.download_file(cover).await?;
        let thumbnail = prepare_thumbnail(&bytes)?;
        Ok(InputFile::memory(thumbnail).file_name("cover.jpg"))
    }

    /// Thumbnails only apply to multipart uploads, so media that gets a cover
    /// is downloaded and uploaded again instead of being sent by `file_id`.
    async fn media_input(&self, media: &PendingMedia, with_cover: bool) -> BotResult<InputFile> {
        if !with_cover {
            return Ok(InputFile::file_id(FileId(media.file_id.clone())));
        }
        let bytes = self.download_file(&media.file_id).await?;
        let file_name = media
            .file_name
            .clone()
            .unwrap_or_else(|| media.kind.default_file_name().to_string());
        Ok(InputFile::memory(bytes).file_name(file_name))
    }

    async fn send_media_once(
        &self,
        chat: ChatId,
        kind: MediaKind,
        input: InputFile,
        thumbnail: Option<InputFile>,
        caption: Option<&Caption>,
    ) -> Result<Message, RequestError> {
        let text = caption.map(|caption| caption.text.clone());
        let parse_mode = caption
            .filter(|caption| caption.html)
            .map(|_| ParseMode::Html);

        match kind {
            MediaKind::Video => {
                let mut request = self.bot.send_video(chat, input).supports_streaming(true);
                if let Some(thumbnail) = thumbnail {
                    request = request.thumbnail(thumbnail);
                }
                if let Some(text) = text {
                    request = request.caption(text);
                }
                if let Some(mode) = parse_mode {
                    request = request.parse_mode(mode);
                }
                request.await
            }
            MediaKind::Document => {
                let mut request = self.bot.send_document(chat, input);
                if let Some(thumbnail) = thumbnail {
                    request = request.thumbnail(thumbnail);
                }
                if let Some(text) = text {
                    request = request.caption(text);
                }
                if let Some(mode) = parse_mode {
                    request = request.parse_mode(mode);
                }
                request.await
            }
            MediaKind::Audio => {
                let mut request = self.bot.send_audio(chat, input);
                if let Some(thumbnail) = thumbnail {
                    request = request.thumbnail(thumbnail);
                }
                if let Some(text) = text {
                    request = request.caption(text);
                }
                if let Some(mode) = parse_mode {
                    request = request.parse_mode(mode);
                }
                request.await
            }
        }
    }
}

fn telegram_retryable_error(err: &RequestError) -> bool {
    matches!(
        err,
        RequestError::Network(_) | RequestError::RetryAfter(_) | RequestError::Io(_)
    )
}

pub fn channel_recipient(channel: &str) -> Recipient {
    let trimmed = channel.trim();
    match trimmed.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => {
            let name = trimmed.trim_start_matches('@');
            Recipient::ChannelUsername(format!("@{name}"))
        }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_media(
        &self,
        chat_id: i64,
        media: &PendingMedia,
        cover: Option<&str>,
        caption: Option<&Caption>,
    ) -> BotResult<i32> {
        let input = self.media_input(media, cover.is_some()).await?;
        let thumbnail = match cover {
            Some(cover) => Some(self.fetch_thumbnail(cover).await?),
            None => None,
        };

        let mut delay = Duration::from_secs_f32(1.5);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .send_media_once(
                    ChatId(chat_id),
                    media.kind,
                    input.clone(),
                    thumbnail.clone(),
                    caption,
                )
                .await
            {
                Ok(message) => return Ok(message.id.0),
                Err(err) => {
                    if !telegram_retryable_error(&err) || attempt == SEND_RETRY_ATTEMPTS {
                        return Err(err.into());
                    }
                    warn!(
                        "send_{} attempt {attempt} failed: {err}",
                        media.kind.label()
                    );
                    if let RequestError::RetryAfter(wait) = err {
                        tokio::time::sleep(wait.duration()).await;
                    } else {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
    }

    async fn copy_message(
        &self,
        to_chat_id: i64,
        from_chat_id: i64,
        message_id: i32,
    ) -> BotResult<i32> {
        let copied = self
            .bot
            .copy_message(ChatId(to_chat_id), ChatId(from_chat_id), MessageId(message_id))
            .await?;
        Ok(copied.0)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn chat_member_status(&self, channel: &str, user_id: i64) -> BotResult<bool> {
        let user = u64::try_from(user_id)
            .map_err(|_| BotError::InvalidInput(format!("invalid user id {user_id}")))?;
        let member = self
            .bot
            .get_chat_member(channel_recipient(channel), UserId(user))
            .await?;
        Ok(member.kind.is_present())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_channels_resolve_to_chat_ids() {
        assert_eq!(
            channel_recipient("-1001234"),
            Recipient::Id(ChatId(-1001234))
        );
    }

    #[test]
    fn channel_names_gain_a_single_at_sign() {
        assert_eq!(
            channel_recipient("@updates"),
            Recipient::ChannelUsername("@updates".to_string())
        );
        assert_eq!(
            channel_recipient("updates"),
            Recipient::ChannelUsername("@updates".to_string())
        );
    }
}
