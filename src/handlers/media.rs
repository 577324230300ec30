use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ReplyParameters};
use tracing::warn;

use crate::db::models::{MediaKind, PendingMedia};
use crate::handlers::access::{check_sender, ensure_subscribed};
use crate::handlers::responses::{
    cover_keyboard, image_outcome_text, media_outcome_text, reply_text, user_error_message,
};
use crate::relay::{ImageOutcome, MediaOutcome};
use crate::state::AppState;
use crate::utils::telegram::{start_chat_action_heartbeat, upload_action_for};
use crate::utils::timing::{complete_command_timer, start_command_timer};

/// File id of the largest size of the photo attached to `message`.
pub fn cover_file_id(message: &Message) -> Option<String> {
    message
        .photo()?
        .iter()
        .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
        .map(|size| size.file.id.0.clone())
}

/// The video, document or audio attached to `message`, with its caption.
pub fn relay_media(message: &Message) -> Option<PendingMedia> {
    let caption = message.caption().map(|text| text.to_string());
    let (kind, file_id, file_name) = if let Some(video) = message.video() {
        (MediaKind::Video, video.file.id.0.clone(), video.file_name.clone())
    } else if let Some(document) = message.document() {
        (
            MediaKind::Document,
            document.file.id.0.clone(),
            document.file_name.clone(),
        )
    } else if let Some(audio) = message.audio() {
        (MediaKind::Audio, audio.file.id.0.clone(), audio.file_name.clone())
    } else {
        return None;
    };
    Some(PendingMedia {
        kind,
        file_id,
        file_name,
        caption,
    })
}

pub async fn image_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(image_ref) = cover_file_id(&message) else {
        return Ok(());
    };
    let Some((user_id, role)) = check_sender(&bot, &state, &message).await? else {
        return Ok(());
    };

    let mut timer = start_command_timer("cover", &message);
    let pending = state
        .store
        .get(user_id)
        .and_then(|record| record.pending_video)
        .map(|media| media.kind);
    let _heartbeat = pending.map(|kind| {
        start_chat_action_heartbeat(bot.clone(), message.chat.id, upload_action_for(kind))
    });

    match state
        .relay
        .on_image(user_id, message.chat.id.0, &image_ref, role)
        .await
    {
        Ok(ImageOutcome::CoverSaved) => {
            complete_command_timer(&mut timer, "success", None);
            bot.send_message(message.chat.id, image_outcome_text(&ImageOutcome::CoverSaved))
                .reply_parameters(ReplyParameters::new(message.id))
                .reply_markup(cover_keyboard())
                .await?;
        }
        Ok(outcome) => {
            let status = match outcome {
                ImageOutcome::QueuedFailed { .. } => "error",
                _ => "success",
            };
            complete_command_timer(&mut timer, status, None);
            reply_text(&bot, &message, image_outcome_text(&outcome)).await?;
        }
        Err(err) => {
            warn!("Saving cover for {user_id} failed: {err}");
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            let text = format!("⚠️ Failed to save cover. {}", user_error_message(&err));
            reply_text(&bot, &message, text).await?;
        }
    }
    Ok(())
}

pub async fn media_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(media) = relay_media(&message) else {
        return Ok(());
    };
    let Some((user_id, role)) = check_sender(&bot, &state, &message).await? else {
        return Ok(());
    };
    if !ensure_subscribed(&bot, &state, &message, user_id, role).await? {
        return Ok(());
    }

    let mut timer = start_command_timer(media.kind.label(), &message);
    let kind = media.kind;
    let action = if state.covers.get_cover(user_id).is_some() {
        upload_action_for(kind)
    } else {
        ChatAction::Typing
    };
    let heartbeat = start_chat_action_heartbeat(bot.clone(), message.chat.id, action);

    let result = state
        .relay
        .on_media(user_id, message.chat.id.0, media, role)
        .await;
    drop(heartbeat);

    let text = match result {
        Ok(outcome) => {
            let status = match outcome {
                MediaOutcome::Failed { .. } => "error",
                _ => "success",
            };
            complete_command_timer(&mut timer, status, None);
            media_outcome_text(&outcome, kind)
        }
        Err(err) => {
            warn!("Handling {} from {user_id} failed: {err}", kind.label());
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            Some(user_error_message(&err))
        }
    };
    if let Some(text) = text {
        reply_text(&bot, &message, text).await?;
    }
    Ok(())
}
