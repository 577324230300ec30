use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode, ReplyParameters};
use tracing::{error, info, warn};

use crate::acl::{parse_user_id, Requirement, SetChange};
use crate::broadcast::{parse_delay, BroadcastSource};
use crate::cover::CoverDeletion;
use crate::db::models::StoreStats;
use crate::handlers::access::authorize_command;
use crate::handlers::responses::{
    admins_text, broadcast_text, cover_keyboard, help_text, reply_html, reply_text, start_text,
    stats_text, timed_broadcast_text, user_error_message, COVER_DELETE_CALLBACK,
    COVER_VIEW_CALLBACK,
};
use crate::relay::CoverRequest;
use crate::state::AppState;
use crate::utils::timing::{complete_command_timer, start_command_timer};

const NO_COVER_TEXT: &str = "❌ You don't have a saved cover. Send a photo to save one.";
const COVER_CAPTION: &str = "🖼️ Your saved cover";
const COVER_DELETED_TEXT: &str = "🗑️ Your cover has been deleted.";
const NOTHING_TO_DELETE_TEXT: &str = "ℹ️ You don't have a saved cover to delete.";

fn first_name(message: &Message) -> String {
    message
        .from
        .as_ref()
        .map(|user| {
            if !user.first_name.is_empty() {
                user.first_name.clone()
            } else {
                user.username.clone().unwrap_or_default()
            }
        })
        .unwrap_or_default()
}

pub async fn start_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "start", Requirement::Anyone).await?
    else {
        return Ok(());
    };
    state.store.ensure(decision.user_id).await?;

    bot.send_message(message.chat.id, start_text(&first_name(&message)))
        .reply_parameters(ReplyParameters::new(message.id))
        .parse_mode(ParseMode::Html)
        .reply_markup(cover_keyboard())
        .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "help", Requirement::Anyone).await?
    else {
        return Ok(());
    };
    reply_html(&bot, &message, help_text(decision.role)).await?;
    Ok(())
}

fn format_uptime(uptime: chrono::Duration) -> String {
    let total = uptime.num_seconds().max(0);
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

pub async fn ping_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if authorize_command(&bot, &state, &message, "ping", Requirement::Anyone)
        .await?
        .is_none()
    {
        return Ok(());
    }
    let started = Instant::now();
    let pending = reply_text(&bot, &message, "🏓 Ping...").await?;
    let elapsed_ms = started.elapsed().as_millis();
    let uptime = format_uptime(Utc::now() - state.started_at);
    bot.edit_message_text(
        message.chat.id,
        pending.id,
        format!("🏓 Pong! <code>{elapsed_ms} ms</code>\n⏱️ Uptime: {uptime}"),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}

pub async fn setcover_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "setcover", Requirement::Anyone).await?
    else {
        return Ok(());
    };
    let user_id = decision.user_id;
    let text = match state.relay.request_cover(user_id).await {
        Ok(CoverRequest::AwaitingCover) => {
            "📸 Send me the photo you want to use as your cover.".to_string()
        }
        Ok(CoverRequest::AlreadyQueued) => {
            "📸 You have a file waiting. Send a photo and I'll apply it as the cover.".to_string()
        }
        Err(err) => user_error_message(&err),
    };
    reply_text(&bot, &message, text).await?;
    Ok(())
}

async fn send_cover(bot: &Bot, state: &AppState, chat_id: ChatId, user_id: i64) -> Result<()> {
    match state.covers.get_cover(user_id) {
        Some(cover) => {
            bot.send_photo(chat_id, InputFile::file_id(FileId(cover)))
                .caption(COVER_CAPTION)
                .reply_markup(cover_keyboard())
                .await?;
        }
        None => {
            bot.send_message(chat_id, NO_COVER_TEXT).await?;
        }
    }
    Ok(())
}

async fn delete_cover_text(state: &AppState, user_id: i64) -> String {
    match state.covers.delete_cover(user_id).await {
        Ok(CoverDeletion::Deleted) => COVER_DELETED_TEXT.to_string(),
        Ok(CoverDeletion::NothingToDelete) => NOTHING_TO_DELETE_TEXT.to_string(),
        Err(err) => user_error_message(&err),
    }
}

pub async fn showcover_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "showcover", Requirement::Anyone).await?
    else {
        return Ok(());
    };
    let user_id = decision.user_id;
    if let Err(err) = send_cover(&bot, &state, message.chat.id, user_id).await {
        warn!("Showing cover for {user_id} failed: {err}");
        reply_text(&bot, &message, "⚠️ Couldn't show cover.").await?;
    }
    Ok(())
}

pub async fn delcover_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "delcover", Requirement::Anyone).await?
    else {
        return Ok(());
    };
    let user_id = decision.user_id;
    let text = delete_cover_text(&state, user_id).await;
    reply_text(&bot, &message, text).await?;
    Ok(())
}

pub async fn cover_callback(bot: Bot, state: AppState, query: CallbackQuery) -> Result<()> {
    let _ = bot.answer_callback_query(query.id.clone()).await;
    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let Ok(user_id) = i64::try_from(query.from.id.0) else {
        return Ok(());
    };
    if state.store.is_banned(user_id) {
        return Ok(());
    }
    let chat_id = query
        .message
        .as_ref()
        .map(|message| message.chat().id)
        .unwrap_or(ChatId(user_id));

    match data {
        COVER_VIEW_CALLBACK => send_cover(&bot, &state, chat_id, user_id).await?,
        COVER_DELETE_CALLBACK => {
            let text = delete_cover_text(&state, user_id).await;
            bot.send_message(chat_id, text).await?;
        }
        other => warn!("Unknown callback data {other}"),
    }
    Ok(())
}

fn usage_or_error(command: &str, err: &crate::errors::BotError) -> String {
    format!("{}\nUsage: /{command} <user_id>", user_error_message(err))
}

pub async fn addadmin_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: String,
) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "addadmin", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let user_id = match parse_user_id(&arg) {
        Ok(id) => id,
        Err(err) => {
            reply_text(&bot, &message, usage_or_error("addadmin", &err)).await?;
            return Ok(());
        }
    };
    match state.policy.add_admin(user_id).await {
        Ok(SetChange::Applied) => {
            info!("Admin {user_id} added by {}", decision.user_id);
            reply_html(&bot, &message, format!("✅ Added admin: <code>{user_id}</code>")).await?;
        }
        Ok(_) => {
            reply_text(&bot, &message, "⚠️ Already an admin.").await?;
        }
        Err(err) => {
            reply_text(&bot, &message, user_error_message(&err)).await?;
        }
    }
    Ok(())
}

pub async fn removeadmin_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: String,
) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "removeadmin", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let user_id = match parse_user_id(&arg) {
        Ok(id) => id,
        Err(err) => {
            reply_text(&bot, &message, usage_or_error("removeadmin", &err)).await?;
            return Ok(());
        }
    };
    match state.policy.remove_admin(user_id).await {
        Ok(SetChange::Applied) => {
            info!("Admin {user_id} removed by {}", decision.user_id);
            let text = format!("🗑️ Removed admin: <code>{user_id}</code>");
            reply_html(&bot, &message, text).await?;
        }
        Ok(SetChange::OwnerImmutable) => {
            reply_text(&bot, &message, "⚠️ Cannot remove owner.").await?;
        }
        Ok(SetChange::Unchanged) => {
            reply_text(&bot, &message, "⚠️ Not an admin.").await?;
        }
        Err(err) => {
            reply_text(&bot, &message, user_error_message(&err)).await?;
        }
    }
    Ok(())
}

pub async fn showadmins_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if authorize_command(&bot, &state, &message, "showadmins", Requirement::Admin)
        .await?
        .is_none()
    {
        return Ok(());
    }
    let text = admins_text(&state.policy.admins(), state.policy.owner_id());
    reply_html(&bot, &message, text).await?;
    Ok(())
}

pub async fn ban_handler(bot: Bot, state: AppState, message: Message, arg: String) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "ban", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let user_id = match parse_user_id(&arg) {
        Ok(id) => id,
        Err(err) => {
            reply_text(&bot, &message, usage_or_error("ban", &err)).await?;
            return Ok(());
        }
    };
    let text = match state.policy.ban(user_id).await {
        Ok(SetChange::Applied) => {
            info!("User {user_id} banned by {}", decision.user_id);
            format!("🚫 Banned <code>{user_id}</code>.")
        }
        Ok(SetChange::Unchanged) => format!("⚠️ <code>{user_id}</code> is already banned."),
        Ok(SetChange::OwnerImmutable) => "⚠️ Cannot ban the owner.".to_string(),
        Err(err) => user_error_message(&err),
    };
    reply_html(&bot, &message, text).await?;
    Ok(())
}

pub async fn unban_handler(bot: Bot, state: AppState, message: Message, arg: String) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "unban", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let user_id = match parse_user_id(&arg) {
        Ok(id) => id,
        Err(err) => {
            reply_text(&bot, &message, usage_or_error("unban", &err)).await?;
            return Ok(());
        }
    };
    let text = match state.policy.unban(user_id).await {
        Ok(SetChange::Applied) => {
            info!("User {user_id} unbanned by {}", decision.user_id);
            format!("✅ Unbanned <code>{user_id}</code>.")
        }
        Ok(_) => format!("⚠️ <code>{user_id}</code> is not banned."),
        Err(err) => user_error_message(&err),
    };
    reply_html(&bot, &message, text).await?;
    Ok(())
}

pub async fn users_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if authorize_command(&bot, &state, &message, "users", Requirement::Owner)
        .await?
        .is_none()
    {
        return Ok(());
    }
    let count = state.store.user_ids().len();
    reply_text(&bot, &message, format!("👥 Total users stored: {count}")).await?;
    Ok(())
}

pub async fn stats_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if authorize_command(&bot, &state, &message, "stats", Requirement::Owner)
        .await?
        .is_none()
    {
        return Ok(());
    }
    let stats = StoreStats {
        admins: state.policy.admins().len(),
        ..state.store.stats()
    };
    let text = stats_text(&stats, state.deletions.len());
    reply_text(&bot, &message, text).await?;
    Ok(())
}

fn broadcast_source(message: &Message) -> Option<BroadcastSource> {
    message.reply_to_message().map(|source| BroadcastSource {
        chat_id: source.chat.id.0,
        message_id: source.id.0,
    })
}

pub async fn broadcast_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "broadcast", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let Some(source) = broadcast_source(&message) else {
        reply_text(
            &bot,
            &message,
            "❌ Reply to a message to broadcast it (text/photo/video/doc/etc).",
        )
        .await?;
        return Ok(());
    };

    let recipients = state.store.user_ids();
    info!(
        "Broadcast by {} to {} users",
        decision.user_id,
        recipients.len()
    );
    tokio::spawn(async move {
        let mut timer = start_command_timer("broadcast_run", &message);
        let report = state.broadcaster.broadcast(source, &recipients).await;
        complete_command_timer(
            &mut timer,
            "success",
            Some(format!("sent={} failed={}", report.sent, report.failed)),
        );
        if let Err(err) = reply_text(&bot, &message, broadcast_text(&report)).await {
            error!("Failed to report broadcast result: {err}");
        }
    });
    Ok(())
}

pub async fn dbroadcast_handler(
    bot: Bot,
    state: AppState,
    message: Message,
    arg: String,
) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "dbroadcast", Requirement::Owner).await?
    else {
        return Ok(());
    };
    let Some(source) = broadcast_source(&message) else {
        reply_text(
            &bot,
            &message,
            "❌ Reply to a message to dbroadcast it (text/photo/video/doc/etc).",
        )
        .await?;
        return Ok(());
    };
    if arg.trim().is_empty() {
        reply_text(
            &bot,
            &message,
            "❌ Usage: /dbroadcast <seconds>  (reply to a message)",
        )
        .await?;
        return Ok(());
    }
    let delay = match parse_delay(&arg) {
        Ok(delay) => delay,
        Err(_) => {
            reply_text(
                &bot,
                &message,
                "❌ Invalid seconds. Example: /dbroadcast 30 (reply to a message)",
            )
            .await?;
            return Ok(());
        }
    };

    let recipients = state.store.user_ids();
    info!(
        "Timed broadcast by {} to {} users, deleting after {}s",
        decision.user_id,
        recipients.len(),
        delay.as_secs()
    );
    tokio::spawn(async move {
        let mut timer = start_command_timer("dbroadcast_run", &message);
        let text = match state
            .broadcaster
            .timed_broadcast(source, &recipients, delay)
            .await
        {
            Ok(timed) => {
                complete_command_timer(
                    &mut timer,
                    "success",
                    Some(format!(
                        "sent={} failed={}",
                        timed.report.sent, timed.report.failed
                    )),
                );
                timed_broadcast_text(&timed)
            }
            Err(err) => {
                complete_command_timer(&mut timer, "error", Some(err.to_string()));
                user_error_message(&err)
            }
        };
        if let Err(err) = reply_text(&bot, &message, text).await {
            error!("Failed to report timed broadcast result: {err}");
        }
    });
    Ok(())
}

pub async fn restart_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(decision) =
        authorize_command(&bot, &state, &message, "restart", Requirement::Owner).await?
    else {
        return Ok(());
    };
    if let Err(err) = state.store.flush().await {
        reply_text(&bot, &message, user_error_message(&err)).await?;
        return Ok(());
    }
    reply_text(&bot, &message, "♻️ Restarting...").await?;
    info!("Restart requested by {}", decision.user_id);
    restart_process()
}

fn restart_process() -> Result<()> {
    let exe = std::env::current_exe()?;
    let args: Vec<String> = std::env::args().skip(1).collect();

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        let err = std::process::Command::new(&exe).args(&args).exec();
        Err(err.into())
    }

    #[cfg(not(unix))]
    {
        std::process::Command::new(&exe).args(&args).spawn()?;
        std::process::exit(0);
    }
}
