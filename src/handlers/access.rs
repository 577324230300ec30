use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ReplyParameters};
use tracing::{debug, info};

use crate::acl::{AuthDecision, Requirement, Role};
use crate::state::AppState;

const BANNED_NOTICE: &str = "🚫 You are banned from using this bot.";
const JOIN_PROMPT: &str =
    "📢 Please join our channel to use this bot, then send your file again.";

pub fn sender_id(message: &Message) -> Option<i64> {
    message
        .from
        .as_ref()
        .and_then(|user| i64::try_from(user.id.0).ok())
}

/// Resolves the sender's role, telling banned users why nothing happens.
pub async fn check_sender(
    bot: &Bot,
    state: &AppState,
    message: &Message,
) -> Result<Option<(i64, Role)>> {
    let Some(user_id) = sender_id(message) else {
        return Ok(None);
    };
    let role = state.policy.role(user_id);
    if role == Role::Banned {
        bot.send_message(message.chat.id, BANNED_NOTICE)
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;
        return Ok(None);
    }
    Ok(Some((user_id, role)))
}

/// Returns the decision only when the command may run. Banned senders get a
/// notice; callers without the required role are ignored without a reply.
pub async fn authorize_command(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    command: &str,
    requirement: Requirement,
) -> Result<Option<AuthDecision>> {
    let Some((user_id, _)) = check_sender(bot, state, message).await? else {
        return Ok(None);
    };
    let decision = state.policy.authorize(user_id, requirement);
    if !decision.allowed {
        debug!(
            "Ignoring /{command} from {user_id}: {}",
            decision.reason
        );
        return Ok(None);
    }
    if requirement != Requirement::Anyone {
        info!(
            "/{command} by {user_id} ({:?}, {})",
            decision.role, decision.reason
        );
    }
    Ok(Some(decision))
}

/// Sends the join prompt and returns false when the sender has not joined the
/// force-subscribe channel.
pub async fn ensure_subscribed(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    user_id: i64,
    role: Role,
) -> Result<bool> {
    if state.gate.allows(user_id, role).await {
        return Ok(true);
    }

    let request = bot
        .send_message(message.chat.id, JOIN_PROMPT)
        .reply_parameters(ReplyParameters::new(message.id));
    let link = state
        .gate
        .join_link(&state.config.force_sub_link)
        .and_then(|link| reqwest::Url::parse(&link).ok());
    match link {
        Some(url) => {
            let keyboard = InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
                "Join channel",
                url,
            )]]);
            request.reply_markup(keyboard).await?;
        }
        None => {
            request.await?;
        }
    }
    Ok(false)
}
