use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode, ReplyParameters};

use crate::acl::Role;
use crate::broadcast::{BroadcastReport, TimedBroadcastReport};
use crate::db::models::{MediaKind, StoreStats};
use crate::errors::BotError;
use crate::relay::{ImageOutcome, MediaOutcome};
use crate::utils::text::escape_html;

pub const COVER_VIEW_CALLBACK: &str = "cover:view";
pub const COVER_DELETE_CALLBACK: &str = "cover:delete";

pub async fn reply_text(bot: &Bot, message: &Message, text: impl Into<String>) -> Result<Message> {
    let sent = bot
        .send_message(message.chat.id, text.into())
        .reply_parameters(ReplyParameters::new(message.id))
        .await?;
    Ok(sent)
}

pub async fn reply_html(bot: &Bot, message: &Message, text: impl Into<String>) -> Result<Message> {
    let sent = bot
        .send_message(message.chat.id, text.into())
        .reply_parameters(ReplyParameters::new(message.id))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(sent)
}

pub fn cover_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback("🖼️ My cover", COVER_VIEW_CALLBACK),
        InlineKeyboardButton::callback("🗑️ Delete cover", COVER_DELETE_CALLBACK),
    ]])
}

pub fn user_error_message(err: &BotError) -> String {
    match err {
        BotError::InvalidInput(detail) => format!("❌ {detail}"),
        BotError::RateLimited(wait) => format!(
            "⏳ Telegram is rate limiting me, try again in {}s.",
            wait.as_secs().max(1)
        ),
        BotError::NotFound(_) => "⚠️ Telegram could not find that file or chat.".to_string(),
        BotError::PermissionDenied(_) => "⚠️ I don't have the rights to do that.".to_string(),
        BotError::Storage(_) => "⚠️ Failed to save your data, please try again.".to_string(),
        BotError::Transport(_) => "⚠️ Telegram request failed, please try again.".to_string(),
    }
}

pub fn start_text(first_name: &str) -> String {
    format!(
        "👋 Hi {}!\n\n\
🎬 <b>Video Cover/Thumbnail Bot</b>\n\n\
• Send a photo and it is saved as your cover.\n\
• Send a video, document or audio file and I'll send it back with your cover applied.\n\
• No cover yet? I'll hold on to your file until you send one.\n\n\
Use /help to see all commands.",
        escape_html(first_name)
    )
}

pub fn help_text(role: Role) -> String {
    let mut text = String::from(
        "<b>Commands</b>\n\n\
/setcover - Send your next photo as the cover\n\
/showcover - Show your saved cover\n\
/delcover - Delete your saved cover\n\
/ping - Check bot status\n\
/help - Show this help message\n",
    );
    if role.is_privileged() {
        text.push_str("\n<b>Admin</b>\n/showadmins - List admins\n");
    }
    if role == Role::Owner {
        text.push_str(
            "\n<b>Owner</b>\n\
/addadmin &lt;id&gt; - Grant admin\n\
/removeadmin &lt;id&gt; - Revoke admin\n\
/ban &lt;id&gt; - Ban a user\n\
/unban &lt;id&gt; - Lift a ban\n\
/users - Count stored users\n\
/stats - Show store statistics\n\
/broadcast - Reply to a message to send it to every user\n\
/dbroadcast &lt;seconds&gt; - Broadcast and delete the copies later\n\
/restart - Save data and restart the bot\n",
        );
    }
    text
}

pub fn image_outcome_text(outcome: &ImageOutcome) -> String {
    match outcome {
        ImageOutcome::CoverSaved => {
            "✅ Cover saved and will be applied to your future files.".to_string()
        }
        ImageOutcome::QueuedDelivered { kind } => {
            format!("✅ Cover saved and applied to your {}.", kind.label())
        }
        ImageOutcome::QueuedFailed { error } => format!(
            "✅ Cover saved, but sending your queued file failed: {}\n\
Send another photo to try again.",
            user_error_message(error)
        ),
    }
}

/// `None` when the delivered file speaks for itself.
pub fn media_outcome_text(outcome: &MediaOutcome, kind: MediaKind) -> Option<String> {
    match outcome {
        MediaOutcome::Delivered => None,
        MediaOutcome::Queued { replaced: false } => Some(format!(
            "📥 Got your {}. Now send a photo to use as its cover.",
            kind.label()
        )),
        MediaOutcome::Queued { replaced: true } => Some(format!(
            "📥 Replaced your queued file with this {}. Send a photo to use as its cover.",
            kind.label()
        )),
        MediaOutcome::Failed { error } => Some(format!(
            "⚠️ Error sending {} with cover: {}",
            kind.label(),
            user_error_message(error)
        )),
    }
}

pub fn admins_text(admins: &[i64], owner_id: i64) -> String {
    let lines = admins
        .iter()
        .map(|id| {
            if *id == owner_id {
                format!("• <code>{id}</code> (owner)")
            } else {
                format!("• <code>{id}</code>")
            }
        })
        .collect::<Vec<_>>();
    format!("👮 Admins:\n{}", lines.join("\n"))
}

pub fn stats_text(stats: &StoreStats, scheduled_deletions: usize) -> String {
    format!(
        "📊 Stats:\n• Users: {}\n• Admins: {}\n• Covers saved: {}\n\
• Pending files: {}\n• Banned: {}\n• Scheduled deletions: {}",
        stats.users,
        stats.admins,
        stats.covers,
        stats.pending,
        stats.banned,
        scheduled_deletions
    )
}

pub fn broadcast_text(report: &BroadcastReport) -> String {
    format!(
        "📢 Broadcast finished. Sent: {}, Failed: {}",
        report.sent, report.failed
    )
}

pub fn timed_broadcast_text(timed: &TimedBroadcastReport) -> String {
    format!(
        "✅ Timed broadcast sent to {} users ({} failed). Will delete in {}s.",
        timed.report.sent,
        timed.report.failed,
        timed.delete_after.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn help_sections_follow_role() {
        let user = help_text(Role::User);
        assert!(user.contains("/setcover"));
        assert!(!user.contains("/showadmins"));
        assert!(!user.contains("/broadcast"));

        let admin = help_text(Role::Admin);
        assert!(admin.contains("/showadmins"));
        assert!(!admin.contains("/restart"));

        let owner = help_text(Role::Owner);
        assert!(owner.contains("/showadmins"));
        assert!(owner.contains("/dbroadcast"));
    }

    #[test]
    fn start_text_escapes_names() {
        assert!(start_text("<Bob>").contains("&lt;Bob&gt;"));
    }

    #[test]
    fn delivered_media_needs_no_reply() {
        assert_eq!(
            media_outcome_text(&MediaOutcome::Delivered, MediaKind::Video),
            None
        );
        let queued = media_outcome_text(&MediaOutcome::Queued { replaced: false }, MediaKind::Audio)
            .unwrap();
        assert!(queued.contains("audio"));
        let replaced =
            media_outcome_text(&MediaOutcome::Queued { replaced: true }, MediaKind::Video).unwrap();
        assert!(replaced.starts_with("📥 Replaced"));
    }

    #[test]
    fn failures_are_described_without_internal_detail() {
        let text = image_outcome_text(&ImageOutcome::QueuedFailed {
            error: BotError::Transport("connection reset by peer".to_string()),
        });
        assert!(text.contains("Cover saved"));
        assert!(!text.contains("connection reset"));

        assert_eq!(
            user_error_message(&BotError::InvalidInput("missing user id".to_string())),
            "❌ missing user id"
        );
        assert!(user_error_message(&BotError::RateLimited(Duration::from_secs(7))).contains("7s"));
    }

    #[test]
    fn admin_list_marks_owner() {
        let text = admins_text(&[1, 42], 1);
        assert_eq!(
            text,
            "👮 Admins:\n• <code>1</code> (owner)\n• <code>42</code>"
        );
    }

    #[test]
    fn broadcast_reports_count_outcomes() {
        let report = BroadcastReport {
            sent: 2,
            failed: 1,
            delivered: vec![(1, 10), (2, 11)],
        };
        assert_eq!(
            broadcast_text(&report),
            "📢 Broadcast finished. Sent: 2, Failed: 1"
        );
        let timed = TimedBroadcastReport {
            report,
            delete_after: Duration::from_secs(30),
            deletes_at: tokio::time::Instant::now(),
        };
        assert!(timed_broadcast_text(&timed).contains("Will delete in 30s"));
    }
}
