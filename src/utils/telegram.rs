use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatAction;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::db::models::MediaKind;

/// Telegram clears a chat action after about five seconds.
const CHAT_ACTION_REFRESH: Duration = Duration::from_secs(4);

/// Keeps "sending video…"-style chat actions visible while a slow upload runs.
/// The refresh task stops when this is dropped.
pub struct ChatActionHeartbeat {
    task: JoinHandle<()>,
}

impl Drop for ChatActionHeartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn start_chat_action_heartbeat(
    bot: Bot,
    chat_id: ChatId,
    action: ChatAction,
) -> ChatActionHeartbeat {
    let task = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(CHAT_ACTION_REFRESH);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            if let Err(err) = bot.send_chat_action(chat_id, action).await {
                debug!("send_chat_action to {chat_id} failed: {err}");
            }
        }
    });
    ChatActionHeartbeat { task }
}

/// Chat action matching the upload the relay is about to make.
pub fn upload_action_for(kind: MediaKind) -> ChatAction {
    match kind {
        MediaKind::Video => ChatAction::UploadVideo,
        MediaKind::Document => ChatAction::UploadDocument,
        MediaKind::Audio => ChatAction::UploadVoice,
    }
}
