use std::time::Instant;

use chrono::{DateTime, Utc};
use teloxide::types::Message;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

/// Times one handled update and reports it on the `bot.timing` target. If the
/// handler returns without completing it, it reports on drop with its last
/// status.
#[derive(Debug)]
pub struct CommandTimer {
    command: &'static str,
    chat_id: i64,
    user_id: Option<i64>,
    message_id: i32,
    received_at: DateTime<Utc>,
    started: Instant,
    status: &'static str,
    detail: Option<String>,
    completed: bool,
}

impl CommandTimer {
    pub fn from_message(command: &'static str, message: &Message) -> Self {
        CommandTimer {
            command,
            chat_id: message.chat.id.0,
            user_id: message
                .from
                .as_ref()
                .and_then(|user| i64::try_from(user.id.0).ok()),
            message_id: message.id.0,
            received_at: Utc::now(),
            started: Instant::now(),
            status: "success",
            detail: None,
            completed: false,
        }
    }

    fn log_received(&self) {
        info!(
            target: TIMING_TARGET,
            event = "received",
            command = self.command,
            chat_id = self.chat_id,
            user_id = ?self.user_id,
            message_id = self.message_id,
            received_at = %self.received_at.to_rfc3339(),
        );
    }

    pub fn mark_status(&mut self, status: &'static str, detail: Option<String>) {
        self.status = status;
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        info!(
            target: TIMING_TARGET,
            event = "completed",
            command = self.command,
            chat_id = self.chat_id,
            user_id = ?self.user_id,
            message_id = self.message_id,
            duration_ms = self.started.elapsed().as_millis() as u64,
            status = self.status,
            detail = self.detail.as_deref().unwrap_or(""),
        );
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        self.log_completed();
    }
}

pub fn start_command_timer(command: &'static str, message: &Message) -> CommandTimer {
    let timer = CommandTimer::from_message(command, message);
    timer.log_received();
    timer
}

pub fn complete_command_timer(
    timer: &mut CommandTimer,
    status: &'static str,
    detail: Option<String>,
) {
    timer.mark_status(status, detail);
    timer.log_completed();
}
