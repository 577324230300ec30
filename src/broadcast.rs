use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{BotError, BotResult};
use crate::messenger::Messenger;
use crate::scheduler::DeletionQueue;

/// The message being fanned out, identified where it already lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSource {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone, Copy)]
pub struct BroadcastSettings {
    pub send_delay: Duration,
    pub max_rate_limit_retries: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        BroadcastSettings {
            send_delay: Duration::from_millis(80),
            max_rate_limit_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
    /// `(recipient, delivered message id)` for every successful copy.
    pub delivered: Vec<(i64, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedBroadcastReport {
    pub report: BroadcastReport,
    pub delete_after: Duration,
    pub deletes_at: Instant,
}

pub fn parse_delay(raw: &str) -> BotResult<Duration> {
    let trimmed = raw.trim();
    let seconds = trimmed
        .parse::<u64>()
        .map_err(|_| BotError::InvalidInput(format!("'{trimmed}' is not a number of seconds")))?;
    if seconds == 0 {
        return Err(BotError::InvalidInput(
            "delay must be positive".to_string(),
        ));
    }
    Ok(Duration::from_secs(seconds))
}

#[derive(Clone)]
pub struct BroadcastEngine {
    messenger: Arc<dyn Messenger>,
    deletions: DeletionQueue,
    settings: BroadcastSettings,
}

impl BroadcastEngine {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        deletions: DeletionQueue,
        settings: BroadcastSettings,
    ) -> Self {
        BroadcastEngine {
            messenger,
            deletions,
            settings,
        }
    }

    /// Copies `source` to every recipient. Individual failures are counted,
    /// never propagated.
    pub async fn broadcast(&self, source: BroadcastSource, recipients: &[i64]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (index, &recipient) in recipients.iter().enumerate() {
            match self.copy_with_rate_limit(source, recipient).await {
                Ok(message_id) => {
                    report.sent += 1;
                    report.delivered.push((recipient, message_id));
                }
                Err(err) => {
                    debug!("Broadcast to {recipient} failed: {err}");
                    report.failed += 1;
                }
            }
            if index + 1 < recipients.len() && !self.settings.send_delay.is_zero() {
                tokio::time::sleep(self.settings.send_delay).await;
            }
        }
        info!(
            "Broadcast of {}/{} finished: sent={} failed={}",
            source.chat_id, source.message_id, report.sent, report.failed
        );
        report
    }

    /// Broadcasts, then schedules every delivered copy for deletion after `delay`.
    pub async fn timed_broadcast(
        &self,
        source: BroadcastSource,
        recipients: &[i64],
        delay: Duration,
    ) -> BotResult<TimedBroadcastReport> {
        if delay.is_zero() {
            return Err(BotError::InvalidInput(
                "delay must be positive".to_string(),
            ));
        }
        let report = self.broadcast(source, recipients).await;
        let deletes_at = self.deletions.schedule(&report.delivered, delay);
        info!(
            "Scheduled {} broadcast copies for deletion in {}s",
            report.delivered.len(),
            delay.as_secs()
        );
        Ok(TimedBroadcastReport {
            report,
            delete_after: delay,
            deletes_at,
        })
    }

    async fn copy_with_rate_limit(
        &self,
        source: BroadcastSource,
        recipient: i64,
    ) -> BotResult<i32> {
        let mut retries = 0;
        loop {
            match self
                .messenger
                .copy_message(recipient, source.chat_id, source.message_id)
                .await
            {
                Err(BotError::RateLimited(wait))
                    if retries < self.settings.max_rate_limit_retries =>
                {
                    retries += 1;
                    warn!(
                        "Broadcast rate limited at {recipient}, pausing {}s (retry {retries})",
                        wait.as_secs()
                    );
                    tokio::time::sleep(wait).await;
                }
                result => return result,
            }
        }
    }
}
