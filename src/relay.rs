use std::sync::Arc;

use tracing::{info, warn};

use crate::acl::Role;
use crate::cover::CoverManager;
use crate::db::models::{MediaKind, PendingMedia, PendingState};
use crate::db::store::UserStore;
use crate::errors::{BotError, BotResult};
use crate::messenger::{Caption, Messenger};
use crate::utils::text::bold_html;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    CoverSaved,
    QueuedDelivered { kind: MediaKind },
    /// The cover was saved but the queued item could not be sent; it stays queued.
    QueuedFailed { error: BotError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaOutcome {
    Delivered,
    Queued { replaced: bool },
    Failed { error: BotError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverRequest {
    AwaitingCover,
    AlreadyQueued,
}

/// Privileged senders get the caption in bold HTML; everyone else's caption is
/// passed through verbatim with no parse mode.
pub fn render_caption(caption: Option<&str>, role: Role) -> Option<Caption> {
    let text = caption.filter(|text| !text.is_empty())?;
    if role.is_privileged() {
        Some(Caption {
            text: bold_html(text),
            html: true,
        })
    } else {
        Some(Caption {
            text: text.to_string(),
            html: false,
        })
    }
}

/// Per-user pending-cover state machine. Sole writer of `pending_state` and
/// `pending_video`.
#[derive(Clone)]
pub struct RelayEngine {
    store: UserStore,
    covers: CoverManager,
    messenger: Arc<dyn Messenger>,
}

impl RelayEngine {
    pub fn new(store: UserStore, covers: CoverManager, messenger: Arc<dyn Messenger>) -> Self {
        RelayEngine {
            store,
            covers,
            messenger,
        }
    }

    pub async fn request_cover(&self, user_id: i64) -> BotResult<CoverRequest> {
        self.store
            .update(user_id, |record| match record.pending_state {
                PendingState::AwaitingCoverForQueuedVideo => CoverRequest::AlreadyQueued,
                PendingState::Idle | PendingState::AwaitingCover => {
                    record.pending_state = PendingState::AwaitingCover;
                    CoverRequest::AwaitingCover
                }
            })
            .await
    }

    pub async fn on_image(
        &self,
        user_id: i64,
        chat_id: i64,
        image_ref: &str,
        role: Role,
    ) -> BotResult<ImageOutcome> {
        let record = self.store.ensure(user_id).await?;
        self.covers.set_cover(user_id, image_ref).await?;

        match record.pending_state {
            PendingState::Idle => Ok(ImageOutcome::CoverSaved),
            PendingState::AwaitingCover => {
                self.store.update(user_id, |record| record.clear_pending()).await?;
                Ok(ImageOutcome::CoverSaved)
            }
            PendingState::AwaitingCoverForQueuedVideo => {
                let Some(media) = record.pending_video else {
                    self.store.update(user_id, |record| record.clear_pending()).await?;
                    return Ok(ImageOutcome::CoverSaved);
                };
                let caption = render_caption(media.caption.as_deref(), role);
                match self
                    .messenger
                    .send_media(chat_id, &media, Some(image_ref), caption.as_ref())
                    .await
                {
                    Ok(_) => {
                        self.store.update(user_id, |record| record.clear_pending()).await?;
                        info!(
                            "Delivered queued {} for user {user_id}",
                            media.kind.label()
                        );
                        Ok(ImageOutcome::QueuedDelivered { kind: media.kind })
                    }
                    Err(error) => {
                        warn!("Queued {} for user {user_id} failed: {error}", media.kind.label());
                        Ok(ImageOutcome::QueuedFailed { error })
                    }
                }
            }
        }
    }

    pub async fn on_media(
        &self,
        user_id: i64,
        chat_id: i64,
        media: PendingMedia,
        role: Role,
    ) -> BotResult<MediaOutcome> {
        let record = self.store.ensure(user_id).await?;

        match (record.pending_state, record.cover_ref) {
            (PendingState::Idle, Some(cover)) => {
                let caption = render_caption(media.caption.as_deref(), role);
                match self
                    .messenger
                    .send_media(chat_id, &media, Some(&cover), caption.as_ref())
                    .await
                {
                    Ok(_) => Ok(MediaOutcome::Delivered),
                    Err(error) => {
                        warn!("Relaying {} for user {user_id} failed: {error}", media.kind.label());
                        Ok(MediaOutcome::Failed { error })
                    }
                }
            }
            (state, _) => {
                let replaced = state == PendingState::AwaitingCoverForQueuedVideo;
                self.store
                    .update(user_id, move |record| record.queue_pending(media))
                    .await?;
                Ok(MediaOutcome::Queued { replaced })
            }
        }
    }
}
