use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    #[default]
    Idle,
    AwaitingCover,
    AwaitingCoverForQueuedVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Document,
    Audio,
}

impl MediaKind {
    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio",
        }
    }

    pub fn default_file_name(self) -> &'static str {
        match self {
            MediaKind::Video => "video.mp4",
            MediaKind::Document => "document",
            MediaKind::Audio => "audio.mp3",
        }
    }
}

/// A media item as received from the user: what to re-send and the caption it came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMedia {
    pub kind: MediaKind,
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default)]
    pub cover_ref: Option<String>,
    #[serde(default)]
    pub pending_state: PendingState,
    #[serde(default)]
    pub pending_video: Option<PendingMedia>,
    pub first_seen: DateTime<Utc>,
}

impl UserRecord {
    pub fn new(id: i64) -> Self {
        UserRecord {
            id,
            cover_ref: None,
            pending_state: PendingState::Idle,
            pending_video: None,
            first_seen: Utc::now(),
        }
    }

    pub fn clear_pending(&mut self) {
        self.pending_state = PendingState::Idle;
        self.pending_video = None;
    }

    pub fn queue_pending(&mut self, media: PendingMedia) {
        self.pending_state = PendingState::AwaitingCoverForQueuedVideo;
        self.pending_video = Some(media);
    }
}

/// On-disk layout of the store. User ids are JSON object keys, so they are strings there.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreData {
    #[serde(default)]
    pub users: BTreeMap<String, UserRecord>,
    #[serde(default)]
    pub admins: BTreeSet<i64>,
    #[serde(default)]
    pub banned: BTreeSet<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub covers: usize,
    pub pending: usize,
    pub admins: usize,
    pub banned: usize,
}
