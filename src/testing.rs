//! Recording [`Messenger`] used by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::models::PendingMedia;
use crate::errors::{BotError, BotResult};
use crate::messenger::{Caption, Messenger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMedia {
    pub chat_id: i64,
    pub media: PendingMedia,
    pub cover: Option<String>,
    pub caption: Option<Caption>,
}

#[derive(Default)]
struct FakeState {
    next_message_id: i32,
    media: Vec<SentMedia>,
    copies: Vec<(i64, i32)>,
    deletions: Vec<(i64, i32)>,
    failing_chats: HashSet<i64>,
    scripted_copy_errors: HashMap<i64, VecDeque<BotError>>,
    fail_media: Option<BotError>,
    fail_deletes: bool,
    members: HashSet<i64>,
    membership_error: Option<BotError>,
}

#[derive(Default)]
pub struct FakeMessenger {
    state: Mutex<FakeState>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        FakeMessenger::default()
    }

    /// Every copy to `chat_id` fails as if the chat no longer exists.
    pub fn fail_chat(&self, chat_id: i64) {
        self.state.lock().failing_chats.insert(chat_id);
    }

    /// Queues errors returned by the next copies to `chat_id`, before succeeding.
    pub fn script_copy_errors(&self, chat_id: i64, errors: Vec<BotError>) {
        self.state
            .lock()
            .scripted_copy_errors
            .insert(chat_id, errors.into());
    }

    pub fn fail_media_with(&self, error: Option<BotError>) {
        self.state.lock().fail_media = error;
    }

    pub fn fail_deletes(&self) {
        self.state.lock().fail_deletes = true;
    }

    pub fn add_member(&self, user_id: i64) {
        self.state.lock().members.insert(user_id);
    }

    pub fn fail_membership_with(&self, error: BotError) {
        self.state.lock().membership_error = Some(error);
    }

    pub fn media(&self) -> Vec<SentMedia> {
        self.state.lock().media.clone()
    }

    /// `(recipient, delivered message id)` for each successful copy.
    pub fn copies(&self) -> Vec<(i64, i32)> {
        self.state.lock().copies.clone()
    }

    pub fn deletions(&self) -> Vec<(i64, i32)> {
        self.state.lock().deletions.clone()
    }

    fn next_id(state: &mut FakeState) -> i32 {
        state.next_message_id += 1;
        state.next_message_id
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_media(
        &self,
        chat_id: i64,
        media: &PendingMedia,
        cover: Option<&str>,
        caption: Option<&Caption>,
    ) -> BotResult<i32> {
        let mut state = self.state.lock();
        if let Some(error) = state.fail_media.clone() {
            return Err(error);
        }
        state.media.push(SentMedia {
            chat_id,
            media: media.clone(),
            cover: cover.map(str::to_string),
            caption: caption.cloned(),
        });
        Ok(Self::next_id(&mut state))
    }

    async fn copy_message(
        &self,
        to_chat_id: i64,
        _from_chat_id: i64,
        _message_id: i32,
    ) -> BotResult<i32> {
        let mut state = self.state.lock();
        if state.failing_chats.contains(&to_chat_id) {
            return Err(BotError::NotFound("chat not found".to_string()));
        }
        if let Some(error) = state
            .scripted_copy_errors
            .get_mut(&to_chat_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        let id = Self::next_id(&mut state);
        state.copies.push((to_chat_id, id));
        Ok(id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        let mut state = self.state.lock();
        state.deletions.push((chat_id, message_id));
        if state.fail_deletes {
            return Err(BotError::NotFound("message to delete not found".to_string()));
        }
        Ok(())
    }

    async fn chat_member_status(&self, _channel: &str, user_id: i64) -> BotResult<bool> {
        let state = self.state.lock();
        if let Some(error) = state.membership_error.clone() {
            return Err(error);
        }
        Ok(state.members.contains(&user_id))
    }
}
