use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::db::models::{PendingState, StoreData, StoreStats, UserRecord};
use crate::errors::BotResult;

struct StoreInner {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
    write_lock: tokio::sync::Mutex<()>,
}

/// Persistent user records plus the admin and ban sets.
///
/// Every mutation rewrites the whole file (`<path>.tmp` then rename), so the
/// file on disk is always a complete snapshot. Mutations are serialized by
/// `write_lock` and become visible only after their snapshot is written.
#[derive(Clone)]
pub struct UserStore {
    inner: Arc<StoreInner>,
}

impl UserStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (data, created) = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                let data: StoreData = serde_json::from_str(&raw).map_err(|err| {
                    anyhow!("Failed to parse store file {}: {}", path.display(), err)
                })?;
                (data, false)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => (StoreData::default(), true),
            Err(err) => {
                return Err(anyhow!(
                    "Failed to read store file {}: {}",
                    path.display(),
                    err
                ))
            }
        };

        info!(
            "Loaded store from {} ({} users, {} admins)",
            path.display(),
            data.users.len(),
            data.admins.len()
        );

        let store = UserStore::with_data(Some(path), data);
        if created {
            store.flush().await?;
        }
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        UserStore::with_data(None, StoreData::default())
    }

    fn with_data(path: Option<PathBuf>, data: StoreData) -> Self {
        UserStore {
            inner: Arc::new(StoreInner {
                path,
                data: Mutex::new(data),
                write_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn get(&self, user_id: i64) -> Option<UserRecord> {
        self.inner.data.lock().users.get(&user_id.to_string()).cloned()
    }

    /// Returns the user's record, creating and persisting it on first contact.
    pub async fn ensure(&self, user_id: i64) -> BotResult<UserRecord> {
        if let Some(record) = self.get(user_id) {
            return Ok(record);
        }
        let (record, created) = self
            .commit(|data| {
                let key = user_id.to_string();
                let created = !data.users.contains_key(&key);
                let record = data
                    .users
                    .entry(key)
                    .or_insert_with(|| UserRecord::new(user_id))
                    .clone();
                ((record, created), created)
            })
            .await?;
        if created {
            debug!("Created record for user {user_id}");
        }
        Ok(record)
    }

    pub async fn update<T>(
        &self,
        user_id: i64,
        apply: impl FnOnce(&mut UserRecord) -> T,
    ) -> BotResult<T> {
        self.commit(|data| {
            let record = data
                .users
                .entry(user_id.to_string())
                .or_insert_with(|| UserRecord::new(user_id));
            (apply(record), true)
        })
        .await
    }

    pub fn user_ids(&self) -> Vec<i64> {
        self.inner
            .data
            .lock()
            .users
            .values()
            .map(|record| record.id)
            .collect()
    }

    pub fn admins(&self) -> Vec<i64> {
        self.inner.data.lock().admins.iter().copied().collect()
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.inner.data.lock().admins.contains(&user_id)
    }

    pub fn is_banned(&self, user_id: i64) -> bool {
        self.inner.data.lock().banned.contains(&user_id)
    }

    /// Returns `false` when the id was already an admin.
    pub async fn insert_admin(&self, user_id: i64) -> BotResult<bool> {
        self.modify_sets(|data| data.admins.insert(user_id)).await
    }

    /// Returns `false` when the id was not an admin.
    pub async fn remove_admin(&self, user_id: i64) -> BotResult<bool> {
        self.modify_sets(|data| data.admins.remove(&user_id)).await
    }

    pub async fn insert_ban(&self, user_id: i64) -> BotResult<bool> {
        self.modify_sets(|data| data.banned.insert(user_id)).await
    }

    pub async fn remove_ban(&self, user_id: i64) -> BotResult<bool> {
        self.modify_sets(|data| data.banned.remove(&user_id)).await
    }

    async fn modify_sets(&self, apply: impl FnOnce(&mut StoreData) -> bool) -> BotResult<bool> {
        self.commit(|data| {
            let changed = apply(data);
            (changed, changed)
        })
        .await
    }

    /// Runs `apply` against a copy of the data. The copy replaces the live data
    /// only once it is on disk, so a failed write leaves memory untouched.
    /// `apply` returns its result plus whether anything changed.
    async fn commit<T>(&self, apply: impl FnOnce(&mut StoreData) -> (T, bool)) -> BotResult<T> {
        let _guard = self.inner.write_lock.lock().await;
        let mut next = self.inner.data.lock().clone();
        let (result, changed) = apply(&mut next);
        if changed {
            self.write_snapshot(&next).await?;
            *self.inner.data.lock() = next;
        }
        Ok(result)
    }

    pub fn stats(&self) -> StoreStats {
        let data = self.inner.data.lock();
        StoreStats {
            users: data.users.len(),
            covers: data
                .users
                .values()
                .filter(|record| record.cover_ref.is_some())
                .count(),
            pending: data
                .users
                .values()
                .filter(|record| record.pending_state != PendingState::Idle)
                .count(),
            admins: data.admins.len(),
            banned: data.banned.len(),
        }
    }

    pub async fn flush(&self) -> BotResult<()> {
        let _guard = self.inner.write_lock.lock().await;
        let snapshot = self.inner.data.lock().clone();
        self.write_snapshot(&snapshot).await
    }

    async fn write_snapshot(&self, data: &StoreData) -> BotResult<()> {
        let Some(path) = self.inner.path.as_ref() else {
            return Ok(());
        };

        let body = serde_json::to_vec_pretty(data)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{MediaKind, PendingMedia};
    use crate::errors::BotError;

    #[tokio::test]
    async fn records_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bot_data.json");

        let store = UserStore::open(&path).await.unwrap();
        store
            .update(42, |record| record.cover_ref = Some("photo-1".to_string()))
            .await
            .unwrap();
        store
            .update(7, |record| {
                record.queue_pending(PendingMedia {
                    kind: MediaKind::Video,
                    file_id: "video-1".to_string(),
                    file_name: None,
                    caption: Some("hello".to_string()),
                })
            })
            .await
            .unwrap();
        store.insert_admin(9).await.unwrap();

        let reopened = UserStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get(42).unwrap().cover_ref.as_deref(),
            Some("photo-1")
        );
        let pending = reopened.get(7).unwrap();
        assert_eq!(
            pending.pending_state,
            PendingState::AwaitingCoverForQueuedVideo
        );
        assert_eq!(
            pending.pending_video.unwrap().caption.as_deref(),
            Some("hello")
        );
        assert!(reopened.is_admin(9));
    }

    #[tokio::test]
    async fn missing_file_creates_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.json");

        let store = UserStore::open(&path).await.unwrap();
        assert!(store.user_ids().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(UserStore::open(&path).await.is_err());
    }

    #[tokio::test]
    async fn ensure_creates_each_record_once() {
        let store = UserStore::in_memory();
        let first = store.ensure(5).await.unwrap();
        store
            .update(5, |record| record.cover_ref = Some("c".to_string()))
            .await
            .unwrap();
        let second = store.ensure(5).await.unwrap();

        assert_eq!(first.first_seen, second.first_seen);
        assert_eq!(second.cover_ref.as_deref(), Some("c"));
        assert_eq!(store.user_ids(), vec![5]);
    }

    #[tokio::test]
    async fn stats_count_covers_and_pending_users() {
        let store = UserStore::in_memory();
        store
            .update(1, |record| record.cover_ref = Some("a".to_string()))
            .await
            .unwrap();
        store
            .update(2, |record| record.pending_state = PendingState::AwaitingCover)
            .await
            .unwrap();
        store.ensure(3).await.unwrap();
        store.insert_ban(3).await.unwrap();

        let stats = store.stats();
        assert_eq!(stats.users, 3);
        assert_eq!(stats.covers, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.banned, 1);
    }

    #[tokio::test]
    async fn failed_writes_leave_memory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        let store = UserStore::open(data_dir.join("bot_data.json")).await.unwrap();
        store.ensure(1).await.unwrap();
        std::fs::remove_dir_all(&data_dir).unwrap();

        let result = store
            .update(1, |record| record.cover_ref = Some("P".to_string()))
            .await;
        assert!(matches!(result, Err(BotError::Storage(_))));
        assert_eq!(store.get(1).unwrap().cover_ref, None);

        assert!(store.insert_admin(5).await.is_err());
        assert!(!store.is_admin(5));
        assert!(store.insert_ban(6).await.is_err());
        assert!(!store.is_banned(6));
        assert!(store.ensure(7).await.is_err());
        assert!(store.get(7).is_none());
        assert_eq!(store.stats().users, 1);
    }
}
