use crate::db::store::UserStore;
use crate::errors::BotResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverDeletion {
    Deleted,
    NothingToDelete,
}

/// Sole writer of `UserRecord::cover_ref`.
#[derive(Clone)]
pub struct CoverManager {
    store: UserStore,
}

impl CoverManager {
    pub fn new(store: UserStore) -> Self {
        CoverManager { store }
    }

    pub async fn set_cover(&self, user_id: i64, image_ref: &str) -> BotResult<()> {
        let image_ref = image_ref.to_string();
        self.store
            .update(user_id, move |record| record.cover_ref = Some(image_ref))
            .await
    }

    pub fn get_cover(&self, user_id: i64) -> Option<String> {
        self.store
            .get(user_id)
            .and_then(|record| record.cover_ref)
    }

    pub async fn delete_cover(&self, user_id: i64) -> BotResult<CoverDeletion> {
        if self.get_cover(user_id).is_none() {
            return Ok(CoverDeletion::NothingToDelete);
        }
        self.store
            .update(user_id, |record| record.cover_ref = None)
            .await?;
        Ok(CoverDeletion::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_the_latest_cover() {
        let covers = CoverManager::new(UserStore::in_memory());
        covers.set_cover(1, "p1").await.unwrap();
        assert_eq!(covers.get_cover(1).as_deref(), Some("p1"));
        covers.set_cover(1, "p2").await.unwrap();
        assert_eq!(covers.get_cover(1).as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn covers_are_scoped_per_user() {
        let covers = CoverManager::new(UserStore::in_memory());
        covers.set_cover(1, "p1").await.unwrap();
        covers.set_cover(2, "p2").await.unwrap();
        assert_eq!(covers.get_cover(1).as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn deleting_a_missing_cover_leaves_the_store_untouched() {
        let store = UserStore::in_memory();
        let covers = CoverManager::new(store.clone());

        assert_eq!(
            covers.delete_cover(3).await.unwrap(),
            CoverDeletion::NothingToDelete
        );
        assert!(store.get(3).is_none());

        covers.set_cover(3, "p").await.unwrap();
        assert_eq!(covers.delete_cover(3).await.unwrap(), CoverDeletion::Deleted);
        assert_eq!(covers.get_cover(3), None);
    }

    #[tokio::test]
    async fn a_cover_that_failed_to_save_is_not_used() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        std::fs::create_dir(&data_dir).unwrap();
        let store = UserStore::open(data_dir.join("bot_data.json")).await.unwrap();
        let covers = CoverManager::new(store);
        covers.set_cover(1, "old").await.unwrap();
        std::fs::remove_dir_all(&data_dir).unwrap();

        assert!(covers.set_cover(1, "new").await.is_err());
        assert_eq!(covers.get_cover(1).as_deref(), Some("old"));
        assert!(covers.delete_cover(1).await.is_err());
        assert_eq!(covers.get_cover(1).as_deref(), Some("old"));
    }
}
