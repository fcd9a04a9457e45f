//! In-memory store for tests and single-process runs.

use std::collections::HashMap;

use async_trait::async_trait;
use shortsops_models::{
    AccountId, Campaign, CampaignId, MediaItem, MediaItemId, Platform, PostTask, PostTaskId,
    SocialConnection, SocialConnectionId,
};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{choose_connection, PipelineStore};
use crate::update::{MediaItemUpdate, PostTaskUpdate};

#[derive(Default)]
struct Tables {
    media: HashMap<MediaItemId, MediaItem>,
    posts: HashMap<PostTaskId, PostTask>,
    connections: HashMap<SocialConnectionId, SocialConnection>,
    campaigns: HashMap<CampaignId, Campaign>,
}

/// Store keeping all records in memory behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineStore for MemoryStore {
    async fn get_media_item(&self, id: &MediaItemId) -> StoreResult<Option<MediaItem>> {
        Ok(self.tables.read().await.media.get(id).cloned())
    }

    async fn insert_media_item(&self, item: &MediaItem) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .media
            .insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn update_media_item(
        &self,
        id: &MediaItemId,
        update: MediaItemUpdate,
    ) -> StoreResult<MediaItem> {
        let mut tables = self.tables.write().await;
        let item = tables
            .media
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("media item", id.as_str()))?;

        // apply to a copy so a rejected update leaves the record untouched
        let mut next = item.clone();
        update.apply(&mut next)?;
        *item = next.clone();
        Ok(next)
    }

    async fn create_post_task_if_absent(&self, task: &PostTask) -> StoreResult<(PostTask, bool)> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.posts.get(&task.id) {
            return Ok((existing.clone(), false));
        }
        tables.posts.insert(task.id.clone(), task.clone());
        Ok((task.clone(), true))
    }

    async fn get_post_task(&self, id: &PostTaskId) -> StoreResult<Option<PostTask>> {
        Ok(self.tables.read().await.posts.get(id).cloned())
    }

    async fn update_post_task(&self, id: &PostTaskId, update: PostTaskUpdate) -> StoreResult<PostTask> {
        let mut tables = self.tables.write().await;
        let task = tables
            .posts
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("post task", id.as_str()))?;

        let mut next = task.clone();
        update.apply(&mut next)?;
        *task = next.clone();
        Ok(next)
    }

    async fn post_tasks_for(&self, media_item_id: &MediaItemId) -> StoreResult<Vec<PostTask>> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<PostTask> = tables
            .posts
            .values()
            .filter(|t| &t.media_item_id == media_item_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn insert_connection(&self, connection: &SocialConnection) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .connections
            .insert(connection.id.clone(), connection.clone());
        Ok(())
    }

    async fn find_connection(
        &self,
        account: &AccountId,
        platform: Platform,
        preferred: Option<&SocialConnectionId>,
    ) -> StoreResult<Option<SocialConnection>> {
        let tables = self.tables.read().await;
        let candidates = tables
            .connections
            .values()
            .filter(|c| &c.account_id == account && c.platform == platform)
            .cloned()
            .collect();
        Ok(choose_connection(candidates, preferred))
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        self.tables
            .write()
            .await
            .campaigns
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>> {
        Ok(self.tables.read().await.campaigns.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use shortsops_models::{AssetBundle, MediaStatus, PostStatus, PostTransitionError, Stage};

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let store = MemoryStore::new();
        let err = tokio_test::assert_err!(
            store
                .update_media_item(&MediaItemId::from("nope"), MediaItemUpdate::StartRender)
                .await
        );
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_record() {
        let store = MemoryStore::new();
        let item = MediaItem::new(AccountId::from("a"), None, "en");
        store.insert_media_item(&item).await.unwrap();
        store
            .update_media_item(&item.id, MediaItemUpdate::fail(Stage::SynthVoiceover, "down"))
            .await
            .unwrap();

        let err = store
            .update_media_item(
                &item.id,
                MediaItemUpdate::MergeAssets {
                    stage: Stage::BuildCaptions,
                    assets: AssetBundle::srt("srt"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));

        let stored = store.get_media_item(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MediaStatus::Failed);
        assert!(stored.assets.srt_url.is_none());
    }

    #[tokio::test]
    async fn test_post_task_created_once() {
        let store = MemoryStore::new();
        let media = MediaItemId::from("m1");
        let task = PostTask::new("req", media.clone(), Platform::Youtube, None, Utc::now());

        let (_, created) = store.create_post_task_if_absent(&task).await.unwrap();
        assert!(created);
        store
            .update_post_task(
                &task.id,
                PostTaskUpdate::StartPosting {
                    lease: Duration::from_secs(300),
                },
            )
            .await
            .unwrap();

        let (existing, created) = store.create_post_task_if_absent(&task).await.unwrap();
        assert!(!created);
        assert_eq!(existing.status, PostStatus::Posting);
        assert_eq!(store.post_tasks_for(&media).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_second_start_posting_is_rejected() {
        let store = MemoryStore::new();
        let task = PostTask::new("req", MediaItemId::from("m1"), Platform::Tiktok, None, Utc::now());
        store.create_post_task_if_absent(&task).await.unwrap();

        let claim = PostTaskUpdate::StartPosting {
            lease: Duration::from_secs(300),
        };
        store.update_post_task(&task.id, claim.clone()).await.unwrap();
        let err = store.update_post_task(&task.id, claim).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::PostTransition(PostTransitionError::InProgress { .. })
        ));

        let stored = store.get_post_task(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn test_find_connection_prefers_hint() {
        let store = MemoryStore::new();
        let account = AccountId::from("acct");
        let first = SocialConnection::new(account.clone(), Platform::Tiktok, "sealed-1");
        let second = SocialConnection::new(account.clone(), Platform::Tiktok, "sealed-2");
        let other = SocialConnection::new(AccountId::from("other"), Platform::Tiktok, "sealed-3");
        for c in [&first, &second, &other] {
            store.insert_connection(c).await.unwrap();
        }

        let found = store
            .find_connection(&account, Platform::Tiktok, Some(&second.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, second.id);

        // hint from another account is ignored
        let found = store
            .find_connection(&account, Platform::Tiktok, Some(&other.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.account_id, account);

        assert!(store
            .find_connection(&account, Platform::Youtube, None)
            .await
            .unwrap()
            .is_none());
    }
}
