//! Persisted pipeline state contract.

use async_trait::async_trait;
use shortsops_models::{
    AccountId, Campaign, CampaignId, MediaItem, MediaItemId, Platform, PostTask, PostTaskId,
    SocialConnection, SocialConnectionId,
};

use crate::error::StoreResult;
use crate::update::{MediaItemUpdate, PostTaskUpdate};

/// Every read goes to the backing store; nothing is cached across calls.
/// Updates are applied to a freshly read record and written atomically.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_media_item(&self, id: &MediaItemId) -> StoreResult<Option<MediaItem>>;

    async fn insert_media_item(&self, item: &MediaItem) -> StoreResult<()>;

    /// Apply `update` and return the stored result. Fails with `NotFound`
    /// if the item does not exist and `Transition` if the state machine
    /// rejects the update.
    async fn update_media_item(
        &self,
        id: &MediaItemId,
        update: MediaItemUpdate,
    ) -> StoreResult<MediaItem>;

    /// Insert `task` unless a task with the same id exists. Returns the
    /// stored task and whether it was created by this call.
    async fn create_post_task_if_absent(&self, task: &PostTask) -> StoreResult<(PostTask, bool)>;

    async fn get_post_task(&self, id: &PostTaskId) -> StoreResult<Option<PostTask>>;

    async fn update_post_task(&self, id: &PostTaskId, update: PostTaskUpdate) -> StoreResult<PostTask>;

    async fn post_tasks_for(&self, media_item_id: &MediaItemId) -> StoreResult<Vec<PostTask>>;

    async fn insert_connection(&self, connection: &SocialConnection) -> StoreResult<()>;

    /// Connection of `account` for `platform`. A matching `preferred`
    /// connection wins over the others.
    async fn find_connection(
        &self,
        account: &AccountId,
        platform: Platform,
        preferred: Option<&SocialConnectionId>,
    ) -> StoreResult<Option<SocialConnection>>;

    async fn insert_campaign(&self, campaign: &Campaign) -> StoreResult<()>;

    async fn get_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>>;
}

/// Pick the preferred connection if it is among `candidates`, else the oldest.
pub(crate) fn choose_connection(
    mut candidates: Vec<SocialConnection>,
    preferred: Option<&SocialConnectionId>,
) -> Option<SocialConnection> {
    if let Some(wanted) = preferred {
        if let Some(pos) = candidates.iter().position(|c| &c.id == wanted) {
            return Some(candidates.swap_remove(pos));
        }
    }
    candidates.sort_by_key(|c| c.created_at);
    candidates.into_iter().next()
}
