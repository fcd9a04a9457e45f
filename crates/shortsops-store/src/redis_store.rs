//! Redis-backed store.
//!
//! Records are JSON documents under `{prefix}:{kind}:{id}`. Updates run
//! WATCH / GET / MULTI SET / EXEC and retry on conflict.

use std::time::Instant;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shortsops_models::{
    AccountId, Campaign, CampaignId, MediaItem, MediaItemId, Platform, PostTask, PostTaskId,
    SocialConnection, SocialConnectionId,
};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::metrics::{record_conflict, record_operation};
use crate::store::{choose_connection, PipelineStore};
use crate::update::{MediaItemUpdate, PostTaskUpdate};

const MAX_WATCH_RETRIES: usize = 5;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            prefix: "shortsops".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            prefix: std::env::var("QUEUE_PREFIX").unwrap_or_else(|_| "shortsops".to_string()),
        }
    }
}

pub struct RedisStore {
    client: redis::Client,
    prefix: String,
}

impl RedisStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            prefix: config.prefix,
        })
    }

    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn media_key(&self, id: &MediaItemId) -> String {
        format!("{}:media:{}", self.prefix, id)
    }

    fn post_key(&self, id: &PostTaskId) -> String {
        format!("{}:post:{}", self.prefix, id)
    }

    fn media_posts_key(&self, id: &MediaItemId) -> String {
        format!("{}:media:{}:posts", self.prefix, id)
    }

    fn connection_key(&self, id: &SocialConnectionId) -> String {
        format!("{}:connection:{}", self.prefix, id)
    }

    fn account_connections_key(&self, account: &AccountId, platform: Platform) -> String {
        format!("{}:account:{}:connections:{}", self.prefix, account, platform.slug())
    }

    fn campaign_key(&self, id: &CampaignId) -> String {
        format!("{}:campaign:{}", self.prefix, id)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(key).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, serde_json::to_string(value)?).await?;
        Ok(())
    }

    /// Optimistic read-modify-write of one JSON document.
    ///
    /// Each attempt uses its own connection so WATCH state is not shared
    /// with other callers.
    async fn modify<T, E, F>(&self, entity: &'static str, key: &str, id: &str, apply: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned + Send,
        E: Into<StoreError> + Send,
        F: Fn(&mut T) -> Result<(), E> + Send + Sync,
    {
        let started = Instant::now();

        for attempt in 0..MAX_WATCH_RETRIES {
            let mut conn = self.conn().await?;
            redis::cmd("WATCH").arg(key).query_async::<()>(&mut conn).await?;

            let raw: Option<String> = conn.get(key).await?;
            let Some(raw) = raw else {
                redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                record_operation(entity, "update", false, elapsed_ms(started));
                return Err(StoreError::not_found(entity, id));
            };

            let mut record: T = serde_json::from_str(&raw)?;
            if let Err(rejected) = apply(&mut record).map_err(Into::<StoreError>::into) {
                redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                record_operation(entity, "update", false, elapsed_ms(started));
                return Err(rejected);
            }

            let payload = serde_json::to_string(&record)?;
            let committed: Option<()> = redis::pipe()
                .atomic()
                .set(key, payload)
                .ignore()
                .query_async(&mut conn)
                .await?;

            if committed.is_some() {
                record_operation(entity, "update", true, elapsed_ms(started));
                return Ok(record);
            }

            record_conflict(entity);
            debug!(entity, id, attempt, "WATCH conflict, retrying update");
        }

        warn!(entity, id, "Update retries exhausted");
        record_operation(entity, "update", false, elapsed_ms(started));
        Err(StoreError::Conflict(id.to_string()))
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl PipelineStore for RedisStore {
    async fn get_media_item(&self, id: &MediaItemId) -> StoreResult<Option<MediaItem>> {
        self.get_json(&self.media_key(id)).await
    }

    async fn insert_media_item(&self, item: &MediaItem) -> StoreResult<()> {
        let started = Instant::now();
        let result = self.set_json(&self.media_key(&item.id), item).await;
        record_operation("media item", "insert", result.is_ok(), elapsed_ms(started));
        result
    }

    async fn update_media_item(
        &self,
        id: &MediaItemId,
        update: MediaItemUpdate,
    ) -> StoreResult<MediaItem> {
        self.modify("media item", &self.media_key(id), id.as_str(), |item: &mut MediaItem| {
            update.apply(item)
        })
        .await
    }

    async fn create_post_task_if_absent(&self, task: &PostTask) -> StoreResult<(PostTask, bool)> {
        let mut conn = self.conn().await?;
        let key = self.post_key(&task.id);

        let created: bool = redis::cmd("SET")
            .arg(&key)
            .arg(serde_json::to_string(task)?)
            .arg("NX")
            .query_async::<Option<String>>(&mut conn)
            .await?
            .is_some();

        if created {
            conn.sadd::<_, _, ()>(self.media_posts_key(&task.media_item_id), task.id.as_str())
                .await?;
            return Ok((task.clone(), true));
        }

        let existing = self
            .get_json::<PostTask>(&key)
            .await?
            .ok_or_else(|| StoreError::not_found("post task", task.id.as_str()))?;
        Ok((existing, false))
    }

    async fn get_post_task(&self, id: &PostTaskId) -> StoreResult<Option<PostTask>> {
        self.get_json(&self.post_key(id)).await
    }

    async fn update_post_task(&self, id: &PostTaskId, update: PostTaskUpdate) -> StoreResult<PostTask> {
        self.modify("post task", &self.post_key(id), id.as_str(), |task: &mut PostTask| {
            update.apply(task)
        })
        .await
    }

    async fn post_tasks_for(&self, media_item_id: &MediaItemId) -> StoreResult<Vec<PostTask>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.smembers(self.media_posts_key(media_item_id)).await?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.get_post_task(&PostTaskId::from(id)).await? {
                tasks.push(task);
            }
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    async fn insert_connection(&self, connection: &SocialConnection) -> StoreResult<()> {
        self.set_json(&self.connection_key(&connection.id), connection)
            .await?;
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(
            self.account_connections_key(&connection.account_id, connection.platform),
            connection.id.as_str(),
        )
        .await?;
        Ok(())
    }

    async fn find_connection(
        &self,
        account: &AccountId,
        platform: Platform,
        preferred: Option<&SocialConnectionId>,
    ) -> StoreResult<Option<SocialConnection>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .smembers(self.account_connections_key(account, platform))
            .await?;

        let mut candidates = Vec::with_capacity(ids.len());
        for id in ids {
            let key = self.connection_key(&SocialConnectionId::from(id));
            if let Some(connection) = self.get_json::<SocialConnection>(&key).await? {
                candidates.push(connection);
            }
        }
        Ok(choose_connection(candidates, preferred))
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> StoreResult<()> {
        self.set_json(&self.campaign_key(&campaign.id), campaign).await
    }

    async fn get_campaign(&self, id: &CampaignId) -> StoreResult<Option<Campaign>> {
        self.get_json(&self.campaign_key(id)).await
    }
}
