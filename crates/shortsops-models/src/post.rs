//! Platform post tasks.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::ids::{MediaItemId, PostTaskId, SocialConnectionId};
use crate::render::PlatformLimits;

/// Supported social platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Platform {
    Youtube,
    Tiktok,
    Instagram,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Youtube,
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "YOUTUBE",
            Platform::Tiktok => "TIKTOK",
            Platform::Instagram => "INSTAGRAM",
            Platform::Facebook => "FACEBOOK",
        }
    }

    /// Lowercase form used in ids and URLs.
    pub fn slug(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Facebook => "facebook",
        }
    }

    pub fn limits(&self) -> PlatformLimits {
        PlatformLimits::for_platform(*self)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Post task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    #[default]
    Scheduled,
    Posting,
    Posted,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "SCHEDULED",
            PostStatus::Posting => "POSTING",
            PostStatus::Posted => "POSTED",
            PostStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Posted)
    }

    /// `Failed -> Posting` is a retry of the post job. `Posting -> Posting`
    /// takes over an abandoned attempt and is further gated by
    /// [`PostTask::start_posting`]. Nothing leaves POSTED.
    pub fn can_transition_to(&self, next: PostStatus) -> bool {
        use PostStatus::*;
        matches!(
            (self, next),
            (Scheduled, Posting)
                | (Scheduled, Failed)
                | (Posting, Posting)
                | (Posting, Posted)
                | (Posting, Failed)
                | (Failed, Posting)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a post attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PostResult {
    Published {
        #[serde(rename = "externalId")]
        external_id: String,
        #[serde(rename = "publishUrl", default, skip_serializing_if = "Option::is_none")]
        publish_url: Option<String>,
    },
    Error {
        error: String,
    },
}

/// Rejected post task mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostTransitionError {
    #[error("invalid post transition {from} -> {to}")]
    Invalid { from: PostStatus, to: PostStatus },

    #[error("post task already POSTED")]
    AlreadyPosted,

    #[error("post task is being posted since {since}")]
    InProgress { since: DateTime<Utc> },
}

/// One media item posted to one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostTask {
    pub id: PostTaskId,
    pub media_item_id: MediaItemId,
    pub platform: Platform,

    /// Connection hint from the schedule request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_connection_id: Option<SocialConnectionId>,

    pub scheduled_at: DateTime<Utc>,

    #[serde(default)]
    pub status: PostStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<PostResult>,

    /// Number of times posting was started
    #[serde(default)]
    pub attempts: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PostTask {
    /// Deterministic task id for one platform of one scheduling request.
    pub fn task_id(request_id: &str, platform: Platform) -> PostTaskId {
        PostTaskId::from_string(format!("{}-{}", request_id, platform.slug()))
    }

    pub fn new(
        request_id: &str,
        media_item_id: MediaItemId,
        platform: Platform,
        social_connection_id: Option<SocialConnectionId>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Self::task_id(request_id, platform),
            media_item_id,
            platform,
            social_connection_id,
            scheduled_at,
            status: PostStatus::Scheduled,
            result: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim the task for one post attempt.
    ///
    /// A POSTING task is only taken over once its attempt is older than
    /// `lease`, so concurrent deliveries of one post job upload once.
    pub fn start_posting(&mut self, lease: Duration) -> Result<(), PostTransitionError> {
        if self.status == PostStatus::Posting {
            let stale = (Utc::now() - self.updated_at)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= lease);
            if !stale {
                return Err(PostTransitionError::InProgress {
                    since: self.updated_at,
                });
            }
        }
        self.transition(PostStatus::Posting)?;
        self.attempts += 1;
        Ok(())
    }

    pub fn mark_posted(
        &mut self,
        external_id: impl Into<String>,
        publish_url: Option<String>,
    ) -> Result<(), PostTransitionError> {
        self.transition(PostStatus::Posted)?;
        self.result = Some(PostResult::Published {
            external_id: external_id.into(),
            publish_url,
        });
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), PostTransitionError> {
        self.transition(PostStatus::Failed)?;
        self.result = Some(PostResult::Error { error: error.into() });
        Ok(())
    }

    /// External id of a published post.
    pub fn external_id(&self) -> Option<&str> {
        match &self.result {
            Some(PostResult::Published { external_id, .. }) => Some(external_id),
            _ => None,
        }
    }

    fn transition(&mut self, next: PostStatus) -> Result<(), PostTransitionError> {
        if self.status == PostStatus::Posted {
            return Err(PostTransitionError::AlreadyPosted);
        }
        if !self.status.can_transition_to(next) {
            return Err(PostTransitionError::Invalid {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(300);

    fn task() -> PostTask {
        PostTask::new(
            "req-1",
            MediaItemId::from("m1"),
            Platform::Tiktok,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_task_id_is_deterministic() {
        assert_eq!(task().id.as_str(), "req-1-tiktok");
        assert_eq!(task().id, task().id);
    }

    #[test]
    fn test_post_lifecycle() {
        let mut t = task();
        t.start_posting(LEASE).unwrap();
        t.mark_posted("tiktok_1", Some("https://x/1".into())).unwrap();
        assert_eq!(t.status, PostStatus::Posted);
        assert_eq!(t.external_id(), Some("tiktok_1"));
        assert_eq!(t.start_posting(LEASE), Err(PostTransitionError::AlreadyPosted));
    }

    #[test]
    fn test_cannot_post_without_posting() {
        let mut t = task();
        assert_eq!(
            t.mark_posted("x", None),
            Err(PostTransitionError::Invalid {
                from: PostStatus::Scheduled,
                to: PostStatus::Posted
            })
        );
    }

    #[test]
    fn test_failed_task_can_be_retried() {
        let mut t = task();
        t.start_posting(LEASE).unwrap();
        t.mark_failed("rate limited").unwrap();
        assert_eq!(
            t.result,
            Some(PostResult::Error {
                error: "rate limited".to_string()
            })
        );
        t.start_posting(LEASE).unwrap();
        assert_eq!(t.attempts, 2);
    }

    #[test]
    fn test_live_attempt_blocks_second_start() {
        let mut t = task();
        t.start_posting(LEASE).unwrap();
        let err = t.start_posting(LEASE).unwrap_err();
        assert!(matches!(err, PostTransitionError::InProgress { .. }));
        assert_eq!(t.attempts, 1);
        assert_eq!(t.status, PostStatus::Posting);
    }

    #[test]
    fn test_stale_attempt_is_taken_over() {
        let mut t = task();
        t.start_posting(LEASE).unwrap();
        t.updated_at = Utc::now() - chrono::Duration::minutes(6);
        t.start_posting(LEASE).unwrap();
        assert_eq!(t.attempts, 2);
        assert_eq!(t.status, PostStatus::Posting);
    }

    #[test]
    fn test_result_wire_format() {
        let result = PostResult::Published {
            external_id: "yt_1".into(),
            publish_url: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "published");
        assert_eq!(json["externalId"], "yt_1");
        assert_eq!(serde_json::to_value(Platform::Youtube).unwrap(), "YOUTUBE");
    }
}
