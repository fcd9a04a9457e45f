//! Render job tracking shared between a renderer and its pollers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shortsops_models::RenderJobId;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{RenderState, RenderStatus};

/// One tracked render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub id: RenderJobId,
    pub state: RenderState,
    pub output_url: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    fn status(&self) -> RenderStatus {
        RenderStatus {
            state: self.state,
            output_url: self.output_url.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct Arena {
    jobs: Vec<RenderJob>,
    index: HashMap<RenderJobId, usize>,
}

/// Arena of render jobs behind one lock.
///
/// Jobs are never removed; terminal states are never overwritten.
#[derive(Default)]
pub struct RenderJobTracker {
    arena: RwLock<Arena>,
}

impl RenderJobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as QUEUED. Re-registering an existing id is a no-op.
    pub async fn register(&self, id: RenderJobId) {
        let mut arena = self.arena.write().await;
        if arena.index.contains_key(&id) {
            return;
        }
        let now = Utc::now();
        let slot = arena.jobs.len();
        arena.jobs.push(RenderJob {
            id: id.clone(),
            state: RenderState::Queued,
            output_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        });
        arena.index.insert(id, slot);
    }

    pub async fn mark_running(&self, id: &RenderJobId) -> ProviderResult<bool> {
        self.transition(id, RenderState::Running, None, None).await
    }

    pub async fn succeed(&self, id: &RenderJobId, output_url: impl Into<String>) -> ProviderResult<bool> {
        self.transition(id, RenderState::Succeeded, Some(output_url.into()), None)
            .await
    }

    pub async fn fail(&self, id: &RenderJobId, error: impl Into<String>) -> ProviderResult<bool> {
        self.transition(id, RenderState::Failed, None, Some(error.into()))
            .await
    }

    pub async fn status(&self, id: &RenderJobId) -> ProviderResult<RenderStatus> {
        let arena = self.arena.read().await;
        arena
            .index
            .get(id)
            .map(|&slot| arena.jobs[slot].status())
            .ok_or_else(|| ProviderError::JobNotFound(id.to_string()))
    }

    pub async fn get(&self, id: &RenderJobId) -> Option<RenderJob> {
        let arena = self.arena.read().await;
        arena.index.get(id).map(|&slot| arena.jobs[slot].clone())
    }

    pub async fn len(&self) -> usize {
        self.arena.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns `Ok(false)` when the move is not allowed from the current state.
    async fn transition(
        &self,
        id: &RenderJobId,
        next: RenderState,
        output_url: Option<String>,
        error: Option<String>,
    ) -> ProviderResult<bool> {
        let mut arena = self.arena.write().await;
        let slot = *arena
            .index
            .get(id)
            .ok_or_else(|| ProviderError::JobNotFound(id.to_string()))?;
        let job = &mut arena.jobs[slot];

        if !job.state.can_transition_to(next) {
            warn!(
                job_id = %id,
                from = job.state.as_str(),
                to = next.as_str(),
                "Ignoring render state change"
            );
            return Ok(false);
        }

        job.state = next;
        if output_url.is_some() {
            job.output_url = output_url;
        }
        if error.is_some() {
            job.error = error;
        }
        job.updated_at = Utc::now();
        Ok(true)
    }
}
