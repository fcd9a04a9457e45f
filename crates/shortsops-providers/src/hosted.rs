//! Hosted render services.
//!
//! These adapters do not talk to a remote API yet: jobs complete at once and
//! point at the provider's CDN.

use async_trait::async_trait;
use shortsops_models::RenderJobId;
use tracing::info;
use uuid::Uuid;

use crate::error::{ProviderError, ProviderResult};
use crate::metrics::record_call;
use crate::traits::{RenderRequest, RenderStatus, VideoRenderer};

/// Which hosted service a [`HostedRenderer`] fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedProvider {
    Invideo,
    Sora,
}

impl HostedProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostedProvider::Invideo => "invideo",
            HostedProvider::Sora => "sora",
        }
    }
}

pub struct HostedRenderer {
    provider: HostedProvider,
    enabled: bool,
}

impl HostedRenderer {
    pub fn invideo() -> Self {
        Self {
            provider: HostedProvider::Invideo,
            enabled: true,
        }
    }

    /// Sora is gated behind `ENABLE_SORA`.
    pub fn sora(enabled: bool) -> Self {
        Self {
            provider: HostedProvider::Sora,
            enabled,
        }
    }

    pub fn provider(&self) -> HostedProvider {
        self.provider
    }

    fn ensure_enabled(&self) -> ProviderResult<()> {
        if self.enabled {
            return Ok(());
        }
        Err(ProviderError::disabled(format!(
            "{} renderer is disabled. Set ENABLE_SORA=true to enable it",
            self.provider.as_str()
        )))
    }

    fn owns(&self, job_id: &RenderJobId) -> bool {
        job_id
            .as_str()
            .strip_prefix(self.provider.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    }
}

#[async_trait]
impl VideoRenderer for HostedRenderer {
    async fn create_render(&self, request: RenderRequest) -> ProviderResult<RenderJobId> {
        self.ensure_enabled()?;

        let job_id = RenderJobId::from(format!("{}_{}", self.provider.as_str(), Uuid::new_v4()));
        record_call(self.provider.as_str(), "create_render", true);
        info!(
            provider = self.provider.as_str(),
            job_id = %job_id,
            hook = %request.script.hook,
            "Hosted render submitted"
        );
        Ok(job_id)
    }

    async fn get_status(&self, job_id: &RenderJobId) -> ProviderResult<RenderStatus> {
        self.ensure_enabled()?;
        if !self.owns(job_id) {
            return Err(ProviderError::JobNotFound(job_id.to_string()));
        }
        Ok(RenderStatus::succeeded(format!(
            "https://mock-{}-cdn.com/{}/output.mp4",
            self.provider.as_str(),
            job_id
        )))
    }
}
