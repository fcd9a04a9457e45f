//! Campaigns, social connections and credential bundles.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{AccountId, CampaignId, SocialConnectionId};
use crate::post::Platform;

/// Content campaign owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: CampaignId,
    pub account_id: AccountId,
    /// Topic area, e.g. "fitness"
    pub niche: String,
    pub primary_lang: String,
}

impl Campaign {
    pub fn new(account_id: AccountId, niche: impl Into<String>, primary_lang: impl Into<String>) -> Self {
        Self {
            id: CampaignId::new(),
            account_id,
            niche: niche.into(),
            primary_lang: primary_lang.into(),
        }
    }
}

/// Stored connection to a social platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SocialConnection {
    pub id: SocialConnectionId,
    pub account_id: AccountId,
    pub platform: Platform,
    /// Sealed [`TokenBundle`]
    pub access: String,
    pub created_at: DateTime<Utc>,
}

impl SocialConnection {
    pub fn new(account_id: AccountId, platform: Platform, access: impl Into<String>) -> Self {
        Self {
            id: SocialConnectionId::new(),
            account_id,
            platform,
            access: access.into(),
            created_at: Utc::now(),
        }
    }
}

/// Decrypted platform credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenBundle {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

// Keep tokens out of logs.
impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}
