//! Opaque identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier for a media item moving through the pipeline.
    MediaItemId
);

string_id!(
    /// Unique identifier for a platform post task.
    PostTaskId
);

string_id!(
    /// Owning account (organisation) of campaigns and social connections.
    AccountId
);

string_id!(
    /// Campaign a media item was generated for.
    CampaignId
);

string_id!(
    /// Stored social platform connection.
    SocialConnectionId
);

string_id!(
    /// Provider-issued render job identifier.
    RenderJobId
);

string_id!(
    /// Queue job identifier.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(MediaItemId::new(), MediaItemId::new());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = PostTaskId::from_string("post-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"post-1\"");
        assert_eq!(id.to_string(), "post-1");
    }
}
