//! Three-part short-form script.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hook / body / call-to-action script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScriptParts {
    pub hook: String,
    pub body: String,
    pub cta: String,
}

impl ScriptParts {
    pub fn new(hook: impl Into<String>, body: impl Into<String>, cta: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            body: body.into(),
            cta: cta.into(),
        }
    }

    /// The single utterance spoken by the voiceover.
    pub fn utterance(&self) -> String {
        format!("{}. {}. {}", self.hook, self.body, self.cta)
    }

    /// Post description: body and call-to-action separated by a blank line.
    pub fn description(&self) -> String {
        format!("{}\n\n{}", self.body, self.cta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_joins_parts() {
        let script = ScriptParts::new("Hook", "Body", "Follow!");
        assert_eq!(script.utterance(), "Hook. Body. Follow!");
        assert_eq!(script.description(), "Body\n\nFollow!");
    }
}
