//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for one [`Engine`](crate::Engine).
///
/// Every field has a default, so a JSON document only needs to name the
/// fields it overrides:
///
/// ```
/// use rexpr_engine::EngineOptions;
///
/// let options = EngineOptions::from_json(r#"{ "history_limit": 50 }"#).unwrap();
/// assert_eq!(options.history_limit, Some(50));
/// assert_eq!(options.max_commit_passes, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Upper bound on scheduler tasks drained by one settle.
    pub max_settle_steps: usize,
    /// Upper bound on convergence passes per root per commit.
    pub max_commit_passes: usize,
    /// Oldest change batches beyond this count are dropped from a tracker.
    pub history_limit: Option<usize>,
    /// Whether leaf identifiers may observe nested container keys.
    pub deep_observation: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_settle_steps: 10_000,
            max_commit_passes: 64,
            history_limit: None,
            deep_observation: true,
        }
    }
}

impl EngineOptions {
    /// Parse options from a JSON object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to a JSON object.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
