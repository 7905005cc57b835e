//! Session configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// UndoConfig
// ---------------------------------------------------------------------------

/// Configuration for an editing session's undo history.
///
/// Missing keys in a JSON document fall back to [`UndoConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Maximum number of undoable changesets kept above the baseline. When
    /// exceeded, the oldest changeset is folded into the baseline. `0`
    /// disables the bound.
    pub max_history: usize,
    /// Log every undo/redo replay at `info` instead of `debug`.
    pub log_replays: bool,
}

impl Default for UndoConfig {
    /// Defaults to 256 changesets of history, replays logged at `debug`.
    fn default() -> Self {
        Self {
            max_history: 256,
            log_replays: false,
        }
    }
}

impl UndoConfig {
    /// Parse a configuration from a JSON document.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("failed to parse undo configuration")
    }

    /// Whether `len` changesets above the baseline exceed the history bound.
    pub(crate) fn exceeds_history(&self, len: usize) -> bool {
        self.max_history != 0 && len > self.max_history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_use_defaults() {
        let config = UndoConfig::from_json_str(r#"{ "log_replays": true }"#).unwrap();
        assert_eq!(config.max_history, 256);
        assert!(config.log_replays);
    }

    #[test]
    fn malformed_json_is_an_error_with_context() {
        let err = UndoConfig::from_json_str("{ max_history: }").unwrap_err();
        assert!(err.to_string().contains("undo configuration"));
    }

    #[test]
    fn zero_disables_the_bound() {
        let config = UndoConfig {
            max_history: 0,
            ..Default::default()
        };
        assert!(!config.exceeds_history(10_000));
        let config = UndoConfig {
            max_history: 2,
            ..Default::default()
        };
        assert!(!config.exceeds_history(2));
        assert!(config.exceeds_history(3));
    }
}
