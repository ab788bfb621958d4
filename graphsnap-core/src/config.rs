//! Configuration for the graph serializer
//!
//! This module provides the settings that shape the encoded envelope (version
//! tag, pretty printing), the safety limit on graph depth, and the policy for
//! deferred tasks that have not settled at serialization time.

use serde::{Deserialize, Serialize};

/// Envelope version written by default
pub const DEFAULT_FORMAT_VERSION: &str = "1";

/// Default nesting limit for one serialize or deserialize run.
///
/// Every node and every snapshot container is one level, so a linked chain
/// uses two levels per link.
pub const DEFAULT_MAX_DEPTH: usize = 4096;

/// What to do with a deferred task that is still pending when serialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingTaskPolicy {
    /// Fail with [`GraphSnapError::UnsettledTask`](crate::GraphSnapError::UnsettledTask)
    #[default]
    Reject,
    /// Log a warning and encode the task as rejected with an error reason
    SerializeAsRejected,
}

/// Configuration structure for [`GraphSerializer`](crate::GraphSerializer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Version tag written into every envelope
    pub format_version: String,
    /// Indent the encoded text
    pub pretty: bool,
    /// Maximum node nesting depth
    pub max_depth: usize,
    /// Handling of pending deferred tasks
    pub pending_tasks: PendingTaskPolicy,
}

impl SerializerConfig {
    /// Default settings with pretty printing turned on
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON text; missing fields take their defaults
    pub fn from_json_str(text: &str) -> crate::Result<Self> {
        let config: SerializerConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.format_version.trim().is_empty() {
            return Err(crate::GraphSnapError::validation(
                "format_version must not be empty",
            ));
        }
        if self.max_depth == 0 {
            return Err(crate::GraphSnapError::validation(
                "max_depth must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            format_version: DEFAULT_FORMAT_VERSION.to_string(),
            pretty: false,
            max_depth: DEFAULT_MAX_DEPTH,
            pending_tasks: PendingTaskPolicy::Reject,
        }
    }
}
