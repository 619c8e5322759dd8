//! Planner configuration.
//!
//! ```
//! use ironstage::options::{FlowPartMode, PlannerOptions};
//!
//! let options = PlannerOptions::from_json(
//!     r#"{ "flow_parts": "Aggregate", "extra_attributes": { "compressFlowBlockGroup": "disabled" } }"#,
//! )?;
//! assert_eq!(options.flow_parts, FlowPartMode::Aggregate);
//! assert!(!options.compression().enabled);
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key toggling stage-group compression.
pub const COMPRESS_FLOW_BLOCK_GROUP: &str = "compressFlowBlockGroup";

/// How nested flow parts are inlined.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum FlowPartMode {
    /// Fuse the part with its surroundings.
    Aggregate,
    /// Inline, but keep a stage boundary at every seam.
    #[default]
    Segregate,
}

#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerOptions {
    pub flow_parts: FlowPartMode,
    /// Overrides the `compressFlowBlockGroup` attribute when set.
    pub compress_flow_block_group: Option<bool>,
    pub extra_attributes: BTreeMap<String, String>,
}

/// Resolved compression toggle, plus the attribute value that could not be
/// understood, if any.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CompressionSetting {
    pub enabled: bool,
    pub rejected: Option<String>,
}

impl PlannerOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or unknown enum values.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid planner options")
    }

    #[must_use]
    pub fn flow_parts(mut self, mode: FlowPartMode) -> Self {
        self.flow_parts = mode;
        self
    }

    #[must_use]
    pub fn compress_flow_block_group(mut self, enabled: bool) -> Self {
        self.compress_flow_block_group = Some(enabled);
        self
    }

    #[must_use]
    pub fn attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.extra_attributes.insert(key.into(), value.into());
        self
    }

    /// Whether stage groups at equal distance are merged.
    #[must_use]
    pub fn compression(&self) -> CompressionSetting {
        if let Some(enabled) = self.compress_flow_block_group {
            return CompressionSetting {
                enabled,
                rejected: None,
            };
        }
        match self.extra_attributes.get(COMPRESS_FLOW_BLOCK_GROUP) {
            None => CompressionSetting {
                enabled: true,
                rejected: None,
            },
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "enabled" => CompressionSetting {
                    enabled: true,
                    rejected: None,
                },
                "disabled" => CompressionSetting {
                    enabled: false,
                    rejected: None,
                },
                _ => CompressionSetting {
                    enabled: true,
                    rejected: Some(value.clone()),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_is_case_insensitive() {
        let options = PlannerOptions::new().attribute(COMPRESS_FLOW_BLOCK_GROUP, "Disabled");
        assert!(!options.compression().enabled);
    }

    #[test]
    fn unknown_value_falls_back_to_enabled() {
        let options = PlannerOptions::new().attribute(COMPRESS_FLOW_BLOCK_GROUP, "sometimes");
        let setting = options.compression();
        assert!(setting.enabled);
        assert_eq!(setting.rejected.as_deref(), Some("sometimes"));
    }

    #[test]
    fn explicit_field_beats_attribute() {
        let options = PlannerOptions::new()
            .attribute(COMPRESS_FLOW_BLOCK_GROUP, "enabled")
            .compress_flow_block_group(false);
        assert!(!options.compression().enabled);
    }
}
