//! Configuration for the inference fallback

use crate::error::{InferError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the OpenAI-compatible inference endpoint.
///
/// Deserializes from the `[inference]` table of the watcher configuration;
/// every field has a default so the table may be omitted entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferConfig {
    /// Whether low-confidence parses are escalated at all
    pub enabled: bool,
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    /// Bearer token; may be empty for local servers
    pub api_key: String,
    /// Model name passed through to the service
    pub model: String,
    /// Hard timeout for one request, in seconds
    pub timeout_secs: u64,
    /// Confidence given to inferred descriptors that do not report their own
    pub inferred_confidence: f32,
}

impl Default for InferConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            timeout_secs: 15,
            inferred_confidence: 0.75,
        }
    }
}

impl InferConfig {
    /// An enabled configuration pointing at `endpoint`
    pub fn enabled(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            enabled: true,
            endpoint: endpoint.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_inferred_confidence(mut self, confidence: f32) -> Self {
        self.inferred_confidence = confidence;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings that matter when the fallback is enabled
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.endpoint.trim().is_empty() {
            return Err(InferError::invalid_config(
                "inference is enabled but no endpoint is set",
            ));
        }
        if self.model.trim().is_empty() {
            return Err(InferError::invalid_config(
                "inference is enabled but no model is set",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(InferError::invalid_config("timeout_secs must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.inferred_confidence) {
            return Err(InferError::invalid_config(format!(
                "inferred_confidence must be within [0, 1], got {}",
                self.inferred_confidence
            )));
        }
        Ok(())
    }
}
