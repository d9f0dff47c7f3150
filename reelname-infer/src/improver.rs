//! Capability-gated confidence improvement.
//!
//! The pipeline only ever talks to a [`ConfidenceImprover`]. When inference is
//! disabled that is a [`NoopImprover`]; when enabled it is a
//! [`FallbackImprover`] wrapping an [`InferenceClient`] with a hard timeout and
//! graceful degradation back to the rule-based descriptor.

use crate::error::{InferError, Result};
use async_trait::async_trait;
use reelname_parse::{MediaDescriptor, MediaKind};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Something that turns a raw filename into a descriptor by asking an
/// external service
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Infer a descriptor for `filename`, optionally using the name of its
    /// parent directory as extra context
    async fn infer(&self, filename: &str, parent_dir: Option<&str>) -> Result<MediaDescriptor>;

    /// Get the name/identifier of this client
    fn client_name(&self) -> &str;
}

/// Trait for strategies that may replace a low-confidence descriptor
#[async_trait]
pub trait ConfidenceImprover: Send + Sync {
    /// Return a better descriptor than `baseline`, or `baseline` itself.
    /// Implementations never fail and never block past their own timeout.
    async fn improve(
        &self,
        filename: &str,
        parent_dir: Option<&str>,
        baseline: MediaDescriptor,
    ) -> MediaDescriptor;

    /// Whether this improver can ever change a descriptor
    fn is_enabled(&self) -> bool {
        true
    }
}

/// The improver used when inference is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopImprover;

#[async_trait]
impl ConfidenceImprover for NoopImprover {
    async fn improve(
        &self,
        _filename: &str,
        _parent_dir: Option<&str>,
        baseline: MediaDescriptor,
    ) -> MediaDescriptor {
        baseline
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Wraps an [`InferenceClient`] with a timeout and adoption rules
pub struct FallbackImprover<C> {
    client: C,
    timeout: Duration,
}

impl<C> std::fmt::Debug for FallbackImprover<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackImprover")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: InferenceClient> FallbackImprover<C> {
    pub fn new(client: C, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Run the client under the hard timeout
    pub async fn infer(&self, filename: &str, parent_dir: Option<&str>) -> Result<MediaDescriptor> {
        match tokio::time::timeout(self.timeout, self.client.infer(filename, parent_dir)).await {
            Ok(result) => result,
            Err(_) => Err(InferError::Timeout {
                timeout: self.timeout,
            }),
        }
    }
}

/// An inferred descriptor replaces the baseline only when it names a kind
/// and a title and is more confident than what the rules produced.
fn adopt(inferred: MediaDescriptor, baseline: &MediaDescriptor) -> Option<MediaDescriptor> {
    if inferred.kind == MediaKind::Unknown || inferred.title.is_empty() {
        return None;
    }
    if inferred.confidence <= baseline.confidence {
        return None;
    }
    Some(MediaDescriptor {
        resolution: inferred.resolution.or_else(|| baseline.resolution.clone()),
        ..inferred
    })
}

#[async_trait]
impl<C: InferenceClient> ConfidenceImprover for FallbackImprover<C> {
    async fn improve(
        &self,
        filename: &str,
        parent_dir: Option<&str>,
        baseline: MediaDescriptor,
    ) -> MediaDescriptor {
        match self.infer(filename, parent_dir).await {
            Ok(inferred) => match adopt(inferred, &baseline) {
                Some(better) => {
                    info!(
                        "Inference via {} improved {}: {} ({:.2} -> {:.2})",
                        self.client.client_name(),
                        filename,
                        better.kind,
                        baseline.confidence,
                        better.confidence
                    );
                    better
                }
                None => {
                    debug!("Inference gave no improvement for {}", filename);
                    baseline
                }
            },
            Err(e) => {
                warn!("Inference fallback failed for {}: {}", filename, e);
                baseline
            }
        }
    }
}
