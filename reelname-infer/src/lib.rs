//! # reelname-infer
//!
//! Optional inference fallback for filenames the rule-based parser in
//! `reelname-parse` cannot describe with enough confidence.
//!
//! The pipeline holds an `Arc<dyn ConfidenceImprover>` and calls
//! [`ConfidenceImprover::improve`] with the rule-based descriptor. The
//! improver either returns something better or hands the baseline back; it
//! never fails, and a slow or broken service costs at most one timeout.
//!
//! ```no_run
//! use reelname_infer::{InferConfig, improver_from_config};
//! use reelname_parse::parse;
//!
//! # async fn example() -> reelname_infer::Result<()> {
//! let config = InferConfig::enabled("http://localhost:8080/v1", "local-model");
//! let improver = improver_from_config(&config)?;
//!
//! let baseline = parse("asdkjasd.mkv");
//! let improved = improver.improve("asdkjasd.mkv", None, baseline).await;
//! println!("{} ({:.2})", improved.title, improved.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: the `[inference]` configuration table
//! - [`improver`]: the improver trait, the no-op and the timeout/fallback wrapper
//! - [`client`]: an OpenAI-compatible chat completion client
//! - [`response`]: lenient decoding of the service's answer
//! - [`error`]: error types and result handling

pub mod client;
pub mod config;
pub mod error;
pub mod improver;
pub mod response;

use std::sync::Arc;

pub use client::ChatCompletionClient;
pub use config::InferConfig;
pub use error::{InferError, Result};
pub use improver::{ConfidenceImprover, FallbackImprover, InferenceClient, NoopImprover};

/// Build the improver described by `config`.
///
/// Disabled configurations produce a [`NoopImprover`]. Enabled ones are
/// validated and wrap a [`ChatCompletionClient`] in a [`FallbackImprover`].
pub fn improver_from_config(config: &InferConfig) -> Result<Arc<dyn ConfidenceImprover>> {
    if !config.enabled {
        return Ok(Arc::new(NoopImprover));
    }
    let client = ChatCompletionClient::new(config)?;
    tracing::info!(
        "Inference fallback enabled: model {} at {}",
        config.model,
        client.url()
    );
    Ok(Arc::new(FallbackImprover::new(client, config.timeout())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_config_gives_noop() {
        let improver = improver_from_config(&InferConfig::default()).unwrap();
        assert!(!improver.is_enabled());

        let baseline = reelname_parse::parse("asdkjasd.mkv");
        let improved =
            tokio_test::block_on(improver.improve("asdkjasd.mkv", None, baseline.clone()));
        assert_eq!(improved, baseline);
    }

    #[test]
    fn test_enabled_config_gives_fallback() {
        let config = InferConfig::enabled("http://localhost:8080/v1", "local");
        let improver = improver_from_config(&config).unwrap();
        assert!(improver.is_enabled());
    }

    #[test]
    fn test_invalid_enabled_config_is_rejected() {
        let config = InferConfig::enabled("http://localhost:8080/v1", "");
        assert!(matches!(
            improver_from_config(&config),
            Err(InferError::InvalidConfig { .. })
        ));
    }
}
