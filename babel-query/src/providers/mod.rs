//! Provider and audio collaborator seams
//!
//! Concrete provider adapters (scraping, request signing) live outside this
//! crate. `http` offers a generic JSON adapter for endpoints that already
//! speak the normalized format.

pub mod http;

pub use http::{HttpDetector, HttpProvider};

use crate::error::ProviderError;
use crate::types::{ProviderPayload, ProviderQuery};
use async_trait::async_trait;
use babel_common::Language;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Translation or dictionary provider adapter
///
/// One remote call per invocation. Rate limiting must be reported as
/// [`ProviderError::RateLimited`] so the orchestrator can retry it; every
/// other problem is [`ProviderError::Failed`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider identifier, matching `[[providers]] id`
    fn id(&self) -> &str;

    /// Translate one query
    ///
    /// `cancel` fires when the owning request is superseded; implementations
    /// should abort the network call rather than finish it.
    async fn translate(
        &self,
        query: &ProviderQuery,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload, ProviderError>;
}

/// Audio download/playback collaborator
///
/// Fire-and-forget. Implementations are expected to be idempotent for the
/// same word (e.g. keyed on a local cache).
pub trait AudioPlayer: Send + Sync {
    fn download_and_play(&self, word: &str, language: &Language);
}

/// Audio player that only records the request in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAudioPlayer;

impl AudioPlayer for LoggingAudioPlayer {
    fn download_and_play(&self, word: &str, language: &Language) {
        info!(word = %word, language = %language, "Audio playback requested");
    }
}
