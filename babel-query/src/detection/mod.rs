//! Language detection
//!
//! - `local` - synchronous fallback chain (statistical → character class → `auto`)
//! - `consensus` - races remote detectors and applies the confirmation rules

pub mod consensus;
pub mod local;

pub use consensus::ConsensusEngine;
pub use local::{LocalChain, LocalDetection, StatisticalDetector, WhatlangDetector};

use crate::error::DetectorError;
use crate::types::DetectionCandidate;
use async_trait::async_trait;

/// Remote detector adapter
///
/// Each detector is independent: a failure is isolated to that detector and
/// never cancels its siblings. Implementations must not panic; report
/// problems through `DetectorError`.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detector identifier (e.g. "google", "baidu")
    fn id(&self) -> &str;

    /// Guess the language of already case-folded text
    async fn detect(&self, text: &str) -> Result<DetectionCandidate, DetectorError>;
}
