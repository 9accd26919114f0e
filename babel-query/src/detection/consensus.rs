//! Detection consensus engine
//!
//! Races every enabled remote detector and resolves exactly one
//! [`DetectionResult`] per call. Confirmation rules, first match wins:
//! 1. Authoritative detector answered with a usable code
//! 2. Speed-first mode and an already-confirmed preferred-language answer
//! 3. Two votes for a preferred language, one of them from the reference detector
//! 4. Three distinct detectors agree
//!
//! Without consensus (all detectors done, or deadline hit) the final
//! selection takes the first confirmed-or-preferred arrival, then the local
//! preferred guess, then `auto`. If every detector fails the local chain
//! answers alone.

use super::local::LocalChain;
use super::Detector;
use crate::config::DetectionSettings;
use crate::types::{DetectionCandidate, DetectionResult, Resolution};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Votes required when the reference detector is involved
const REFERENCE_VOTES: usize = 2;
/// Distinct detectors required for unconditional agreement
const CONSENSUS_VOTES: usize = 3;

/// Language detection consensus engine
///
/// Holds no per-call state: every `detect` call owns its own tally, so
/// concurrent or consecutive requests never share votes.
pub struct ConsensusEngine {
    detectors: Vec<Arc<dyn Detector>>,
    local: LocalChain,
}

impl ConsensusEngine {
    pub fn new(detectors: Vec<Arc<dyn Detector>>, local: LocalChain) -> Self {
        Self { detectors, local }
    }

    pub fn detector_ids(&self) -> impl Iterator<Item = &str> {
        self.detectors.iter().map(|d| d.id())
    }

    /// Resolve the source language of `text`
    ///
    /// Never fails. Cancellation drops all outstanding detector calls and
    /// returns the local chain's answer.
    pub async fn detect(
        &self,
        text: &str,
        settings: &DetectionSettings,
        cancel: &CancellationToken,
    ) -> DetectionResult {
        let local = self
            .local
            .evaluate(text, &settings.preferred, settings.low_confidence_threshold);

        // Some remote detectors misclassify capitalized text
        let folded = text.to_lowercase();

        let mut pending: FuturesUnordered<_> = self
            .detectors
            .iter()
            .filter(|d| settings.is_enabled(d.id()))
            .map(|detector| {
                let detector = Arc::clone(detector);
                let text = folded.clone();
                async move {
                    let outcome = detector.detect(&text).await;
                    (detector.id().to_string(), outcome)
                }
            })
            .collect();

        let launched = pending.len();
        if launched == 0 {
            debug!("No remote detectors enabled, using local chain");
            return local.chain_result();
        }

        let mut tally = Tally::default();
        let mut failures = 0usize;

        let deadline = tokio::time::sleep(settings.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("Detection cancelled");
                    return local.chain_result();
                }

                next = pending.next() => match next {
                    Some((_, Ok(candidate))) => {
                        if let Some(result) = tally.observe(candidate, settings) {
                            debug!(
                                language = %result.language(),
                                detector = %result.candidate.source_id,
                                resolution = ?result.resolution,
                                "Detection confirmed"
                            );
                            return result;
                        }
                    }
                    Some((detector, Err(e))) => {
                        warn!(detector = %detector, error = %e, "Detector failed");
                        failures += 1;
                    }
                    None => break,
                },

                _ = &mut deadline => {
                    warn!(
                        deadline_ms = settings.deadline.as_millis() as u64,
                        outstanding = pending.len(),
                        "Detection deadline reached"
                    );
                    break;
                }
            }
        }

        if failures == launched {
            debug!(failures, "Every remote detector failed, using local chain");
            return local.chain_result();
        }

        tally
            .finalize(settings)
            .or_else(|| local.preferred_result())
            .unwrap_or_else(DetectionResult::sentinel)
    }
}

/// Votes seen during one `detect` call, in arrival order
#[derive(Debug, Default)]
struct Tally {
    seen: Vec<DetectionCandidate>,
}

impl Tally {
    /// Apply the confirmation rules to one arrival
    fn observe(
        &mut self,
        candidate: DetectionCandidate,
        settings: &DetectionSettings,
    ) -> Option<DetectionResult> {
        if !candidate.is_usable() {
            debug!(
                detector = %candidate.source_id,
                label = %candidate.raw_label,
                "Ignoring unusable detection"
            );
            return None;
        }

        if settings.is_authoritative(&candidate.source_id) {
            return Some(DetectionResult::new(candidate, true, Resolution::Authoritative));
        }

        let preferred = settings.is_preferred(&candidate.language);

        if settings.speed_first && candidate.confirmed && preferred {
            return Some(DetectionResult::new(candidate, true, Resolution::SpeedFirst));
        }

        let (votes, reference_involved, distinct) = {
            let matching: Vec<&DetectionCandidate> = self
                .seen
                .iter()
                .filter(|c| c.language.matches(&candidate.language))
                .collect();

            let reference_involved = settings.is_reference(&candidate.source_id)
                || matching.iter().any(|c| settings.is_reference(&c.source_id));

            let mut sources: HashSet<&str> =
                matching.iter().map(|c| c.source_id.as_str()).collect();
            sources.insert(&candidate.source_id);

            (matching.len() + 1, reference_involved, sources.len())
        };

        if votes >= REFERENCE_VOTES && reference_involved && preferred {
            return Some(DetectionResult::new(
                candidate,
                true,
                Resolution::ReferenceAgreement,
            ));
        }

        if distinct >= CONSENSUS_VOTES {
            return Some(DetectionResult::new(candidate, true, Resolution::ThreeVotes));
        }

        self.seen.push(candidate);
        None
    }

    /// First arrival that is confirmed or in a preferred language
    fn finalize(self, settings: &DetectionSettings) -> Option<DetectionResult> {
        self.seen
            .into_iter()
            .find(|c| c.confirmed || settings.is_preferred(&c.language))
            .map(|c| {
                let confirmed = c.confirmed;
                DetectionResult::new(c, confirmed, Resolution::FinalSelection)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::local::StatisticalDetector;
    use crate::error::DetectorError;
    use async_trait::async_trait;
    use babel_common::Language;
    use std::time::Duration;

    fn settings() -> DetectionSettings {
        DetectionSettings {
            authoritative: Some("google".into()),
            reference: Some("baidu".into()),
            ..DetectionSettings::default()
        }
    }

    fn vote(source: &str, code: &str) -> DetectionCandidate {
        DetectionCandidate::new(source, code)
    }

    #[test]
    fn test_authoritative_wins_immediately() {
        let mut tally = Tally::default();
        let result = tally.observe(vote("google", "fr"), &settings()).unwrap();
        assert_eq!(result.resolution, Resolution::Authoritative);
        assert!(result.confirmed);
    }

    #[test]
    fn test_authoritative_empty_code_is_non_match() {
        let mut tally = Tally::default();
        assert!(tally.observe(vote("google", ""), &settings()).is_none());
        assert!(tally.seen.is_empty());
    }

    #[test]
    fn test_speed_first_requires_confirmed_preferred() {
        let mut s = settings();
        s.speed_first = true;
        let mut tally = Tally::default();

        assert!(tally.observe(vote("bing", "en"), &s).is_none());
        assert!(tally.observe(vote("bing", "fr").confirmed(true), &s).is_none());
        let result = tally.observe(vote("yandex", "zh").confirmed(true), &s).unwrap();
        assert_eq!(result.resolution, Resolution::SpeedFirst);
    }

    #[test]
    fn test_reference_agreement_needs_preferred_language() {
        let mut tally = Tally::default();
        assert!(tally.observe(vote("baidu", "en"), &settings()).is_none());
        let result = tally.observe(vote("bing", "en"), &settings()).unwrap();
        assert_eq!(result.resolution, Resolution::ReferenceAgreement);

        let mut tally = Tally::default();
        assert!(tally.observe(vote("baidu", "it"), &settings()).is_none());
        assert!(tally.observe(vote("bing", "it"), &settings()).is_none());
    }

    #[test]
    fn test_two_votes_without_reference_keep_waiting() {
        let mut tally = Tally::default();
        assert!(tally.observe(vote("bing", "en"), &settings()).is_none());
        assert!(tally.observe(vote("yandex", "en"), &settings()).is_none());
        assert_eq!(tally.seen.len(), 2);
    }

    #[test]
    fn test_three_distinct_detectors() {
        let mut tally = Tally::default();
        assert!(tally.observe(vote("a", "de"), &settings()).is_none());
        assert!(tally.observe(vote("a", "de"), &settings()).is_none());
        assert!(tally.observe(vote("b", "de"), &settings()).is_none());
        let result = tally.observe(vote("c", "de"), &settings()).unwrap();
        assert_eq!(result.resolution, Resolution::ThreeVotes);
        assert_eq!(result.language().code(), "de");
    }

    #[test]
    fn test_finalize_prefers_first_confirmed_or_preferred() {
        let mut tally = Tally::default();
        tally.observe(vote("a", "it"), &settings());
        tally.observe(vote("b", "zh"), &settings());
        tally.observe(vote("c", "en"), &settings());

        let result = tally.finalize(&settings()).unwrap();
        assert_eq!(result.language().code(), "zh");
        assert_eq!(result.resolution, Resolution::FinalSelection);
        assert!(!result.confirmed);
    }

    struct Silent;

    impl StatisticalDetector for Silent {
        fn scores(&self, _text: &str, _preferred: &[Language; 2]) -> Vec<(Language, f64)> {
            Vec::new()
        }
    }

    struct Never(&'static str);

    #[async_trait]
    impl Detector for Never {
        fn id(&self) -> &str {
            self.0
        }

        async fn detect(&self, _text: &str) -> Result<DetectionCandidate, DetectorError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_detection() {
        let engine = ConsensusEngine::new(
            vec![Arc::new(Never("a")), Arc::new(Never("b"))],
            LocalChain::new(Arc::new(Silent)),
        );
        let mut s = settings();
        s.deadline = Duration::from_millis(200);

        let start = tokio::time::Instant::now();
        let result = engine.detect("¿qué?", &s, &CancellationToken::new()).await;
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(result, DetectionResult::sentinel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_returns_local_chain() {
        let engine = ConsensusEngine::new(
            vec![Arc::new(Never("a"))],
            LocalChain::new(Arc::new(Silent)),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = engine.detect("hello", &settings(), &cancel).await;
        assert_eq!(result.language().code(), "en");
        assert_eq!(result.resolution, Resolution::LocalFallback);
    }

    #[tokio::test]
    async fn test_no_enabled_detectors_uses_local_chain() {
        let engine = ConsensusEngine::new(
            vec![Arc::new(Never("a"))],
            LocalChain::new(Arc::new(Silent)),
        );
        let mut s = settings();
        s.disabled.insert("a".into());

        let result = engine.detect("你好", &s, &CancellationToken::new()).await;
        assert_eq!(result.language().code(), "zh");
    }
}
