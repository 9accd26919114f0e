//! Scripted collaborators
//!
//! Delays use `tokio::time::sleep`, so tests running with
//! `start_paused = true` see exact, virtual timings.

use async_trait::async_trait;
use babel_common::Language;
use babel_query::detection::StatisticalDetector;
use babel_query::{
    AudioPlayer, DetectionCandidate, Detector, DetectorError, Provider, ProviderError,
    ProviderPayload, ProviderQuery,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type ProviderScript =
    Box<dyn Fn(usize) -> (Duration, Result<ProviderPayload, ProviderError>) + Send + Sync>;

/// Provider whose n-th call (0-based) follows a script
pub struct ScriptedProvider {
    id: String,
    script: ProviderScript,
    calls: AtomicUsize,
    queries: Mutex<Vec<ProviderQuery>>,
    honour_cancel: bool,
}

impl ScriptedProvider {
    pub fn new<F>(id: &str, script: F) -> Arc<Self>
    where
        F: Fn(usize) -> (Duration, Result<ProviderPayload, ProviderError>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: id.to_string(),
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            honour_cancel: true,
        })
    }

    /// Ignores cancellation and always delivers its outcome, stale or not
    pub fn stubborn<F>(id: &str, script: F) -> Arc<Self>
    where
        F: Fn(usize) -> (Duration, Result<ProviderPayload, ProviderError>) + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: id.to_string(),
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
            honour_cancel: false,
        })
    }

    /// Always answers `payload` after `delay_ms`
    pub fn answering(id: &str, delay_ms: u64, payload: ProviderPayload) -> Arc<Self> {
        Self::new(id, move |_| (Duration::from_millis(delay_ms), Ok(payload.clone())))
    }

    pub fn translation(id: &str, delay_ms: u64, text: &str) -> Arc<Self> {
        Self::answering(id, delay_ms, ProviderPayload::translation(vec![text.to_string()]))
    }

    pub fn failing(id: &str, delay_ms: u64, error: ProviderError) -> Arc<Self> {
        Self::new(id, move |_| (Duration::from_millis(delay_ms), Err(error.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<ProviderQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(
        &self,
        query: &ProviderQuery,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.clone());
        let (delay, outcome) = (self.script)(call);

        if !self.honour_cancel {
            tokio::time::sleep(delay).await;
            return outcome;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            _ = tokio::time::sleep(delay) => outcome,
        }
    }
}

#[derive(Clone)]
enum DetectorScript {
    Answer(DetectionCandidate),
    Fail,
    Pending,
}

/// Detector with a fixed answer after a delay
pub struct ScriptedDetector {
    id: String,
    delay: Duration,
    script: DetectorScript,
    texts: Mutex<Vec<String>>,
}

impl ScriptedDetector {
    fn build(id: &str, delay_ms: u64, script: DetectorScript) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::from_millis(delay_ms),
            script,
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn answer(id: &str, delay_ms: u64, code: &str) -> Self {
        Self::build(
            id,
            delay_ms,
            DetectorScript::Answer(DetectionCandidate::new(id, code)),
        )
    }

    /// Answer that the detector itself vouches for
    pub fn confirmed(id: &str, delay_ms: u64, code: &str) -> Self {
        Self::build(
            id,
            delay_ms,
            DetectorScript::Answer(DetectionCandidate::new(id, code).confirmed(true)),
        )
    }

    pub fn failing(id: &str, delay_ms: u64) -> Self {
        Self::build(id, delay_ms, DetectorScript::Fail)
    }

    /// Never answers
    pub fn pending(id: &str) -> Self {
        Self::build(id, 0, DetectorScript::Pending)
    }

    pub fn into_arc(self) -> Arc<dyn Detector> {
        Arc::new(self)
    }

    /// Texts this detector was asked about
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn detect(&self, text: &str) -> Result<DetectionCandidate, DetectorError> {
        self.texts.lock().unwrap().push(text.to_string());

        if let DetectorScript::Pending = self.script {
            return std::future::pending().await;
        }

        tokio::time::sleep(self.delay).await;

        match &self.script {
            DetectorScript::Answer(candidate) => Ok(candidate.clone()),
            DetectorScript::Fail => Err(DetectorError::Network("connection refused".into())),
            DetectorScript::Pending => unreachable!(),
        }
    }
}

/// Statistical detector with canned scores
pub struct FixedStatistics(pub Vec<(Language, f64)>);

impl FixedStatistics {
    pub fn new(scores: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self(
            scores.iter().map(|(c, s)| (Language::new(c), *s)).collect(),
        ))
    }

    pub fn silent() -> Arc<Self> {
        Arc::new(Self(Vec::new()))
    }
}

impl StatisticalDetector for FixedStatistics {
    fn scores(&self, _text: &str, _preferred: &[Language; 2]) -> Vec<(Language, f64)> {
        self.0.clone()
    }
}

/// Audio player that records every request
#[derive(Default)]
pub struct RecordingAudio {
    plays: Mutex<Vec<(String, Language)>>,
}

impl RecordingAudio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plays(&self) -> Vec<(String, Language)> {
        self.plays.lock().unwrap().clone()
    }
}

impl AudioPlayer for RecordingAudio {
    fn download_and_play(&self, word: &str, language: &Language) {
        self.plays
            .lock()
            .unwrap()
            .push((word.to_string(), language.clone()));
    }
}
