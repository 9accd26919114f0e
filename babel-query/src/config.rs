//! Per-request settings snapshot
//!
//! Built from [`BabelConfig`] and published to the orchestrator through a
//! `watch` channel. The orchestrator clones the current value once when a
//! request is created, so configuration never changes mid-flight.

use crate::sort_order::SortOrder;
use babel_common::config::{BabelConfig, ProviderKind};
use babel_common::Language;
use std::collections::HashSet;
use std::time::Duration;

/// Provider feature flags relevant to orchestration and display
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub id: String,
    pub kind: ProviderKind,
    pub title: String,
    pub enabled: bool,
    pub priority: u32,
    pub headline_fallback: Option<String>,
    /// May trigger audio auto-play
    pub audio: bool,
}

impl ProviderSettings {
    pub fn new(id: impl Into<String>, kind: ProviderKind) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            kind,
            enabled: true,
            priority: 100,
            headline_fallback: None,
            audio: true,
        }
    }

    pub fn priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    pub fn headline_fallback(mut self, provider_id: impl Into<String>) -> Self {
        self.headline_fallback = Some(provider_id.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Consensus engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub preferred: [Language; 2],
    pub authoritative: Option<String>,
    pub reference: Option<String>,
    pub speed_first: bool,
    pub deadline: Duration,
    pub low_confidence_threshold: f64,
    /// Detector ids switched off in configuration
    pub disabled: HashSet<String>,
}

impl DetectionSettings {
    pub fn is_preferred(&self, language: &Language) -> bool {
        self.preferred.iter().any(|p| p.matches(language))
    }

    pub fn is_enabled(&self, detector_id: &str) -> bool {
        !self.disabled.contains(detector_id)
    }

    pub fn is_authoritative(&self, detector_id: &str) -> bool {
        self.authoritative.as_deref() == Some(detector_id)
    }

    pub fn is_reference(&self, detector_id: &str) -> bool {
        self.reference.as_deref() == Some(detector_id)
    }
}

impl Default for DetectionSettings {
    fn default() -> Self {
        QuerySettings::default().detection
    }
}

/// Everything a single request reads from configuration
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySettings {
    pub preferred: [Language; 2],
    /// Default target for debounced input
    pub target_language: Language,
    pub sort_override: Option<String>,
    /// Configuration order
    pub providers: Vec<ProviderSettings>,
    pub auto_play_audio: bool,
    pub debounce: Duration,
    pub rate_limit_retry: Duration,
    pub detection: DetectionSettings,
}

impl QuerySettings {
    pub fn from_config(config: &BabelConfig) -> Self {
        let preferred = config.query.preferred_languages.clone();
        let providers = config
            .providers
            .iter()
            .map(|p| ProviderSettings {
                id: p.id.clone(),
                kind: p.kind,
                title: p.display_title().to_string(),
                enabled: p.enabled,
                priority: p.priority,
                headline_fallback: p.headline_fallback.clone(),
                audio: p.audio,
            })
            .collect();

        let detection = DetectionSettings {
            preferred: preferred.clone(),
            authoritative: config.detection.authoritative.clone(),
            reference: config.detection.reference.clone(),
            speed_first: config.detection.speed_first,
            deadline: Duration::from_millis(config.detection.deadline_ms),
            low_confidence_threshold: config.detection.low_confidence_threshold,
            disabled: config
                .detection
                .detectors
                .iter()
                .filter(|d| !d.enabled)
                .map(|d| d.id.clone())
                .collect(),
        };

        Self {
            preferred,
            target_language: config.query.target_language.clone(),
            sort_override: config.query.sort_order.clone(),
            providers,
            auto_play_audio: config.query.auto_play_audio,
            debounce: Duration::from_millis(config.query.debounce_ms),
            rate_limit_retry: Duration::from_millis(config.query.rate_limit_retry_ms),
            detection,
        }
    }

    /// Replace the provider list (builder style, mostly for embedding and tests)
    pub fn with_providers(mut self, providers: Vec<ProviderSettings>) -> Self {
        self.providers = providers;
        self
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderSettings> {
        self.providers.iter().find(|p| p.id == id)
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.iter().filter(|p| p.enabled)
    }

    pub fn sort_order(&self) -> SortOrder {
        SortOrder::resolve(&self.providers, self.sort_override.as_deref())
    }

    /// Concrete target for a detected source
    ///
    /// An explicit target wins. `auto` picks the other preferred language:
    /// source == first preferred → second, anything else → first.
    pub fn resolve_target(&self, source: &Language, requested: &Language) -> Language {
        if !requested.is_auto() {
            return requested.clone();
        }
        let [first, second] = &self.preferred;
        if source.matches(first) {
            second.clone()
        } else {
            first.clone()
        }
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::from_config(&BabelConfig::default())
    }
}
