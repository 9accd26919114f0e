//! Core types shared by detection, orchestration and aggregation
//!
//! Provider output is a tagged [`ProviderPayload`] resolved once at the
//! adapter boundary. Downstream code matches on the variant, it never
//! re-interprets a loosely typed value.

use crate::error::ProviderError;
use babel_common::events::RequestId;
use babel_common::Language;
use serde::{Deserialize, Serialize};

// ============================================================================
// Requests
// ============================================================================

/// One user query
///
/// Immutable once issued. A newer `id` invalidates all prior in-flight work.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub id: RequestId,
    pub text: String,
    /// `auto` means "run detection"
    pub source: Language,
    /// `auto` means "the other preferred language"
    pub target: Language,
}

impl QueryRequest {
    pub fn new(id: RequestId, text: impl Into<String>, source: Language, target: Language) -> Self {
        Self {
            id,
            text: text.into(),
            source,
            target,
        }
    }
}

/// Normalized query handed to a provider adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderQuery {
    pub text: String,
    pub from: Language,
    pub to: Language,
}

// ============================================================================
// Detection
// ============================================================================

/// Output of one detector invocation, never mutated after creation
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCandidate {
    /// Which detector produced this
    pub source_id: String,
    pub language: Language,
    /// Label exactly as the detector reported it
    pub raw_label: String,
    /// The detector itself vouches for this answer
    pub confirmed: bool,
    /// Ordered (language, score) samples, best first
    pub confidences: Vec<(Language, f64)>,
}

impl DetectionCandidate {
    pub fn new(source_id: impl Into<String>, raw_label: impl Into<String>) -> Self {
        let raw_label = raw_label.into();
        Self {
            source_id: source_id.into(),
            language: Language::new(&raw_label),
            raw_label,
            confirmed: false,
            confidences: Vec::new(),
        }
    }

    pub fn confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    pub fn with_confidences(mut self, confidences: Vec<(Language, f64)>) -> Self {
        self.confidences = confidences;
        self
    }

    /// Non-empty, concrete code: anything else counts as a non-match
    pub fn is_usable(&self) -> bool {
        !self.raw_label.trim().is_empty() && self.language.is_concrete()
    }
}

/// Which rule produced a [`DetectionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// Request carried an explicit source language
    UserSpecified,
    /// The authoritative detector answered
    Authoritative,
    /// Speed-first mode: a confirmed preferred-language answer
    SpeedFirst,
    /// Two votes including the reference detector, preferred language
    ReferenceAgreement,
    /// Three distinct detectors agree
    ThreeVotes,
    /// All detectors done (or deadline hit) without consensus
    FinalSelection,
    /// Local statistical preferred-language guess above threshold
    LocalPreferred,
    /// Local fallback chain (every remote detector failed)
    LocalFallback,
    /// Nothing usable: `auto`
    Sentinel,
}

/// The single chosen source language for a request
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub candidate: DetectionCandidate,
    /// Trusted (`true`) versus best effort (`false`)
    pub confirmed: bool,
    pub resolution: Resolution,
}

impl DetectionResult {
    pub fn new(candidate: DetectionCandidate, confirmed: bool, resolution: Resolution) -> Self {
        Self {
            candidate,
            confirmed,
            resolution,
        }
    }

    /// Unconfirmed `auto`
    pub fn sentinel() -> Self {
        Self::new(
            DetectionCandidate::new("sentinel", babel_common::language::AUTO),
            false,
            Resolution::Sentinel,
        )
    }

    pub fn user_specified(language: &Language) -> Self {
        Self::new(
            DetectionCandidate::new("user", language.code()).confirmed(true),
            true,
            Resolution::UserSpecified,
        )
    }

    pub fn language(&self) -> &Language {
        &self.candidate.language
    }
}

// ============================================================================
// Provider output
// ============================================================================

/// Pronunciation entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phonetic {
    /// e.g. "US", "UK"
    #[serde(default)]
    pub label: Option<String>,
    pub text: String,
}

/// Meanings for one part of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// e.g. "n.", "adj."
    #[serde(default)]
    pub part: Option<String>,
    pub meanings: Vec<String>,
}

/// Dictionary lookup result
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Plain translation headline (may be empty, see `headline_fallback`)
    pub translations: Vec<String>,
    /// Query is a single dictionary word rather than a sentence
    pub is_word: bool,
    pub phonetics: Vec<Phonetic>,
    pub explanations: Vec<Explanation>,
    pub examples: Vec<String>,
}

impl DictionaryEntry {
    /// Has content beyond a plain headline
    pub fn has_entries(&self) -> bool {
        self.explanations.iter().any(|e| !e.meanings.is_empty()) || !self.examples.is_empty()
    }
}

/// Provider output, resolved once at the adapter boundary
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderPayload {
    Translation {
        translations: Vec<String>,
        raw: Option<serde_json::Value>,
    },
    Dictionary {
        entry: DictionaryEntry,
        raw: Option<serde_json::Value>,
    },
}

impl ProviderPayload {
    pub fn translation(translations: Vec<String>) -> Self {
        ProviderPayload::Translation {
            translations,
            raw: None,
        }
    }

    pub fn dictionary(entry: DictionaryEntry) -> Self {
        ProviderPayload::Dictionary { entry, raw: None }
    }

    pub fn translations(&self) -> &[String] {
        match self {
            ProviderPayload::Translation { translations, .. } => translations,
            ProviderPayload::Dictionary { entry, .. } => &entry.translations,
        }
    }

    /// Single dictionary word (drives audio auto-play)
    pub fn is_word(&self) -> bool {
        matches!(self, ProviderPayload::Dictionary { entry, .. } if entry.is_word)
    }

    pub fn dictionary_entry(&self) -> Option<&DictionaryEntry> {
        match self {
            ProviderPayload::Dictionary { entry, .. } => Some(entry),
            ProviderPayload::Translation { .. } => None,
        }
    }
}

/// Terminal status of a provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    Success,
    Failure,
    RateLimited,
}

/// One provider's outcome for one request
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider_id: String,
    pub request_id: RequestId,
    pub status: ProviderStatus,
    pub payload: Option<ProviderPayload>,
    /// Copied from the payload for ordering/display convenience
    pub translations: Vec<String>,
    pub error: Option<ProviderError>,
}

impl ProviderResult {
    pub fn from_outcome(
        provider_id: impl Into<String>,
        request_id: RequestId,
        outcome: Result<ProviderPayload, ProviderError>,
    ) -> Self {
        let provider_id = provider_id.into();
        match outcome {
            Ok(payload) => Self {
                provider_id,
                request_id,
                status: ProviderStatus::Success,
                translations: payload.translations().to_vec(),
                payload: Some(payload),
                error: None,
            },
            Err(error) => Self {
                provider_id,
                request_id,
                status: match error {
                    ProviderError::RateLimited(_) => ProviderStatus::RateLimited,
                    _ => ProviderStatus::Failure,
                },
                payload: None,
                translations: Vec::new(),
                error: Some(error),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ProviderStatus::Success
    }
}
