//! Per-request scratch state
//!
//! Everything here is created fresh for each [`QueryRequest`] and thrown
//! away when the request is superseded, so no vote, retry counter or
//! "already played" flag ever leaks into the next query.

use crate::config::QuerySettings;
use crate::types::{DetectionResult, ProviderQuery, QueryRequest};
use babel_common::events::{RequestId, RequestPhase};
use babel_common::Language;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;

/// Providers whose outcome for the current request is still outstanding
///
/// A rate-limited provider stays in the set until its retry settles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InFlightSet {
    pending: BTreeSet<String>,
    retries: HashMap<String, u32>,
}

impl InFlightSet {
    pub fn new<I, S>(provider_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pending: provider_ids.into_iter().map(Into::into).collect(),
            retries: HashMap::new(),
        }
    }

    pub fn contains(&self, provider_id: &str) -> bool {
        self.pending.contains(provider_id)
    }

    /// Terminal outcome; returns `false` if the provider was not in flight
    pub fn complete(&mut self, provider_id: &str) -> bool {
        self.pending.remove(provider_id)
    }

    /// Count one more rate-limit retry, returning the attempt number
    pub fn record_retry(&mut self, provider_id: &str) -> u32 {
        let attempts = self.retries.entry(provider_id.to_string()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Record of one lifecycle step
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub request_id: RequestId,
    pub old_phase: RequestPhase,
    pub new_phase: RequestPhase,
    pub transitioned_at: DateTime<Utc>,
}

/// The one live request
#[derive(Debug)]
pub struct ActiveRequest {
    pub request: QueryRequest,
    /// Configuration snapshot taken at creation, never refreshed
    pub settings: QuerySettings,
    /// Fired when this request is superseded or cleared
    pub cancel_token: CancellationToken,
    pub phase: RequestPhase,
    pub in_flight: InFlightSet,
    pub detection: Option<DetectionResult>,
    /// Resolved target, `auto` until detection completes
    pub target: Language,
    pub audio_played: bool,
    pub started_at: DateTime<Utc>,
}

impl ActiveRequest {
    pub fn new(request: QueryRequest, settings: QuerySettings, in_flight: InFlightSet) -> Self {
        Self {
            request,
            settings,
            cancel_token: CancellationToken::new(),
            phase: RequestPhase::Created,
            in_flight,
            detection: None,
            target: Language::auto(),
            audio_played: false,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.request.id
    }

    pub fn is_current(&self, request_id: RequestId) -> bool {
        self.request.id == request_id && self.phase != RequestPhase::Cancelled
    }

    pub fn transition_to(&mut self, new_phase: RequestPhase) -> PhaseTransition {
        let transition = PhaseTransition {
            request_id: self.request.id,
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;
        transition
    }

    /// Abort outstanding work and mark the request cancelled
    pub fn cancel(&mut self) -> PhaseTransition {
        self.cancel_token.cancel();
        self.transition_to(RequestPhase::Cancelled)
    }

    /// Phase after a provider outcome: settled once nothing is in flight
    pub fn progress_phase(&self) -> RequestPhase {
        if self.in_flight.is_empty() {
            RequestPhase::Settled
        } else {
            RequestPhase::PartialResults
        }
    }

    pub fn loading(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Query handed to providers once source and target are known
    pub fn provider_query(&self) -> ProviderQuery {
        let from = self
            .detection
            .as_ref()
            .map(|d| d.language().clone())
            .unwrap_or_else(Language::auto);
        ProviderQuery {
            text: self.request.text.clone(),
            from,
            to: self.target.clone(),
        }
    }
}
