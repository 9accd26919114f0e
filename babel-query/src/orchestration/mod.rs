//! Query orchestrator
//!
//! A single event loop owns the current request, its in-flight set and the
//! aggregator. Detection, provider calls and timers run as spawned tasks and
//! report back through an internal channel, so all state changes happen on
//! the loop and every completion is checked against the current request id
//! before it may touch anything.
//!
//! Lifecycle per request:
//! ```text
//! Created → Detecting → Dispatching → PartialResults* → Settled
//!                  (any) → Cancelled
//! ```

pub mod session;

pub use session::{ActiveRequest, InFlightSet, PhaseTransition};

use crate::aggregator::ResultAggregator;
use crate::config::QuerySettings;
use crate::detection::ConsensusEngine;
use crate::error::QueryError;
use crate::providers::{AudioPlayer, Provider};
use crate::types::{DetectionResult, ProviderQuery, ProviderResult, ProviderStatus, QueryRequest};
use babel_common::config::ProviderKind;
use babel_common::events::{EventBus, QueryEvent, RequestId, RequestPhase};
use babel_common::Language;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External adapters the orchestrator drives
pub struct Collaborators {
    pub providers: Vec<Arc<dyn Provider>>,
    pub consensus: ConsensusEngine,
    pub audio: Arc<dyn AudioPlayer>,
}

/// Requests from the handle
#[derive(Debug)]
enum Command {
    /// Keystroke-level input, debounced
    Input(String),
    /// Explicit query, not debounced
    Submit(QueryRequest),
    /// Clear input and cancel the current request
    Cancel,
    /// Issue pending input now; replies with the request still to settle
    Flush(oneshot::Sender<Option<RequestId>>),
}

/// Results of spawned work
#[derive(Debug)]
enum Completion {
    DebounceElapsed {
        generation: u64,
    },
    Detected {
        request_id: RequestId,
        result: DetectionResult,
    },
    Provider(ProviderResult),
    RetryDue {
        request_id: RequestId,
        provider_id: String,
    },
}

fn allocate_id(next_id: &AtomicU64) -> RequestId {
    RequestId(next_id.fetch_add(1, Ordering::SeqCst) + 1)
}

/// Handle to the orchestrator event loop
///
/// Dropping the handle stops the loop and cancels the current request.
pub struct QueryOrchestrator {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    settings: watch::Sender<QuerySettings>,
    events: EventBus,
    task: JoinHandle<()>,
}

impl QueryOrchestrator {
    /// Start the event loop on the current tokio runtime
    pub fn spawn(collaborators: Collaborators, settings: QuerySettings, events: EventBus) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions_tx, completion_rx) = mpsc::unbounded_channel();
        let (settings_tx, settings_rx) = watch::channel(settings);
        let next_id = Arc::new(AtomicU64::new(0));

        let providers = collaborators
            .providers
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();

        let event_loop = EventLoop {
            providers,
            consensus: Arc::new(collaborators.consensus),
            audio: collaborators.audio,
            settings: settings_rx,
            events: events.clone(),
            next_id: Arc::clone(&next_id),
            completions_tx,
            aggregator: ResultAggregator::new(),
            active: None,
            debounce_generation: 0,
            pending_input: None,
        };

        let task = tokio::spawn(event_loop.run(command_rx, completion_rx));

        Self {
            commands,
            next_id,
            settings: settings_tx,
            events,
            task,
        }
    }

    /// Feed raw input text
    ///
    /// Only the last input within the debounce window becomes a request.
    /// Empty or whitespace-only text clears immediately.
    pub fn input(&self, text: impl Into<String>) -> Result<(), QueryError> {
        self.commands
            .send(Command::Input(text.into()))
            .map_err(|_| QueryError::Closed)
    }

    /// Issue a query immediately, superseding the current one
    ///
    /// `auto` source runs detection; `auto` target picks the other preferred
    /// language. A configuration without enabled providers is reported as a
    /// `ConfigurationError` event for the returned id.
    pub fn submit(
        &self,
        text: impl Into<String>,
        source: Language,
        target: Language,
    ) -> Result<RequestId, QueryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QueryError::EmptyQuery);
        }

        let id = allocate_id(&self.next_id);
        self.commands
            .send(Command::Submit(QueryRequest::new(id, text, source, target)))
            .map_err(|_| QueryError::Closed)?;
        Ok(id)
    }

    /// Issue debounced input immediately instead of waiting out the window
    ///
    /// Returns the request that has yet to settle: the one just created from
    /// pending input, otherwise the current unsettled request. `None` when
    /// nothing is pending or in progress.
    pub async fn flush_input(&self) -> Result<Option<RequestId>, QueryError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| QueryError::Closed)?;
        response.await.map_err(|_| QueryError::Closed)
    }

    /// Cancel the current request and clear the visible list
    pub fn cancel(&self) -> Result<(), QueryError> {
        self.commands
            .send(Command::Cancel)
            .map_err(|_| QueryError::Closed)
    }

    /// Publish new settings; requests already created keep their snapshot
    pub fn update_settings(&self, settings: QuerySettings) {
        self.settings.send_replace(settings);
    }

    pub fn settings(&self) -> QuerySettings {
        self.settings.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.events.subscribe()
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "Orchestrator task ended abnormally");
        }
    }
}

struct EventLoop {
    providers: HashMap<String, Arc<dyn Provider>>,
    consensus: Arc<ConsensusEngine>,
    audio: Arc<dyn AudioPlayer>,
    settings: watch::Receiver<QuerySettings>,
    events: EventBus,
    next_id: Arc<AtomicU64>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    aggregator: ResultAggregator,
    active: Option<ActiveRequest>,
    /// Bumped on every input; only the latest debounce timer may fire
    debounce_generation: u64,
    pending_input: Option<String>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!(providers = self.providers.len(), "Query orchestrator started");

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                Some(completion) = completions.recv() => self.handle_completion(completion),
            }
        }

        if let Some(active) = self.active.as_mut() {
            active.cancel();
        }
        info!("Query orchestrator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Input(text) => {
                self.debounce_generation += 1;
                if text.trim().is_empty() {
                    self.pending_input = None;
                    self.clear();
                    return;
                }

                self.pending_input = Some(text);
                let generation = self.debounce_generation;
                let delay = self.settings.borrow().debounce;
                let tx = self.completions_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Completion::DebounceElapsed { generation });
                });
            }
            Command::Submit(request) => {
                self.debounce_generation += 1;
                self.pending_input = None;
                self.start(request);
            }
            Command::Cancel => {
                self.debounce_generation += 1;
                self.pending_input = None;
                self.clear();
            }
            Command::Flush(reply) => {
                if let Some(text) = self.pending_input.take() {
                    self.debounce_generation += 1;
                    self.start_debounced(text);
                }
                let unsettled = self
                    .active
                    .as_ref()
                    .filter(|a| !a.phase.is_terminal())
                    .map(ActiveRequest::id);
                let _ = reply.send(unsettled);
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::DebounceElapsed { generation } => {
                if generation != self.debounce_generation {
                    return;
                }
                if let Some(text) = self.pending_input.take() {
                    self.start_debounced(text);
                }
            }
            Completion::Detected { request_id, result } => self.on_detected(request_id, result),
            Completion::Provider(result) => self.on_provider_result(result),
            Completion::RetryDue {
                request_id,
                provider_id,
            } => self.on_retry_due(request_id, &provider_id),
        }
    }

    fn start_debounced(&mut self, text: String) {
        let id = allocate_id(&self.next_id);
        let target = self.settings.borrow().target_language.clone();
        self.start(QueryRequest::new(id, text, Language::auto(), target));
    }

    /// Invalidate everything and show an empty list
    fn clear(&mut self) {
        if let Some(mut active) = self.active.take() {
            let transition = active.cancel();
            debug!(
                request_id = %transition.request_id,
                old_phase = %transition.old_phase,
                "Request cancelled by clear"
            );
        }

        let id = allocate_id(&self.next_id);
        self.aggregator.clear(id);
        self.events.emit_lossy(QueryEvent::Cleared {
            request_id: id,
            timestamp: Utc::now(),
        });
    }

    fn start(&mut self, request: QueryRequest) {
        if let Some(mut previous) = self.active.take() {
            let transition = previous.cancel();
            debug!(
                request_id = %transition.request_id,
                superseded_by = %request.id,
                old_phase = %transition.old_phase,
                "Request superseded"
            );
        }

        // Snapshot once: later settings changes never affect this request
        let settings = self.settings.borrow().clone();
        self.aggregator.reset(request.id, &settings);

        let enabled: Vec<String> = settings
            .enabled_providers()
            .filter(|p| {
                let registered = self.providers.contains_key(&p.id);
                if !registered {
                    warn!(provider = %p.id, "Enabled provider has no registered adapter");
                }
                registered
            })
            .map(|p| p.id.clone())
            .collect();

        info!(
            request_id = %request.id,
            chars = request.text.chars().count(),
            source = %request.source,
            target = %request.target,
            providers = enabled.len(),
            "Query request created"
        );

        let mut active = ActiveRequest::new(request, settings, InFlightSet::new(enabled));
        let request_id = active.id();

        if active.in_flight.is_empty() {
            warn!(request_id = %request_id, "No providers enabled");
            active.transition_to(RequestPhase::Settled);
            self.active = Some(active);
            self.events.emit_lossy(QueryEvent::ConfigurationError {
                request_id,
                message: QueryError::NoProvidersEnabled.to_string(),
                timestamp: Utc::now(),
            });
            self.emit_update(RequestPhase::Settled, false);
            return;
        }

        active.transition_to(RequestPhase::Detecting);

        if !active.request.source.is_auto() {
            let result = DetectionResult::user_specified(&active.request.source);
            self.active = Some(active);
            self.emit_update(RequestPhase::Detecting, true);
            self.on_detected(request_id, result);
            return;
        }

        let consensus = Arc::clone(&self.consensus);
        let tx = self.completions_tx.clone();
        let text = active.request.text.clone();
        let detection = active.settings.detection.clone();
        let cancel = active.cancel_token.clone();
        tokio::spawn(async move {
            let result = consensus.detect(&text, &detection, &cancel).await;
            let _ = tx.send(Completion::Detected { request_id, result });
        });

        self.active = Some(active);
        self.emit_update(RequestPhase::Detecting, true);
    }

    fn on_detected(&mut self, request_id: RequestId, result: DetectionResult) {
        let Some(active) = self.active.as_mut().filter(|a| a.is_current(request_id)) else {
            debug!(request_id = %request_id, "Dropping stale detection result");
            return;
        };

        let target = active
            .settings
            .resolve_target(result.language(), &active.request.target);

        info!(
            request_id = %request_id,
            source = %result.language(),
            target = %target,
            confirmed = result.confirmed,
            resolution = ?result.resolution,
            "Source language resolved"
        );

        let source = result.language().clone();
        let confirmed = result.confirmed;
        active.detection = Some(result);
        active.target = target.clone();
        active.transition_to(RequestPhase::Dispatching);

        let query = active.provider_query();
        let cancel = active.cancel_token.clone();
        let provider_ids: Vec<String> = active.in_flight.ids().map(String::from).collect();

        self.aggregator.set_target(target.clone());
        self.events.emit_lossy(QueryEvent::DetectionResolved {
            request_id,
            source,
            target,
            confirmed,
            timestamp: Utc::now(),
        });

        // Fully parallel: no provider waits on another
        for provider_id in &provider_ids {
            self.dispatch(provider_id, request_id, query.clone(), cancel.clone());
        }

        self.emit_update(RequestPhase::Dispatching, true);
    }

    fn dispatch(
        &self,
        provider_id: &str,
        request_id: RequestId,
        query: ProviderQuery,
        cancel: CancellationToken,
    ) {
        let tx = self.completions_tx.clone();
        let provider_id = provider_id.to_string();

        // In-flight ids are filtered to registered adapters in `start`
        let Some(provider) = self.providers.get(&provider_id).cloned() else {
            debug!(request_id = %request_id, provider = %provider_id, "No adapter to dispatch");
            return;
        };

        debug!(request_id = %request_id, provider = %provider_id, "Dispatching provider");

        tokio::spawn(async move {
            let outcome = provider.translate(&query, cancel).await;
            let _ = tx.send(Completion::Provider(ProviderResult::from_outcome(
                provider_id,
                request_id,
                outcome,
            )));
        });
    }

    fn on_provider_result(&mut self, result: ProviderResult) {
        let request_id = result.request_id;

        let Some(active) = self.active.as_mut().filter(|a| a.is_current(request_id)) else {
            debug!(
                request_id = %request_id,
                provider = %result.provider_id,
                "Dropping stale provider result"
            );
            return;
        };

        if !active.in_flight.contains(&result.provider_id) {
            debug!(
                request_id = %request_id,
                provider = %result.provider_id,
                "Ignoring result from provider not in flight"
            );
            return;
        }

        match result.status {
            ProviderStatus::RateLimited => {
                // Stays in flight until the retry settles; never shown to the user
                let attempt = active.in_flight.record_retry(&result.provider_id);
                let delay = active.settings.rate_limit_retry;
                warn!(
                    request_id = %request_id,
                    provider = %result.provider_id,
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    "Provider rate limited, scheduling retry"
                );

                let tx = self.completions_tx.clone();
                let provider_id = result.provider_id;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Completion::RetryDue {
                        request_id,
                        provider_id,
                    });
                });
                return;
            }
            ProviderStatus::Failure => {
                active.in_flight.complete(&result.provider_id);
                let (code, message) = result
                    .error
                    .as_ref()
                    .map(|e| (e.code().to_string(), e.to_string()))
                    .unwrap_or_else(|| ("unknown".to_string(), "Provider failed".to_string()));

                warn!(
                    request_id = %request_id,
                    provider = %result.provider_id,
                    code = %code,
                    "Provider failed"
                );

                self.events.emit_lossy(QueryEvent::ProviderFailed {
                    request_id,
                    provider_id: result.provider_id.clone(),
                    code,
                    message,
                    timestamp: Utc::now(),
                });
            }
            ProviderStatus::Success => {
                active.in_flight.complete(&result.provider_id);
                debug!(
                    request_id = %request_id,
                    provider = %result.provider_id,
                    lines = result.translations.len(),
                    "Provider succeeded"
                );

                if !active.audio_played && active.settings.auto_play_audio {
                    let audio_capable = active
                        .settings
                        .provider(&result.provider_id)
                        .map(|p| p.kind == ProviderKind::Dictionary && p.audio)
                        .unwrap_or(false);
                    let is_word = result.payload.as_ref().map(|p| p.is_word()).unwrap_or(false);

                    if audio_capable && is_word {
                        active.audio_played = true;
                        let language = active
                            .detection
                            .as_ref()
                            .map(|d| d.language().clone())
                            .unwrap_or_else(Language::auto);
                        let word = active.request.text.trim();
                        info!(
                            request_id = %request_id,
                            provider = %result.provider_id,
                            "Auto-playing pronunciation"
                        );
                        self.audio.download_and_play(word, &language);
                    }
                }
            }
        }

        let phase = active.progress_phase();
        let loading = active.loading();
        active.transition_to(phase);

        if phase == RequestPhase::Settled {
            info!(
                request_id = %request_id,
                elapsed_ms = (Utc::now() - active.started_at).num_milliseconds(),
                "Request settled"
            );
        }

        self.aggregator.on_provider_result(result);
        self.emit_update(phase, loading);
    }

    fn on_retry_due(&mut self, request_id: RequestId, provider_id: &str) {
        let Some(active) = self.active.as_ref().filter(|a| a.is_current(request_id)) else {
            debug!(
                request_id = %request_id,
                provider = %provider_id,
                "Dropping stale retry"
            );
            return;
        };

        if !active.in_flight.contains(provider_id) {
            return;
        }

        let query = active.provider_query();
        let cancel = active.cancel_token.clone();
        self.dispatch(provider_id, request_id, query, cancel);
    }

    fn emit_update(&self, phase: RequestPhase, loading: bool) {
        self.events
            .emit_lossy(QueryEvent::Updated(self.aggregator.snapshot(phase, loading)));
    }
}
