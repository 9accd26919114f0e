//! Generic JSON-over-HTTP adapters
//!
//! Provider request: `POST {endpoint}` with `{"text", "from", "to"}`.
//! Provider response:
//! ```json
//! {"translations": ["..."], "is_word": true,
//!  "phonetics": [{"label": "US", "text": "ɡʊd"}],
//!  "explanations": [{"part": "adj.", "meanings": ["..."]}],
//!  "examples": ["..."]}
//! ```
//! Only `translations` is required.
//!
//! Detector request: `POST {endpoint}` with `{"text"}`; response
//! `{"language": "fr", "confirmed": false, "confidences": [["fr", 0.9]]}`.

use crate::detection::Detector;
use crate::error::{DetectorError, ProviderError};
use crate::types::{
    DetectionCandidate, DictionaryEntry, Explanation, Phonetic, ProviderPayload, ProviderQuery,
};
use async_trait::async_trait;
use babel_common::config::{DetectorConfig, ProviderConfig, ProviderKind};
use babel_common::Language;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const USER_AGENT: &str = concat!("babel/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 15;

fn build_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
}

/// Normalized provider response body
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
    #[serde(default)]
    is_word: bool,
    #[serde(default)]
    phonetics: Vec<Phonetic>,
    #[serde(default)]
    explanations: Vec<Explanation>,
    #[serde(default)]
    examples: Vec<String>,
}

/// Generic JSON provider adapter
pub struct HttpProvider {
    id: String,
    kind: ProviderKind,
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        endpoint: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let http_client =
            build_client().map_err(|e| ProviderError::failed("client", e.to_string()))?;

        Ok(Self {
            id: id.into(),
            kind,
            endpoint: endpoint.into(),
            api_key,
            http_client,
        })
    }

    /// Build from a `[[providers]]` entry; `None` when it has no endpoint
    pub fn from_config(config: &ProviderConfig) -> Option<Result<Self, ProviderError>> {
        let endpoint = config.endpoint.as_ref()?;
        Some(Self::new(
            config.id.clone(),
            config.kind,
            endpoint.clone(),
            config.api_key.clone(),
        ))
    }

    async fn send(&self, query: &ProviderQuery) -> Result<ProviderPayload, ProviderError> {
        debug!(provider = %self.id, endpoint = %self.endpoint, "Querying provider");

        let mut request = self.http_client.post(&self.endpoint).json(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::failed("network", e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(format!(
                "{} returned {}",
                self.id, status
            )));
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::failed(status.as_u16().to_string(), error_text));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::failed("parse", e.to_string()))?;

        payload_from_json(self.kind, raw)
    }
}

/// Resolve a response body into the payload variant for `kind`
fn payload_from_json(
    kind: ProviderKind,
    raw: serde_json::Value,
) -> Result<ProviderPayload, ProviderError> {
    let body: TranslateResponse = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::failed("parse", e.to_string()))?;

    Ok(match kind {
        ProviderKind::Translation => ProviderPayload::Translation {
            translations: body.translations,
            raw: Some(raw),
        },
        ProviderKind::Dictionary => ProviderPayload::Dictionary {
            entry: DictionaryEntry {
                translations: body.translations,
                is_word: body.is_word,
                phonetics: body.phonetics,
                explanations: body.explanations,
                examples: body.examples,
            },
            raw: Some(raw),
        },
    })
}

#[async_trait]
impl super::Provider for HttpProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn translate(
        &self,
        query: &ProviderQuery,
        cancel: CancellationToken,
    ) -> Result<ProviderPayload, ProviderError> {
        // Dropping the request future tears down the connection
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ProviderError::Cancelled),
            outcome = self.send(query) => outcome,
        }
    }
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    language: String,
    #[serde(default)]
    confirmed: bool,
    #[serde(default)]
    confidences: Vec<(String, f64)>,
}

/// Generic JSON detector adapter
pub struct HttpDetector {
    id: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpDetector {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, DetectorError> {
        let http_client = build_client().map_err(|e| DetectorError::Network(e.to_string()))?;

        Ok(Self {
            id: id.into(),
            endpoint: endpoint.into(),
            http_client,
        })
    }

    /// Build from a `[[detection.detectors]]` entry; `None` when it has no endpoint
    pub fn from_config(config: &DetectorConfig) -> Option<Result<Self, DetectorError>> {
        let endpoint = config.endpoint.as_ref()?;
        Some(Self::new(config.id.clone(), endpoint.clone()))
    }
}

#[async_trait]
impl Detector for HttpDetector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn detect(&self, text: &str) -> Result<DetectionCandidate, DetectorError> {
        debug!(detector = %self.id, endpoint = %self.endpoint, "Querying detector");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&DetectRequest { text })
            .send()
            .await
            .map_err(|e| DetectorError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DetectorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::Parse(e.to_string()))?;

        candidate_from_response(&self.id, body)
    }
}

fn candidate_from_response(
    detector_id: &str,
    body: DetectResponse,
) -> Result<DetectionCandidate, DetectorError> {
    if body.language.trim().is_empty() {
        return Err(DetectorError::EmptyCode);
    }

    let confidences = body
        .confidences
        .into_iter()
        .map(|(code, score)| (Language::new(code), score))
        .collect();

    Ok(DetectionCandidate::new(detector_id, body.language)
        .confirmed(body.confirmed)
        .with_confidences(confidences))
}
