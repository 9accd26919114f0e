//! babel-query: query orchestration and language-detection consensus
//!
//! Pipeline for a single user query:
//! - **Detection:** `ConsensusEngine` races remote detectors against a local
//!   fallback chain and resolves exactly one source language
//! - **Fan-out:** `QueryOrchestrator` dispatches the query to every enabled
//!   provider concurrently, retries rate-limited providers and drops stale work
//! - **Fan-in:** `ResultAggregator` merges results into a deterministically
//!   ordered section list published on the `EventBus`

pub mod aggregator;
pub mod config;
pub mod detection;
pub mod error;
pub mod orchestration;
pub mod providers;
pub mod sort_order;
pub mod types;

pub use crate::aggregator::ResultAggregator;
pub use crate::config::{DetectionSettings, ProviderSettings, QuerySettings};
pub use crate::detection::{ConsensusEngine, Detector, LocalChain};
pub use crate::error::{DetectorError, ProviderError, QueryError};
pub use crate::orchestration::{Collaborators, QueryOrchestrator};
pub use crate::providers::{AudioPlayer, Provider};
pub use crate::sort_order::SortOrder;
pub use crate::types::{
    DetectionCandidate, DetectionResult, ProviderPayload, ProviderQuery, ProviderResult,
    QueryRequest, Resolution,
};
