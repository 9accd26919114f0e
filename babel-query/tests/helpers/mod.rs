//! Test helper utilities
//!
//! Scripted collaborators with virtual-time delays plus event and log
//! capture for babel-query integration tests.

#![allow(dead_code)]

pub mod events;
pub mod log_capture;
pub mod mocks;

pub use events::{collect_until_settled, settled_update, wait_for};
pub use log_capture::{capture_logs, LogCapture};
pub use mocks::{
    FixedStatistics, RecordingAudio, ScriptedDetector, ScriptedProvider,
};
