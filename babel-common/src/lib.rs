//! # Babel Common Library
//!
//! Shared code for the babel query workspace:
//! - Language codes (`Language`, with the `auto` sentinel)
//! - Configuration model and TOML loading
//! - Event types (`QueryEvent`) and the broadcast `EventBus`
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod language;

pub use error::{Error, Result};
pub use language::Language;
