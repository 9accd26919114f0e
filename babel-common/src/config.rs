//! Configuration loading and config file resolution
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. `BABEL_CONFIG` environment variable
//! 3. Platform config directory (`<config_dir>/babel/config.toml`)
//! 4. Compiled defaults (no file)
//!
//! A missing file never terminates the program: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Language, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "BABEL_CONFIG";

/// Top-level configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BabelConfig {
    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Query behaviour
    #[serde(default)]
    pub query: QueryConfig,

    /// Language detection consensus settings
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Translation and dictionary providers
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Query behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryConfig {
    /// The user's two preferred languages, first one is the "home" language
    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: [Language; 2],

    /// Default target language (`auto` picks the other preferred language)
    #[serde(default)]
    pub target_language: Language,

    /// Manual sort order override: comma separated provider ids
    #[serde(default)]
    pub sort_order: Option<String>,

    /// Play pronunciation when a dictionary provider recognises a single word
    #[serde(default)]
    pub auto_play_audio: bool,

    /// Keystroke debounce window before a query is issued
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Fixed backoff before re-querying a rate-limited provider
    #[serde(default = "default_rate_limit_retry_ms")]
    pub rate_limit_retry_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            preferred_languages: default_preferred_languages(),
            target_language: Language::auto(),
            sort_order: None,
            auto_play_audio: false,
            debounce_ms: default_debounce_ms(),
            rate_limit_retry_ms: default_rate_limit_retry_ms(),
        }
    }
}

/// Language detection consensus settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Detector whose non-empty answer is accepted immediately
    #[serde(default)]
    pub authoritative: Option<String>,

    /// Detector whose agreement confirms a preferred language after two votes
    #[serde(default)]
    pub reference: Option<String>,

    /// Accept an already-confirmed preferred-language answer from any detector
    #[serde(default)]
    pub speed_first: bool,

    /// Upper bound on remote detection before final selection runs
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Minimum local statistical score for a preferred-language guess
    #[serde(default = "default_low_confidence_threshold")]
    pub low_confidence_threshold: f64,

    /// Remote detectors
    #[serde(default)]
    pub detectors: Vec<DetectorConfig>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            authoritative: None,
            reference: None,
            speed_first: false,
            deadline_ms: default_deadline_ms(),
            low_confidence_threshold: default_low_confidence_threshold(),
            detectors: Vec::new(),
        }
    }
}

/// Remote detector entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectorConfig {
    pub id: String,

    /// HTTP endpoint for the generic JSON adapter
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Provider category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Word lookup with phonetics, explanations and examples
    Dictionary,
    /// Plain text translation
    Translation,
}

/// Provider entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub id: String,

    pub kind: ProviderKind,

    /// Display title (defaults to the id)
    #[serde(default)]
    pub title: Option<String>,

    /// HTTP endpoint for the generic JSON adapter
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lower sorts first within its kind
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Provider whose translation substitutes for a missing headline
    #[serde(default)]
    pub headline_fallback: Option<String>,

    /// May trigger audio auto-play (dictionary providers only)
    #[serde(default = "default_true")]
    pub audio: bool,
}

impl ProviderConfig {
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_preferred_languages() -> [Language; 2] {
    [Language::new("en"), Language::new("zh")]
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_rate_limit_retry_ms() -> u64 {
    1000
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_low_confidence_threshold() -> f64 {
    0.15
}

fn default_priority() -> u32 {
    100
}

fn default_true() -> bool {
    true
}

impl BabelConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: BabelConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations the query engine cannot run with
    ///
    /// Dangling provider references are only warned about.
    pub fn validate(&self) -> Result<()> {
        let [first, second] = &self.query.preferred_languages;
        if !first.is_concrete() || !second.is_concrete() {
            return Err(Error::Config(format!(
                "preferred_languages must be concrete codes, got [{}, {}]",
                first, second
            )));
        }
        if first.matches(second) {
            return Err(Error::Config(format!(
                "preferred_languages must differ, got [{}, {}]",
                first, second
            )));
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.trim().is_empty() {
                return Err(Error::Config("provider id must not be empty".to_string()));
            }
            if !seen.insert(provider.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate provider id '{}'",
                    provider.id
                )));
            }
        }

        let mut detector_ids = HashSet::new();
        for detector in &self.detection.detectors {
            if !detector_ids.insert(detector.id.as_str()) {
                return Err(Error::Config(format!(
                    "duplicate detector id '{}'",
                    detector.id
                )));
            }
        }

        for provider in &self.providers {
            if let Some(fallback) = &provider.headline_fallback {
                if !seen.contains(fallback.as_str()) {
                    warn!(
                        provider = %provider.id,
                        fallback = %fallback,
                        "headline_fallback names an unknown provider, ignoring"
                    );
                }
            }
        }

        if let Some(order) = &self.query.sort_order {
            for id in order.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                if !seen.contains(id) {
                    warn!(provider = %id, "sort_order names an unknown provider, ignoring");
                }
            }
        }

        for role in [&self.detection.authoritative, &self.detection.reference]
            .into_iter()
            .flatten()
        {
            if !detector_ids.contains(role.as_str()) {
                warn!(detector = %role, "detection role names an unknown detector");
            }
        }

        if self.detection.deadline_ms == 0 {
            return Err(Error::Config("detection.deadline_ms must be > 0".to_string()));
        }

        Ok(())
    }
}

/// Resolves which config file (if any) to load
pub struct ConfigResolver {
    cli_arg: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg }
    }

    /// Resolve the config path following the priority order
    ///
    /// Returns `None` when no candidate file exists.
    pub fn resolve(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        dirs::config_dir()
            .map(|d| d.join("babel").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Load the resolved config, falling back to compiled defaults
    ///
    /// An explicitly requested file (CLI or env) that is missing is still only
    /// a warning. A file that exists but fails to parse or validate is an error.
    pub fn load(&self) -> Result<BabelConfig> {
        let Some(path) = self.resolve() else {
            warn!("No config file found, using compiled defaults");
            return Ok(BabelConfig::default());
        };

        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using compiled defaults");
            return Ok(BabelConfig::default());
        }

        info!(path = %path.display(), "Loading configuration");
        BabelConfig::load(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BabelConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.query.debounce_ms, 300);
        assert_eq!(config.query.rate_limit_retry_ms, 1000);
        assert_eq!(config.detection.deadline_ms, 5000);
        assert!(config.query.target_language.is_auto());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_document() {
        let toml = r#"
            [logging]
            level = "debug"

            [query]
            preferred_languages = ["en", "zh-CN"]
            sort_order = "dict, deepl"
            auto_play_audio = true

            [detection]
            authoritative = "google"
            reference = "baidu"
            speed_first = true

            [[detection.detectors]]
            id = "google"
            endpoint = "http://localhost:9000/detect"

            [[detection.detectors]]
            id = "baidu"
            enabled = false

            [[providers]]
            id = "dict"
            kind = "dictionary"
            headline_fallback = "deepl"

            [[providers]]
            id = "deepl"
            kind = "translation"
            priority = 10
            title = "DeepL"
        "#;

        let config = BabelConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.query.preferred_languages[1].code(), "zh-cn");
        assert!(config.query.auto_play_audio);
        assert_eq!(config.detection.authoritative.as_deref(), Some("google"));
        assert!(!config.detection.detectors[1].enabled);
        assert_eq!(config.providers[0].kind, ProviderKind::Dictionary);
        assert_eq!(config.providers[1].display_title(), "DeepL");
        assert_eq!(config.providers[0].display_title(), "dict");
        assert!(config.providers[0].audio);
    }

    #[test]
    fn test_rejects_identical_preferred_languages() {
        let toml = r#"
            [query]
            preferred_languages = ["en", "en-us"]
        "#;
        let err = BabelConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_auto_preferred_language() {
        let toml = r#"
            [query]
            preferred_languages = ["auto", "en"]
        "#;
        assert!(BabelConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_rejects_duplicate_provider() {
        let toml = r#"
            [[providers]]
            id = "a"
            kind = "translation"

            [[providers]]
            id = "a"
            kind = "dictionary"
        "#;
        assert!(BabelConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_malformed_toml_is_toml_error() {
        let err = BabelConfig::from_toml_str("[query\nfoo").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
