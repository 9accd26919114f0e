//! Language codes
//!
//! Codes are stored normalized: trimmed, lowercase, `_` replaced by `-`.
//! The empty code and `auto` both mean "not determined".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel code for "detect automatically" / "unknown"
pub const AUTO: &str = "auto";

/// Normalized language code (e.g. `en`, `zh-cn`, `auto`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Language(String);

impl Language {
    /// Create a language from any code spelling
    pub fn new(code: impl AsRef<str>) -> Self {
        let normalized = code.as_ref().trim().to_lowercase().replace('_', "-");
        if normalized.is_empty() {
            return Self::auto();
        }
        Self(normalized)
    }

    /// The `auto` sentinel
    pub fn auto() -> Self {
        Self(AUTO.to_string())
    }

    pub fn is_auto(&self) -> bool {
        self.0 == AUTO
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Primary subtag (`zh` for `zh-cn`)
    pub fn primary(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    /// Chinese, Japanese or Korean
    pub fn is_cjk(&self) -> bool {
        matches!(self.primary(), "zh" | "ja" | "ko")
    }

    /// A usable, concrete code: not `auto`, ASCII letters and `-` only,
    /// primary subtag of 2-3 letters.
    ///
    /// Detectors returning anything else are treated as a non-match.
    pub fn is_concrete(&self) -> bool {
        if self.is_auto() {
            return false;
        }
        let primary_len = self.primary().len();
        (2..=3).contains(&primary_len)
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_lowercase() || c == '-')
    }

    /// Same language ignoring region (`zh-cn` matches `zh`)
    pub fn matches(&self, other: &Language) -> bool {
        self.primary() == other.primary()
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::auto()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Language {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Language {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Language> for String {
    fn from(value: Language) -> Self {
        value.0
    }
}

impl FromStr for Language {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
