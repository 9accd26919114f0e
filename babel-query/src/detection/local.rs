//! Local fallback chain
//!
//! Computed eagerly and synchronously (no network) at the start of every
//! detection, so some answer always exists instantly:
//! 1. Statistical trigram detection (whatlang) with a confidence score
//! 2. Character-class heuristic among the two preferred languages
//!    (all ASCII letters → English, all CJK ideographs → Chinese)
//! 3. The `auto` sentinel

use crate::types::{DetectionCandidate, DetectionResult, Resolution};
use babel_common::Language;
use std::sync::Arc;
use whatlang::Lang;

/// Source id used for locally produced candidates
pub const LOCAL_SOURCE_ID: &str = "local";

/// Statistical language scorer
pub trait StatisticalDetector: Send + Sync {
    /// (language, score) pairs, any order; scores in 0.0-1.0
    fn scores(&self, text: &str, preferred: &[Language; 2]) -> Vec<(Language, f64)>;
}

/// Whatlang ISO 639-3 → 639-1 mapping for the languages providers commonly use
const LANG_CODES: &[(Lang, &str)] = &[
    (Lang::Eng, "en"),
    (Lang::Cmn, "zh"), // whatlang uses Cmn for Mandarin
    (Lang::Jpn, "ja"),
    (Lang::Kor, "ko"),
    (Lang::Fra, "fr"),
    (Lang::Spa, "es"),
    (Lang::Deu, "de"),
    (Lang::Ita, "it"),
    (Lang::Rus, "ru"),
    (Lang::Por, "pt"),
    (Lang::Ara, "ar"),
    (Lang::Hin, "hi"),
    (Lang::Nld, "nl"),
    (Lang::Tur, "tr"),
    (Lang::Pol, "pl"),
    (Lang::Swe, "sv"),
    (Lang::Vie, "vi"),
    (Lang::Ukr, "uk"),
    (Lang::Tha, "th"),
    (Lang::Ind, "id"),
    (Lang::Heb, "he"),
    (Lang::Ell, "el"),
    (Lang::Ces, "cs"),
    (Lang::Dan, "da"),
    (Lang::Fin, "fi"),
    (Lang::Hun, "hu"),
    (Lang::Ron, "ro"),
];

fn to_language(lang: Lang) -> Language {
    LANG_CODES
        .iter()
        .find(|(l, _)| *l == lang)
        .map(|(_, code)| Language::new(code))
        // Fallback to the 3-letter code if not explicitly mapped
        .unwrap_or_else(|| Language::new(lang.code()))
}

fn to_whatlang(language: &Language) -> Option<Lang> {
    LANG_CODES
        .iter()
        .find(|(_, code)| *code == language.primary())
        .map(|(l, _)| *l)
        .or_else(|| Lang::from_code(language.primary()))
}

/// Whatlang-based statistical detector
///
/// Reports the overall best guess plus the best guess restricted to the
/// preferred languages, so a weak preferred-language signal is not hidden
/// behind a stronger foreign one.
#[derive(Default)]
pub struct WhatlangDetector {
    detector: whatlang::Detector,
}

impl WhatlangDetector {
    pub fn new() -> Self {
        Self {
            detector: whatlang::Detector::new(),
        }
    }
}

impl StatisticalDetector for WhatlangDetector {
    fn scores(&self, text: &str, preferred: &[Language; 2]) -> Vec<(Language, f64)> {
        let mut scores = Vec::with_capacity(2);

        if let Some(info) = self.detector.detect(text) {
            scores.push((to_language(info.lang()), info.confidence()));
        }

        let allowlist: Vec<Lang> = preferred.iter().filter_map(to_whatlang).collect();
        if !allowlist.is_empty() {
            let restricted = whatlang::Detector::with_allowlist(allowlist);
            if let Some(info) = restricted.detect(text) {
                let language = to_language(info.lang());
                if !scores.iter().any(|(l, _)| l.matches(&language)) {
                    scores.push((language, info.confidence()));
                }
            }
        }

        scores
    }
}

/// Outcome of the local chain for one text
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDetection {
    /// Statistical scores, best first
    pub scores: Vec<(Language, f64)>,
    /// Character-class heuristic answer, if any
    pub heuristic: Option<Language>,
    preferred: [Language; 2],
    threshold: f64,
}

impl LocalDetection {
    /// Highest-confidence preferred-language guess above the low threshold
    pub fn preferred_guess(&self) -> Option<(Language, f64)> {
        self.scores
            .iter()
            .find(|(lang, score)| {
                *score > self.threshold && self.preferred.iter().any(|p| p.matches(lang))
            })
            .map(|(lang, score)| (self.canonical(lang), *score))
    }

    /// Highest-confidence guess of any language above the low threshold
    pub fn top_guess(&self) -> Option<(Language, f64)> {
        self.scores
            .first()
            .filter(|(lang, score)| *score > self.threshold && lang.is_concrete())
            .map(|(lang, score)| (self.canonical(lang), *score))
    }

    /// Final-selection fallback: preferred guess or nothing
    pub fn preferred_result(&self) -> Option<DetectionResult> {
        self.preferred_guess().map(|(lang, score)| {
            DetectionResult::new(candidate(&lang, score), false, Resolution::LocalPreferred)
        })
    }

    /// Whole chain: statistical → character class → `auto`
    ///
    /// Never confirmed.
    pub fn chain_result(&self) -> DetectionResult {
        if let Some((lang, score)) = self.preferred_guess().or_else(|| self.top_guess()) {
            return DetectionResult::new(candidate(&lang, score), false, Resolution::LocalFallback);
        }
        if let Some(lang) = &self.heuristic {
            return DetectionResult::new(
                DetectionCandidate::new(LOCAL_SOURCE_ID, lang.code()),
                false,
                Resolution::LocalFallback,
            );
        }
        DetectionResult::sentinel()
    }

    /// Report a preferred language with the user's spelling (`zh-cn`, not `zh`)
    fn canonical(&self, lang: &Language) -> Language {
        self.preferred
            .iter()
            .find(|p| p.matches(lang))
            .cloned()
            .unwrap_or_else(|| lang.clone())
    }
}

fn candidate(lang: &Language, score: f64) -> DetectionCandidate {
    DetectionCandidate::new(LOCAL_SOURCE_ID, lang.code())
        .with_confidences(vec![(lang.clone(), score)])
}

/// Synchronous fallback chain
#[derive(Clone)]
pub struct LocalChain {
    statistical: Arc<dyn StatisticalDetector>,
}

impl LocalChain {
    pub fn new(statistical: Arc<dyn StatisticalDetector>) -> Self {
        Self { statistical }
    }

    /// Chain backed by whatlang
    pub fn whatlang() -> Self {
        Self::new(Arc::new(WhatlangDetector::new()))
    }

    pub fn evaluate(&self, text: &str, preferred: &[Language; 2], threshold: f64) -> LocalDetection {
        let mut scores = self.statistical.scores(text, preferred);
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));

        LocalDetection {
            scores,
            heuristic: character_class(text, preferred),
            preferred: preferred.clone(),
            threshold,
        }
    }
}

impl Default for LocalChain {
    fn default() -> Self {
        Self::whatlang()
    }
}

/// Character-class heuristic among the preferred languages
fn character_class(text: &str, preferred: &[Language; 2]) -> Option<Language> {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return None;
    }

    let family = if letters.iter().all(|c| c.is_ascii_alphabetic()) {
        "en"
    } else if letters.iter().all(|c| is_cjk_ideograph(*c)) {
        "zh"
    } else {
        return None;
    };

    preferred.iter().find(|p| p.primary() == family).cloned()
}

fn is_cjk_ideograph(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{20000}'..='\u{2A6DF}')
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedScores(Vec<(&'static str, f64)>);

    impl StatisticalDetector for FixedScores {
        fn scores(&self, _text: &str, _preferred: &[Language; 2]) -> Vec<(Language, f64)> {
            self.0.iter().map(|(c, s)| (Language::new(c), *s)).collect()
        }
    }

    fn en_zh() -> [Language; 2] {
        [Language::new("en"), Language::new("zh-cn")]
    }

    fn chain(scores: Vec<(&'static str, f64)>) -> LocalChain {
        LocalChain::new(Arc::new(FixedScores(scores)))
    }

    #[test]
    fn test_character_class() {
        let prefs = en_zh();
        assert_eq!(character_class("Hello, world!", &prefs), Some(Language::new("en")));
        assert_eq!(character_class("你好 123", &prefs), Some(Language::new("zh-cn")));
        assert_eq!(character_class("你好 hello", &prefs), None);
        assert_eq!(character_class("¿qué?", &prefs), None);
        assert_eq!(character_class("1234", &prefs), None);

        let fr_de = [Language::new("fr"), Language::new("de")];
        assert_eq!(character_class("hello", &fr_de), None);
    }

    #[test]
    fn test_below_threshold_preferred_is_ignored() {
        let detection = chain(vec![("es", 0.05)]).evaluate("mañana", &en_zh(), 0.15);
        assert_eq!(detection.preferred_guess(), None);
        assert_eq!(detection.chain_result(), DetectionResult::sentinel());
    }

    #[test]
    fn test_preferred_guess_beats_stronger_foreign_guess() {
        let detection =
            chain(vec![("fr", 0.9), ("zh", 0.4)]).evaluate("whatever", &en_zh(), 0.15);
        let (lang, score) = detection.preferred_guess().unwrap();
        assert_eq!(lang.code(), "zh-cn");
        assert_eq!(score, 0.4);

        let result = detection.chain_result();
        assert_eq!(result.language().code(), "zh-cn");
        assert_eq!(result.resolution, Resolution::LocalFallback);
        assert!(!result.confirmed);
    }

    #[test]
    fn test_top_guess_then_heuristic() {
        let detection = chain(vec![("de", 0.7)]).evaluate("Guten Tag", &en_zh(), 0.15);
        assert_eq!(detection.chain_result().language().code(), "de");

        let detection = chain(vec![]).evaluate("Guten Tag", &en_zh(), 0.15);
        assert_eq!(detection.chain_result().language().code(), "en");
    }

    #[test]
    fn test_whatlang_detects_long_english() {
        let detector = WhatlangDetector::new();
        let scores = detector.scores(
            "This is a longer English sentence to ensure correct detection.",
            &en_zh(),
        );
        assert_eq!(scores[0].0.code(), "en");
        assert!(scores[0].1 > 0.0);
    }
}
