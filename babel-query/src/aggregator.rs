//! Result aggregator / display builder
//!
//! Holds at most one live [`ProviderResult`] per provider for the current
//! request and rebuilds the complete, ordered section list on every update.
//! Visible order comes only from [`SortOrder`], never from arrival order.

use crate::config::{ProviderSettings, QuerySettings};
use crate::sort_order::SortOrder;
use crate::types::{DictionaryEntry, ProviderPayload, ProviderResult, ProviderStatus};
use babel_common::config::ProviderKind;
use babel_common::events::{
    DisplayItem, DisplaySection, DisplayUpdate, ItemKind, RequestId, RequestPhase,
};
use babel_common::Language;
use std::collections::HashMap;
use tracing::debug;

/// Label attached to the first detail item of a section
pub const DETAILS_LABEL: &str = "Details";

/// Translation line length (chars) that asks for detail mode, CJK targets
const CJK_DETAIL_THRESHOLD: usize = 20;
/// Translation line length (chars) that asks for detail mode, other targets
const DETAIL_THRESHOLD: usize = 40;

/// Fan-in side of a request
#[derive(Debug, Default)]
pub struct ResultAggregator {
    request_id: RequestId,
    target: Language,
    sort_order: SortOrder,
    providers: HashMap<String, ProviderSettings>,
    results: HashMap<String, ProviderResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting for a new request, dropping everything visible
    pub fn reset(&mut self, request_id: RequestId, settings: &QuerySettings) {
        self.request_id = request_id;
        self.target = Language::auto();
        self.sort_order = settings.sort_order();
        self.providers = settings
            .providers
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        self.results.clear();
    }

    /// Resolved target language (drives the detail-mode threshold)
    pub fn set_target(&mut self, target: Language) {
        self.target = target;
    }

    /// Invalidate everything: nothing is visible and older results are stale
    pub fn clear(&mut self, request_id: RequestId) {
        self.request_id = request_id;
        self.results.clear();
    }

    /// Accept one provider outcome
    ///
    /// Returns `true` when the visible state changed. Stale and rate-limited
    /// results are ignored.
    pub fn on_provider_result(&mut self, result: ProviderResult) -> bool {
        if result.request_id != self.request_id {
            debug!(
                provider = %result.provider_id,
                result_request = %result.request_id,
                current_request = %self.request_id,
                "Dropping stale provider result"
            );
            return false;
        }

        if result.status == ProviderStatus::RateLimited {
            return false;
        }

        self.results.insert(result.provider_id.clone(), result);
        true
    }

    /// Live results in display order (unranked providers filtered out)
    pub fn ordered_results(&self) -> Vec<&ProviderResult> {
        self.sort_order
            .arrange(self.results.values(), |r| r.provider_id.as_str())
    }

    /// Complete ordered section list
    pub fn sections(&self) -> Vec<DisplaySection> {
        self.ordered_results()
            .into_iter()
            .filter_map(|result| self.section_for(result))
            .collect()
    }

    /// Expanded view wanted: a dictionary result without real entries while
    /// some translation line is too long for the compact view
    ///
    /// Recomputed on every call.
    pub fn detail_mode(&self) -> bool {
        let threshold = if self.target.is_cjk() {
            CJK_DETAIL_THRESHOLD
        } else {
            DETAIL_THRESHOLD
        };

        let sparse_dictionary = self.results.values().any(|r| {
            matches!(
                &r.payload,
                Some(ProviderPayload::Dictionary { entry, .. }) if !entry.has_entries()
            )
        });

        let long_translation = self.results.values().any(|r| {
            matches!(r.payload, Some(ProviderPayload::Translation { .. }))
                && r.translations.iter().any(|t| t.chars().count() > threshold)
        });

        sparse_dictionary && long_translation
    }

    pub fn snapshot(&self, phase: RequestPhase, loading: bool) -> DisplayUpdate {
        DisplayUpdate {
            request_id: self.request_id,
            phase,
            sections: self.sections(),
            loading,
            detail_mode: self.detail_mode(),
        }
    }

    fn title(&self, provider_id: &str) -> String {
        self.providers
            .get(provider_id)
            .map(|p| p.title.clone())
            .unwrap_or_else(|| provider_id.to_string())
    }

    fn section_for(&self, result: &ProviderResult) -> Option<DisplaySection> {
        let mut items = match (&result.status, &result.payload) {
            (ProviderStatus::Success, Some(ProviderPayload::Translation { translations, .. })) => {
                headline(translations).into_iter().collect()
            }
            (ProviderStatus::Success, Some(ProviderPayload::Dictionary { entry, .. })) => {
                self.dictionary_items(&result.provider_id, entry)
            }
            _ => {
                let message = result
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "No result".to_string());
                vec![DisplayItem::new(ItemKind::Error, vec![message])]
            }
        };

        if items.is_empty() {
            return None;
        }

        if let Some(first_detail) = items
            .iter_mut()
            .find(|item| matches!(item.kind, ItemKind::Explanation | ItemKind::Example))
        {
            first_detail.label = Some(DETAILS_LABEL.to_string());
        }

        Some(DisplaySection {
            provider_id: result.provider_id.clone(),
            title: self.title(&result.provider_id),
            items,
        })
    }

    fn dictionary_items(&self, provider_id: &str, entry: &DictionaryEntry) -> Vec<DisplayItem> {
        let mut items = Vec::new();

        let own = headline(&entry.translations);
        if let Some(item) = own.or_else(|| self.borrowed_headline(provider_id)) {
            items.push(item);
        }

        let phonetics: Vec<String> = entry
            .phonetics
            .iter()
            .map(|p| match &p.label {
                Some(label) => format!("{} [{}]", label, p.text),
                None => format!("[{}]", p.text),
            })
            .collect();
        if !phonetics.is_empty() {
            items.push(DisplayItem::new(ItemKind::Phonetic, phonetics));
        }

        for explanation in entry.explanations.iter().filter(|e| !e.meanings.is_empty()) {
            let meanings = explanation.meanings.join("; ");
            let line = match &explanation.part {
                Some(part) => format!("{} {}", part, meanings),
                None => meanings,
            };
            items.push(DisplayItem::new(ItemKind::Explanation, vec![line]));
        }

        if !entry.examples.is_empty() {
            items.push(DisplayItem::new(ItemKind::Example, entry.examples.clone()));
        }

        items
    }

    /// Headline taken from the configured substitute provider's translation
    fn borrowed_headline(&self, provider_id: &str) -> Option<DisplayItem> {
        let settings = self.providers.get(provider_id)?;
        if settings.kind != ProviderKind::Dictionary {
            return None;
        }
        let fallback = self.results.get(settings.headline_fallback.as_deref()?)?;
        if !fallback.is_success() {
            return None;
        }
        headline(&fallback.translations)
    }
}

fn headline(translations: &[String]) -> Option<DisplayItem> {
    let lines: Vec<String> = translations
        .iter()
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(DisplayItem::new(ItemKind::Headline, lines))
    }
}
