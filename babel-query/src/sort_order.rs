//! Fixed display order of providers
//!
//! Default order: dictionary providers first, then translation providers,
//! each group by ascending `priority`, ties kept in configuration order.
//! A manual override string (`"youdao, deepl, google"`) replaces the default
//! completely; providers it does not mention are unranked and filtered out
//! of the visible list.

use crate::config::ProviderSettings;
use babel_common::config::ProviderKind;
use std::collections::HashMap;
use tracing::warn;

/// Ordered provider ranking
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SortOrder {
    ids: Vec<String>,
    ranks: HashMap<String, usize>,
}

impl SortOrder {
    /// Build from an explicit id list (duplicates keep their first rank)
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Self::default();
        for id in ids {
            let id = id.into();
            if order.ranks.contains_key(&id) {
                continue;
            }
            order.ranks.insert(id.clone(), order.ids.len());
            order.ids.push(id);
        }
        order
    }

    /// Dictionary providers first, then translation providers, by priority
    pub fn default_for(providers: &[ProviderSettings]) -> Self {
        let mut sorted: Vec<&ProviderSettings> = providers.iter().collect();
        // sort_by_key is stable: equal priorities keep configuration order
        sorted.sort_by_key(|p| (kind_rank(p.kind), p.priority));
        Self::from_ids(sorted.into_iter().map(|p| p.id.clone()))
    }

    /// Parse a manual override, keeping only known provider ids
    ///
    /// Returns `None` when the override names no known provider.
    pub fn parse_override(order: &str, providers: &[ProviderSettings]) -> Option<Self> {
        let ids: Vec<&str> = order
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter(|id| {
                let known = providers.iter().any(|p| p.id == *id);
                if !known {
                    warn!(provider = %id, "Ignoring unknown provider in sort order override");
                }
                known
            })
            .collect();

        if ids.is_empty() {
            None
        } else {
            Some(Self::from_ids(ids))
        }
    }

    /// Override when usable, default order otherwise
    pub fn resolve(providers: &[ProviderSettings], override_order: Option<&str>) -> Self {
        override_order
            .and_then(|order| Self::parse_override(order, providers))
            .unwrap_or_else(|| Self::default_for(providers))
    }

    pub fn rank(&self, provider_id: &str) -> Option<usize> {
        self.ranks.get(provider_id).copied()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Dense, stable ordering of `items` by rank
    ///
    /// Items whose key has no rank are dropped rather than left as holes.
    /// Deterministic for a given input: calling it again yields the same order.
    pub fn arrange<T, F>(&self, items: impl IntoIterator<Item = T>, key: F) -> Vec<T>
    where
        F: Fn(&T) -> &str,
    {
        let mut ranked: Vec<(usize, T)> = items
            .into_iter()
            .filter_map(|item| self.rank(key(&item)).map(|rank| (rank, item)))
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);
        ranked.into_iter().map(|(_, item)| item).collect()
    }
}

fn kind_rank(kind: ProviderKind) -> u8 {
    match kind {
        ProviderKind::Dictionary => 0,
        ProviderKind::Translation => 1,
    }
}
