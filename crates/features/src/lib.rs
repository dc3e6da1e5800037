//! Pure helpers for category reconciliation.
//!
//! Provides the functions the store and the table are built from:
//! - Confidence banding of suggestion scores
//! - Lookups of the mapping / suggestion for a raw category
//! - Threshold filtering for auto-mapping
//! - Raw-category derivation from menu items
//! - A keyed colour allocator for chart series

use menuscope_model::{CategoryMapping, CategorySuggestion, MenuItem, Threshold};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lower bound of the high confidence band.
pub const HIGH_CONFIDENCE: f64 = 0.8;

/// Lower bound of the medium confidence band.
pub const MEDIUM_CONFIDENCE: f64 = 0.6;

/// Colour-coded confidence band of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    /// Band for a score: `>= 0.8` high, `>= 0.6` medium, else low.
    pub fn of(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Badge colour for the band.
    pub fn color(&self) -> &'static str {
        match self {
            Self::High => "green",
            Self::Medium => "yellow",
            Self::Low => "red",
        }
    }

    /// Legend text, e.g. "High (>= 80%)".
    pub fn legend(&self) -> String {
        match self {
            Self::High => format!("High (>= {:.0}%)", HIGH_CONFIDENCE * 100.0),
            Self::Medium => format!(
                "Medium ({:.0}-{:.0}%)",
                MEDIUM_CONFIDENCE * 100.0,
                HIGH_CONFIDENCE * 100.0
            ),
            Self::Low => format!("Low (< {:.0}%)", MEDIUM_CONFIDENCE * 100.0),
        }
    }

    /// All bands, highest first.
    pub fn all() -> [Self; 3] {
        [Self::High, Self::Medium, Self::Low]
    }
}

/// Find the mapping for a raw category.
pub fn mapping_for<'a>(mappings: &'a [CategoryMapping], raw: &str) -> Option<&'a CategoryMapping> {
    mappings.iter().find(|m| m.raw_category == raw)
}

/// Find the suggestion for a raw category.
pub fn suggestion_for<'a>(
    suggestions: &'a [CategorySuggestion],
    raw: &str,
) -> Option<&'a CategorySuggestion> {
    suggestions.iter().find(|s| s.raw_category == raw)
}

/// Suggestions whose confidence clears the threshold (inclusive).
pub fn auto_map_candidates(
    suggestions: &[CategorySuggestion],
    threshold: Threshold,
) -> Vec<&CategorySuggestion> {
    suggestions
        .iter()
        .filter(|s| threshold.admits(s.confidence_score))
        .collect()
}

/// Mapped vs unmapped raw categories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingCounts {
    pub mapped: usize,
    pub unmapped: usize,
}

/// Count how many raw categories already have a mapping.
pub fn mapping_counts(raw_categories: &[String], mappings: &[CategoryMapping]) -> MappingCounts {
    let mapped = raw_categories
        .iter()
        .filter(|raw| mapping_for(mappings, raw).is_some())
        .count();

    MappingCounts {
        mapped,
        unmapped: raw_categories.len() - mapped,
    }
}

/// Drop blank labels and de-duplicate raw categories, keeping first-seen order.
///
/// Labels are mapping keys on the backend, so surviving labels are kept
/// byte-for-byte (no trimming or case folding).
pub fn distinct_categories<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.as_ref();
        if label.trim().is_empty() || out.iter().any(|seen| seen == label) {
            continue;
        }
        out.push(label.to_string());
    }
    out
}

/// Raw categories present on a menu.
pub fn raw_categories_from_menu(items: &[MenuItem]) -> Vec<String> {
    distinct_categories(items.iter().filter_map(|item| item.category.as_deref()))
}

/// Default chart palette.
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#2563eb", "#16a34a", "#dc2626", "#9333ea", "#ea580c", "#0891b2", "#ca8a04", "#db2777",
];

/// Assigns each key a stable colour, in order of first request.
///
/// Keys beyond the palette size wrap around. One allocator is owned per
/// render context so assignments never leak between views.
#[derive(Debug, Clone)]
pub struct ColorAllocator {
    palette: Vec<&'static str>,
    assigned: HashMap<String, usize>,
}

impl ColorAllocator {
    pub fn new(palette: Vec<&'static str>) -> Self {
        Self {
            palette,
            assigned: HashMap::new(),
        }
    }

    /// Colour for `key`, assigning the next palette slot on first use.
    pub fn color_for(&mut self, key: &str) -> &'static str {
        if self.palette.is_empty() {
            return "";
        }
        let next = self.assigned.len();
        let slot = *self.assigned.entry(key.to_string()).or_insert(next);
        self.palette[slot % self.palette.len()]
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE.to_vec())
    }
}
