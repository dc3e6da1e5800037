//! Reconciliation table for category mapping.
//!
//! Turns the store's raw categories, mappings and suggestions into one row
//! per raw category with the action the user can take on it, plus a header
//! with mapped/unmapped counts and the confidence legend. Rendering to text
//! lives here too so every front end shows the same decisions.

mod comparison;

pub use comparison::{pricing_insights, render_comparison, PricingInsights};

use menuscope_features::{mapping_counts, mapping_for, suggestion_for, ConfidenceBand};
use menuscope_model::{CanonicalCategory, CategoryMapping, CategorySuggestion, SuggestionAlternative};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Lifecycle state of one raw category row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RowState {
    /// No mapping and no suggestion
    Unmapped,
    /// No mapping, but the backend has a suggestion
    Suggested,
    /// Mapped; `manual` is false only for accepted-as-automatic mappings
    Mapped { manual: bool },
}

impl RowState {
    pub fn of(mapping: Option<&CategoryMapping>, suggestion: Option<&CategorySuggestion>) -> Self {
        match (mapping, suggestion) {
            (Some(m), _) => Self::Mapped { manual: m.is_manual },
            (None, Some(_)) => Self::Suggested,
            (None, None) => Self::Unmapped,
        }
    }
}

/// What the action cell of a row offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowAction {
    /// Accept the suggested canonical category
    Accept { canonical_category_id: String },
    /// Pick any canonical category; `selected` is the current mapping, if any
    Picker { selected: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedCell {
    pub canonical_category_id: String,
    pub canonical_category_name: String,
    pub is_manual: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionCell {
    pub canonical_category_id: String,
    pub canonical_category_name: String,
    pub confidence_score: f64,
    pub band: ConfidenceBand,
    pub alternatives: Vec<SuggestionAlternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationRow {
    pub raw_category: String,
    pub state: RowState,
    pub mapped_to: Option<MappedCell>,
    /// Only present while the row is unmapped
    pub suggestion: Option<SuggestionCell>,
    pub action: RowAction,
    /// A save for this row is in flight
    pub saving: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    pub mapped: usize,
    pub unmapped: usize,
    /// "Auto-Map All" is offered only when at least one suggestion exists
    pub show_auto_map: bool,
    /// Triggers are disabled while any mutation is in flight
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub band: ConfidenceBand,
    pub color: String,
    pub label: String,
}

/// The full reconciliation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationTable {
    pub header: TableHeader,
    pub rows: Vec<ReconciliationRow>,
    pub legend: Vec<LegendEntry>,
    pub loading_suggestions: bool,
    /// Inline error from the last failed mutation
    pub error: Option<String>,
}

impl ReconciliationTable {
    /// Zero raw categories: render the "nothing to map yet" state.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, raw_category: &str) -> Option<&ReconciliationRow> {
        self.rows.iter().find(|r| r.raw_category == raw_category)
    }
}

/// Everything the table is derived from.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableInput<'a> {
    pub raw_categories: &'a [String],
    pub canonical: &'a [CanonicalCategory],
    pub mappings: &'a [CategoryMapping],
    pub suggestions: &'a [CategorySuggestion],
    /// Raw category whose save is in flight
    pub saving: Option<&'a str>,
    pub auto_mapping: bool,
    pub loading_suggestions: bool,
    pub error: Option<&'a str>,
}

pub fn legend() -> Vec<LegendEntry> {
    ConfidenceBand::all()
        .into_iter()
        .map(|band| LegendEntry {
            band,
            color: band.color().to_string(),
            label: band.legend(),
        })
        .collect()
}

fn canonical_name(
    canonical: &[CanonicalCategory],
    mapping: &CategoryMapping,
) -> String {
    mapping
        .canonical_category
        .as_ref()
        .map(|c| c.name.clone())
        .or_else(|| {
            canonical
                .iter()
                .find(|c| c.id == mapping.canonical_category_id)
                .map(|c| c.name.clone())
        })
        .unwrap_or_else(|| mapping.canonical_category_id.clone())
}

/// Build one row per raw category, in input order.
pub fn build_table(input: TableInput<'_>) -> ReconciliationTable {
    let rows: Vec<ReconciliationRow> = input
        .raw_categories
        .iter()
        .map(|raw| {
            let mapping = mapping_for(input.mappings, raw);
            // A mapped row never shows a suggestion
            let suggestion = match mapping {
                Some(_) => None,
                None => suggestion_for(input.suggestions, raw),
            };

            let action = match (mapping, suggestion) {
                (None, Some(s)) => RowAction::Accept {
                    canonical_category_id: s.canonical_category_id.clone(),
                },
                (m, _) => RowAction::Picker {
                    selected: m.map(|m| m.canonical_category_id.clone()),
                },
            };

            ReconciliationRow {
                raw_category: raw.clone(),
                state: RowState::of(mapping, suggestion),
                mapped_to: mapping.map(|m| MappedCell {
                    canonical_category_id: m.canonical_category_id.clone(),
                    canonical_category_name: canonical_name(input.canonical, m),
                    is_manual: m.is_manual,
                    confidence_score: m.confidence_score,
                }),
                suggestion: suggestion.map(|s| SuggestionCell {
                    canonical_category_id: s.canonical_category_id.clone(),
                    canonical_category_name: s.canonical_category_name.clone(),
                    confidence_score: s.confidence_score,
                    band: ConfidenceBand::of(s.confidence_score),
                    alternatives: s.alternatives.clone(),
                }),
                action,
                saving: input.saving == Some(raw.as_str()),
            }
        })
        .collect();

    let counts = mapping_counts(input.raw_categories, input.mappings);
    let show_auto_map = rows.iter().any(|r| r.suggestion.is_some());

    ReconciliationTable {
        header: TableHeader {
            mapped: counts.mapped,
            unmapped: counts.unmapped,
            show_auto_map,
            busy: input.saving.is_some() || input.auto_mapping,
        },
        rows,
        legend: legend(),
        loading_suggestions: input.loading_suggestions,
        error: input.error.map(str::to_string),
    }
}

fn percent(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}

/// Render the table as plain text for terminals.
pub fn render_text(table: &ReconciliationTable) -> String {
    let mut out = String::new();

    if table.is_empty() {
        out.push_str("Nothing to map yet: this source has no menu categories.\n");
        return out;
    }

    let _ = write!(
        out,
        "{} mapped, {} unmapped",
        table.header.mapped, table.header.unmapped
    );
    if table.header.show_auto_map {
        out.push_str("  [auto-map available]");
    }
    if table.loading_suggestions {
        out.push_str("  (loading suggestions...)");
    }
    out.push('\n');

    if let Some(error) = &table.error {
        let _ = writeln!(out, "error: {error}");
    }

    let _ = writeln!(
        out,
        "{:<28} {:<28} {:<32} {}",
        "RAW CATEGORY", "MAPPED TO", "SUGGESTION", "ACTION"
    );

    for row in &table.rows {
        let mapped = match &row.mapped_to {
            Some(cell) if cell.is_manual => format!("{} (manual)", cell.canonical_category_name),
            Some(cell) => format!("{} (auto)", cell.canonical_category_name),
            None => "Unmapped".to_string(),
        };
        let suggestion = row
            .suggestion
            .as_ref()
            .map(|s| {
                format!(
                    "{} ({}, {})",
                    s.canonical_category_name,
                    percent(s.confidence_score),
                    s.band.as_str()
                )
            })
            .unwrap_or_else(|| "-".to_string());
        let action = match (&row.action, row.saving) {
            (_, true) => "saving...",
            (RowAction::Accept { .. }, false) => "accept",
            (RowAction::Picker { .. }, false) => "pick",
        };
        let _ = writeln!(
            out,
            "{:<28} {:<28} {:<32} {}",
            row.raw_category, mapped, suggestion, action
        );
    }

    let labels: Vec<&str> = table.legend.iter().map(|l| l.label.as_str()).collect();
    let _ = writeln!(out, "Confidence: {}", labels.join(" | "));

    out
}
