//! In-memory state of one source's reconciliation view.

use menuscope_features::{distinct_categories, mapping_counts, mapping_for, suggestion_for, MappingCounts};
use menuscope_model::{AutoMapOutcome, CanonicalCategory, CategoryMapping, CategorySuggestion, SourceKey};
use menuscope_table::{build_table, ReconciliationTable, TableInput};

use crate::StoreError;

/// Identifies the source view a request was issued for.
///
/// Responses whose tag no longer matches the store are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTag {
    pub source: SourceKey,
    pub generation: u64,
}

/// In-progress indicators shown while requests are outstanding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// Raw category whose save is in flight
    pub saving: Option<String>,
    pub auto_mapping: bool,
    pub loading_suggestions: bool,
}

impl Progress {
    pub fn mutation_in_flight(&self) -> bool {
        self.saving.is_some() || self.auto_mapping
    }
}

#[derive(Debug, Clone)]
pub struct MappingStore {
    source: SourceKey,
    generation: u64,
    raw_categories: Vec<String>,
    canonical: Vec<CanonicalCategory>,
    mappings: Vec<CategoryMapping>,
    suggestions: Vec<CategorySuggestion>,
    progress: Progress,
    error: Option<String>,
    last_auto_map: Option<AutoMapOutcome>,
}

impl MappingStore {
    pub fn new(source: SourceKey, raw_categories: Vec<String>) -> Self {
        Self {
            source,
            generation: 0,
            raw_categories: distinct_categories(raw_categories),
            canonical: Vec::new(),
            mappings: Vec::new(),
            suggestions: Vec::new(),
            progress: Progress::default(),
            error: None,
            last_auto_map: None,
        }
    }

    pub fn source(&self) -> &SourceKey {
        &self.source
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn raw_categories(&self) -> &[String] {
        &self.raw_categories
    }

    pub fn canonical(&self) -> &[CanonicalCategory] {
        &self.canonical
    }

    pub fn mappings(&self) -> &[CategoryMapping] {
        &self.mappings
    }

    pub fn suggestions(&self) -> &[CategorySuggestion] {
        &self.suggestions
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Inline error from the last failed mutation.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_auto_map(&self) -> Option<&AutoMapOutcome> {
        self.last_auto_map.as_ref()
    }

    pub fn has_raw_categories(&self) -> bool {
        !self.raw_categories.is_empty()
    }

    pub fn mapping_for(&self, raw: &str) -> Option<&CategoryMapping> {
        mapping_for(&self.mappings, raw)
    }

    /// Suggestion for a raw category; `None` once it is mapped.
    pub fn suggestion_for(&self, raw: &str) -> Option<&CategorySuggestion> {
        if self.mapping_for(raw).is_some() {
            return None;
        }
        suggestion_for(&self.suggestions, raw)
    }

    pub fn counts(&self) -> MappingCounts {
        mapping_counts(&self.raw_categories, &self.mappings)
    }

    pub fn tag(&self) -> RequestTag {
        RequestTag {
            source: self.source.clone(),
            generation: self.generation,
        }
    }

    pub fn is_current(&self, tag: &RequestTag) -> bool {
        tag.generation == self.generation && tag.source == self.source
    }

    /// Point the view at another source. Outstanding responses become stale.
    pub fn switch_source(&mut self, source: SourceKey, raw_categories: Vec<String>) -> RequestTag {
        self.generation += 1;
        self.source = source;
        self.raw_categories = distinct_categories(raw_categories);
        self.mappings.clear();
        self.suggestions.clear();
        self.progress = Progress::default();
        self.error = None;
        self.last_auto_map = None;
        self.tag()
    }

    /// The canonical list is global, so it is never stale.
    pub fn apply_canonical(&mut self, canonical: Vec<CanonicalCategory>) {
        self.canonical = canonical;
    }

    /// Returns false and leaves state untouched when the tag is stale.
    pub fn apply_mappings(&mut self, tag: &RequestTag, mappings: Vec<CategoryMapping>) -> bool {
        if !self.is_current(tag) {
            return false;
        }
        self.mappings = mappings;
        true
    }

    /// Returns false and leaves state untouched when the tag is stale.
    pub fn apply_suggestions(
        &mut self,
        tag: &RequestTag,
        suggestions: Vec<CategorySuggestion>,
    ) -> bool {
        if !self.is_current(tag) {
            return false;
        }
        self.suggestions = suggestions;
        true
    }

    pub fn set_loading_suggestions(&mut self, tag: &RequestTag, loading: bool) {
        if self.is_current(tag) {
            self.progress.loading_suggestions = loading;
        }
    }

    /// Mark a single save as in flight.
    pub fn begin_save(&mut self, raw: &str) -> Result<RequestTag, StoreError> {
        if self.progress.mutation_in_flight() {
            return Err(StoreError::MutationInFlight);
        }
        self.progress.saving = Some(raw.to_string());
        Ok(self.tag())
    }

    /// Mark a bulk auto-map as in flight.
    pub fn begin_auto_map(&mut self) -> Result<RequestTag, StoreError> {
        if self.progress.mutation_in_flight() {
            return Err(StoreError::MutationInFlight);
        }
        self.progress.auto_mapping = true;
        Ok(self.tag())
    }

    /// Clear mutation flags and record the outcome message.
    ///
    /// Returns false when the view moved on while the request was in flight.
    pub fn finish_mutation(&mut self, tag: &RequestTag, error: Option<String>) -> bool {
        if !self.is_current(tag) {
            return false;
        }
        self.progress.saving = None;
        self.progress.auto_mapping = false;
        self.error = error;
        true
    }

    pub fn record_auto_map(&mut self, tag: &RequestTag, outcome: AutoMapOutcome) {
        if self.is_current(tag) {
            self.last_auto_map = Some(outcome);
        }
    }

    pub fn table(&self) -> ReconciliationTable {
        build_table(TableInput {
            raw_categories: &self.raw_categories,
            canonical: &self.canonical,
            mappings: &self.mappings,
            suggestions: &self.suggestions,
            saving: self.progress.saving.as_deref(),
            auto_mapping: self.progress.auto_mapping,
            loading_suggestions: self.progress.loading_suggestions,
            error: self.error.as_deref(),
        })
    }
}
