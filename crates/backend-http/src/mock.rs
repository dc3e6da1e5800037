//! In-memory backend for testing
//!
//! Emulates the server-side rules the reconciliation flow relies on:
//! upsert by `(source_type, source_id, raw_category)`, suggestions only for
//! unmapped raw categories, and inclusive-threshold auto-mapping. Every call
//! is recorded, and any operation can be made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use menuscope_model::{
    AutoMapOutcome, CanonicalCategory, CategoryComparison, CategoryMapping, CategorySuggestion,
    NewMapping, SourceKey, Threshold,
};

use super::{BackendError, CategoryApi};

/// Operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Canonical,
    SeedCanonical,
    Mappings,
    Suggest,
    SaveMapping,
    AutoMap,
    RawCategories,
    Comparison,
    Health,
}

/// A recorded call with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Canonical,
    SeedCanonical,
    Mappings(SourceKey),
    Suggest(SourceKey),
    SaveMapping(NewMapping),
    AutoMap(SourceKey, f64),
    RawCategories(SourceKey),
    Comparison,
    Health,
}

#[derive(Default)]
struct MockState {
    canonical: Vec<CanonicalCategory>,
    seed: Vec<CanonicalCategory>,
    mappings: Vec<CategoryMapping>,
    suggestions: HashMap<SourceKey, Vec<CategorySuggestion>>,
    raw: HashMap<SourceKey, Vec<String>>,
    comparison: CategoryComparison,
    failing: HashSet<MockOp>,
    calls: Vec<MockCall>,
    next_id: u64,
}

impl MockState {
    fn is_mapped(&self, source: &SourceKey, raw: &str) -> bool {
        self.mappings
            .iter()
            .any(|m| m.source_key() == *source && m.raw_category == raw)
    }

    fn canonical_by_id(&self, id: &str) -> Option<&CanonicalCategory> {
        self.canonical.iter().find(|c| c.id == id)
    }

    fn unmapped_suggestions(&self, source: &SourceKey) -> Vec<CategorySuggestion> {
        self.suggestions
            .get(source)
            .map(|pool| {
                pool.iter()
                    .filter(|s| !self.is_mapped(source, &s.raw_category))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upsert(&mut self, new: &NewMapping, confidence: Option<f64>) -> CategoryMapping {
        let canonical = self.canonical_by_id(&new.canonical_category_id).cloned();
        let source = new.source_key();

        if let Some(existing) = self
            .mappings
            .iter_mut()
            .find(|m| m.source_key() == source && m.raw_category == new.raw_category)
        {
            existing.canonical_category_id = new.canonical_category_id.clone();
            existing.is_manual = new.is_manual;
            existing.confidence_score = if new.is_manual {
                None
            } else {
                confidence.or(existing.confidence_score)
            };
            existing.canonical_category = canonical;
            return existing.clone();
        }

        self.next_id += 1;
        let mapping = CategoryMapping {
            id: format!("map-{}", self.next_id),
            source_type: new.source_type,
            source_id: new.source_id.clone(),
            raw_category: new.raw_category.clone(),
            canonical_category_id: new.canonical_category_id.clone(),
            confidence_score: if new.is_manual { None } else { confidence },
            is_manual: new.is_manual,
            canonical_category: canonical,
        };
        self.mappings.push(mapping.clone());
        mapping
    }
}

/// Mock category backend.
///
/// Clones share state, so a test can keep a handle for inspection after
/// moving one into a `Reconciler`.
#[derive(Clone, Default)]
pub struct MockCategoryApi {
    state: Arc<Mutex<MockState>>,
}

impl MockCategoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_canonical(self, canonical: Vec<CanonicalCategory>) -> Self {
        self.lock().canonical = canonical;
        self
    }

    /// Categories that `seed_canonical` adds when missing.
    pub fn with_seed(self, seed: Vec<CanonicalCategory>) -> Self {
        self.lock().seed = seed;
        self
    }

    pub fn with_mappings(self, mappings: Vec<CategoryMapping>) -> Self {
        self.lock().mappings = mappings;
        self
    }

    /// Suggestion pool for a source; mapped entries are filtered on read.
    pub fn with_suggestions(self, source: &SourceKey, suggestions: Vec<CategorySuggestion>) -> Self {
        self.lock().suggestions.insert(source.clone(), suggestions);
        self
    }

    pub fn with_raw_categories(self, source: &SourceKey, raw: Vec<String>) -> Self {
        self.lock().raw.insert(source.clone(), raw);
        self
    }

    pub fn with_comparison(self, comparison: CategoryComparison) -> Self {
        self.lock().comparison = comparison;
        self
    }

    /// Make every subsequent `op` fail with HTTP 500.
    pub fn fail(&self, op: MockOp) {
        self.lock().failing.insert(op);
    }

    pub fn recover(&self, op: MockOp) {
        self.lock().failing.remove(&op);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Persisted mappings of one source.
    pub fn stored_mappings(&self, source: &SourceKey) -> Vec<CategoryMapping> {
        self.lock()
            .mappings
            .iter()
            .filter(|m| m.source_key() == *source)
            .cloned()
            .collect()
    }

    fn record(&self, op: MockOp, call: MockCall) -> Result<MutexGuard<'_, MockState>, BackendError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.failing.contains(&op) {
            return Err(BackendError::Status {
                status: 500,
                body: format!("injected failure for {op:?}"),
            });
        }
        Ok(state)
    }
}

impl CategoryApi for MockCategoryApi {
    async fn canonical_categories(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
        let state = self.record(MockOp::Canonical, MockCall::Canonical)?;
        Ok(state.canonical.clone())
    }

    async fn seed_canonical(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
        let mut state = self.record(MockOp::SeedCanonical, MockCall::SeedCanonical)?;
        let missing: Vec<CanonicalCategory> = state
            .seed
            .iter()
            .filter(|s| !state.canonical.iter().any(|c| c.name == s.name))
            .cloned()
            .collect();
        state.canonical.extend(missing.iter().cloned());
        Ok(missing)
    }

    async fn mappings(&self, source: &SourceKey) -> Result<Vec<CategoryMapping>, BackendError> {
        let state = self.record(MockOp::Mappings, MockCall::Mappings(source.clone()))?;
        Ok(state
            .mappings
            .iter()
            .filter(|m| m.source_key() == *source)
            .cloned()
            .collect())
    }

    async fn suggestions(
        &self,
        source: &SourceKey,
    ) -> Result<Vec<CategorySuggestion>, BackendError> {
        let state = self.record(MockOp::Suggest, MockCall::Suggest(source.clone()))?;
        Ok(state.unmapped_suggestions(source))
    }

    async fn save_mapping(&self, mapping: &NewMapping) -> Result<CategoryMapping, BackendError> {
        let mut state = self.record(MockOp::SaveMapping, MockCall::SaveMapping(mapping.clone()))?;
        if mapping.raw_category.trim().is_empty() {
            return Err(BackendError::Status {
                status: 422,
                body: "raw_category must not be empty".to_string(),
            });
        }
        if state.canonical_by_id(&mapping.canonical_category_id).is_none() {
            return Err(BackendError::Status {
                status: 404,
                body: "Canonical category not found".to_string(),
            });
        }
        Ok(state.upsert(mapping, None))
    }

    async fn auto_map(
        &self,
        source: &SourceKey,
        threshold: Threshold,
    ) -> Result<AutoMapOutcome, BackendError> {
        let mut state = self.record(
            MockOp::AutoMap,
            MockCall::AutoMap(source.clone(), threshold.value()),
        )?;

        if threshold.for_auto_map().is_err() {
            return Err(BackendError::Status {
                status: 422,
                body: format!("threshold must be >= {}", Threshold::AUTO_MAP_FLOOR),
            });
        }

        let unmapped = state.unmapped_suggestions(source);
        let mut mapped = 0;
        for suggestion in unmapped.iter().filter(|s| threshold.admits(s.confidence_score)) {
            let new = NewMapping::new(
                source,
                suggestion.raw_category.clone(),
                suggestion.canonical_category_id.clone(),
                false,
            );
            state.upsert(&new, Some(suggestion.confidence_score));
            mapped += 1;
        }

        Ok(AutoMapOutcome {
            mapped,
            skipped: Some(unmapped.len() as u32 - mapped),
            threshold: Some(threshold.value()),
            message: None,
        })
    }

    async fn raw_categories(&self, source: &SourceKey) -> Result<Vec<String>, BackendError> {
        let state = self.record(MockOp::RawCategories, MockCall::RawCategories(source.clone()))?;
        Ok(state.raw.get(source).cloned().unwrap_or_default())
    }

    async fn comparison(&self) -> Result<CategoryComparison, BackendError> {
        let state = self.record(MockOp::Comparison, MockCall::Comparison)?;
        Ok(state.comparison.clone())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.record(MockOp::Health, MockCall::Health)
            .map(|_| ())
            .map_err(|_| BackendError::Unavailable)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
