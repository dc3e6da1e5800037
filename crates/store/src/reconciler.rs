//! Load and mutation pipeline over a `CategoryApi`.

use std::sync::Arc;

use menuscope_backend_http::CategoryApi;
use menuscope_model::{AutoMapOutcome, CategoryMapping, NewMapping, SourceKey, Threshold};
use menuscope_table::ReconciliationTable;
use tokio::sync::RwLock;

use crate::state::{MappingStore, RequestTag};
use crate::StoreError;

/// Configuration for the reconciler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    /// Minimum confidence for "Auto-Map All" (inclusive)
    pub auto_map_threshold: Threshold,
    /// `is_manual` value sent when a suggestion is accepted
    pub accept_marks_manual: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            auto_map_threshold: Threshold::default(),
            accept_marks_manual: true,
        }
    }
}

/// Drives one source view: fetches, mutations and the refetch cascade.
///
/// The store lock is never held across a backend call, so the view can be
/// rendered while requests are outstanding.
pub struct Reconciler<A> {
    api: A,
    config: ReconcileConfig,
    state: Arc<RwLock<MappingStore>>,
}

impl<A: CategoryApi> Reconciler<A> {
    pub fn new(api: A, source: SourceKey, raw_categories: Vec<String>, config: ReconcileConfig) -> Self {
        Self {
            api,
            config,
            state: Arc::new(RwLock::new(MappingStore::new(source, raw_categories))),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Shared handle to the store, for renderers.
    pub fn store(&self) -> Arc<RwLock<MappingStore>> {
        Arc::clone(&self.state)
    }

    pub async fn snapshot(&self) -> MappingStore {
        self.state.read().await.clone()
    }

    pub async fn table(&self) -> ReconciliationTable {
        self.state.read().await.table()
    }

    /// Initial load: canonical categories and mappings concurrently, then
    /// suggestions once both have resolved.
    pub async fn mount(&self) {
        let tag = self.state.read().await.tag();
        tracing::debug!(source = %tag.source, "Mounting reconciliation view");

        tokio::join!(self.load_canonical(), self.load_mappings_for(&tag));
        self.load_suggestions_for(&tag).await;
    }

    /// Point the view at another source and load it from scratch.
    pub async fn switch_source(&self, source: SourceKey, raw_categories: Vec<String>) {
        let tag = self
            .state
            .write()
            .await
            .switch_source(source, raw_categories);
        tracing::debug!(source = %tag.source, generation = tag.generation, "Switched source");

        tokio::join!(self.load_canonical(), self.load_mappings_for(&tag));
        self.load_suggestions_for(&tag).await;
    }

    /// Refetch mappings, then suggestions against the fresh mappings.
    pub async fn refresh(&self) {
        let tag = self.state.read().await.tag();
        self.refresh_for(&tag).await;
    }

    async fn refresh_for(&self, tag: &RequestTag) {
        self.load_mappings_for(tag).await;
        self.load_suggestions_for(tag).await;
    }

    pub async fn load_canonical(&self) {
        match self.api.canonical_categories().await {
            Ok(canonical) => self.state.write().await.apply_canonical(canonical),
            Err(e) => tracing::error!(error = %e, "Failed to load canonical categories"),
        }
    }

    pub async fn load_mappings(&self) {
        let tag = self.state.read().await.tag();
        self.load_mappings_for(&tag).await;
    }

    async fn load_mappings_for(&self, tag: &RequestTag) {
        match self.api.mappings(&tag.source).await {
            Ok(mappings) => {
                if !self.state.write().await.apply_mappings(tag, mappings) {
                    tracing::warn!(source = %tag.source, "Discarding stale mappings response");
                }
            }
            Err(e) => {
                tracing::error!(source = %tag.source, error = %e, "Failed to load mappings")
            }
        }
    }

    pub async fn load_suggestions(&self) {
        let tag = self.state.read().await.tag();
        self.load_suggestions_for(&tag).await;
    }

    async fn load_suggestions_for(&self, tag: &RequestTag) {
        {
            let mut state = self.state.write().await;
            if !state.is_current(tag) {
                return;
            }
            if !state.has_raw_categories() {
                state.apply_suggestions(tag, Vec::new());
                return;
            }
            state.set_loading_suggestions(tag, true);
        }

        let result = self.api.suggestions(&tag.source).await;

        let mut state = self.state.write().await;
        state.set_loading_suggestions(tag, false);
        match result {
            Ok(suggestions) => {
                if !state.apply_suggestions(tag, suggestions) {
                    tracing::warn!(source = %tag.source, "Discarding stale suggestions response");
                }
            }
            Err(e) => {
                tracing::error!(source = %tag.source, error = %e, "Failed to load suggestions")
            }
        }
    }

    /// Refetch after a successful mutation, then release the in-flight flag.
    ///
    /// The flag stays set for the whole refetch so no other mutation can
    /// start while its responses are outstanding.
    async fn settle(&self, tag: &RequestTag) {
        let current = self.state.read().await.is_current(tag);
        if current {
            self.refresh_for(tag).await;
        } else {
            tracing::warn!(source = %tag.source, "Source changed during mutation; skipping refresh");
        }
        self.state.write().await.finish_mutation(tag, None);
    }

    /// Persist one mapping, then refetch mappings and suggestions.
    ///
    /// Nothing is patched locally; the view only changes through the refetch.
    pub async fn save_mapping(
        &self,
        raw_category: &str,
        canonical_category_id: &str,
        is_manual: bool,
    ) -> Result<CategoryMapping, StoreError> {
        if raw_category.trim().is_empty() {
            return Err(StoreError::EmptyRawCategory);
        }

        let tag = self.state.write().await.begin_save(raw_category)?;
        let mapping = NewMapping::new(&tag.source, raw_category, canonical_category_id, is_manual);

        tracing::info!(
            source = %tag.source,
            raw_category,
            canonical_category_id,
            is_manual,
            "Saving category mapping"
        );

        match self.api.save_mapping(&mapping).await {
            Ok(saved) => {
                self.settle(&tag).await;
                Ok(saved)
            }
            Err(e) => {
                let message = format!("Failed to save mapping for '{raw_category}': {e}");
                tracing::error!(source = %tag.source, error = %e, "Mapping save failed");
                self.state.write().await.finish_mutation(&tag, Some(message));
                Err(e.into())
            }
        }
    }

    /// Accept the current suggestion for an unmapped raw category.
    pub async fn accept(&self, raw_category: &str) -> Result<CategoryMapping, StoreError> {
        let canonical_id = self
            .state
            .read()
            .await
            .suggestion_for(raw_category)
            .map(|s| s.canonical_category_id.clone())
            .ok_or_else(|| StoreError::NoSuggestion(raw_category.to_string()))?;

        self.save_mapping(raw_category, &canonical_id, self.config.accept_marks_manual)
            .await
    }

    /// Pick a canonical category by hand. Always recorded as manual.
    pub async fn repick(
        &self,
        raw_category: &str,
        canonical_category_id: &str,
    ) -> Result<CategoryMapping, StoreError> {
        self.save_mapping(raw_category, canonical_category_id, true)
            .await
    }

    /// Bulk-accept suggestions at or above the configured threshold.
    pub async fn auto_map(&self) -> Result<AutoMapOutcome, StoreError> {
        self.auto_map_with(self.config.auto_map_threshold).await
    }

    /// Bulk-accept suggestions at or above `threshold`.
    ///
    /// Mapping nothing is a successful outcome, not an error.
    pub async fn auto_map_with(&self, threshold: Threshold) -> Result<AutoMapOutcome, StoreError> {
        let tag = self.state.write().await.begin_auto_map()?;

        match self.api.auto_map(&tag.source, threshold).await {
            Ok(outcome) => {
                tracing::info!(
                    source = %tag.source,
                    threshold = threshold.value(),
                    mapped = outcome.mapped,
                    "Auto-mapped categories"
                );
                self.state.write().await.record_auto_map(&tag, outcome.clone());
                self.settle(&tag).await;
                Ok(outcome)
            }
            Err(e) => {
                let message = format!("Auto-map failed: {e}");
                tracing::error!(source = %tag.source, error = %e, "Auto-map failed");
                self.state.write().await.finish_mutation(&tag, Some(message));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use menuscope_backend_http::{BackendError, MockCall, MockCategoryApi, MockOp};
    use menuscope_model::{CanonicalCategory, CategoryComparison, CategorySuggestion};
    use menuscope_table::{RowAction, RowState};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    /// Mock wrapper that can park the next mappings fetch until released.
    #[derive(Clone)]
    struct GatedApi {
        inner: MockCategoryApi,
        hold: Arc<AtomicBool>,
        parked: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedApi {
        fn new(inner: MockCategoryApi) -> Self {
            Self {
                inner,
                hold: Arc::new(AtomicBool::new(false)),
                parked: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }

        fn hold_next_mappings(&self) {
            self.hold.store(true, Ordering::SeqCst);
        }
    }

    impl CategoryApi for GatedApi {
        async fn canonical_categories(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
            self.inner.canonical_categories().await
        }

        async fn seed_canonical(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
            self.inner.seed_canonical().await
        }

        async fn mappings(&self, source: &SourceKey) -> Result<Vec<CategoryMapping>, BackendError> {
            // Snapshot before parking, so the response is older than anything saved meanwhile
            let response = self.inner.mappings(source).await;
            if self.hold.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            response
        }

        async fn suggestions(
            &self,
            source: &SourceKey,
        ) -> Result<Vec<CategorySuggestion>, BackendError> {
            self.inner.suggestions(source).await
        }

        async fn save_mapping(&self, mapping: &NewMapping) -> Result<CategoryMapping, BackendError> {
            self.inner.save_mapping(mapping).await
        }

        async fn auto_map(
            &self,
            source: &SourceKey,
            threshold: Threshold,
        ) -> Result<AutoMapOutcome, BackendError> {
            self.inner.auto_map(source, threshold).await
        }

        async fn raw_categories(&self, source: &SourceKey) -> Result<Vec<String>, BackendError> {
            self.inner.raw_categories(source).await
        }

        async fn comparison(&self) -> Result<CategoryComparison, BackendError> {
            self.inner.comparison().await
        }

        async fn health_check(&self) -> Result<(), BackendError> {
            self.inner.health_check().await
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    fn suggestion(raw: &str, canonical: &str, score: f64) -> CategorySuggestion {
        CategorySuggestion {
            raw_category: raw.to_string(),
            canonical_category_id: canonical.to_string(),
            canonical_category_name: "Burgers".to_string(),
            confidence_score: score,
            alternatives: Vec::new(),
        }
    }

    fn raw(labels: &[&str]) -> Vec<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    fn scenario() -> (MockCategoryApi, SourceKey) {
        let source = SourceKey::competitor("c-1");
        let api = MockCategoryApi::new()
            .with_canonical(vec![CanonicalCategory::new("c1", "Burgers")])
            .with_suggestions(&source, vec![suggestion("Sandwiches", "c1", 0.82)]);
        (api, source)
    }

    #[tokio::test]
    async fn test_mount_loads_suggestions_after_mappings() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );

        reconciler.mount().await;

        let calls = api.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[..2].contains(&MockCall::Canonical));
        assert!(calls[..2].contains(&MockCall::Mappings(source.clone())));
        assert_eq!(calls[2], MockCall::Suggest(source));

        let table = reconciler.table().await;
        assert_eq!(table.rows[0].state, RowState::Suggested);
        assert!(table.header.show_auto_map);
        assert!(!table.loading_suggestions);
    }

    #[tokio::test]
    async fn test_empty_source_skips_suggestion_request() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(api.clone(), source, Vec::new(), ReconcileConfig::default());

        reconciler.mount().await;

        assert!(!api.calls().iter().any(|c| matches!(c, MockCall::Suggest(_))));
        assert!(reconciler.table().await.is_empty());
    }

    #[tokio::test]
    async fn test_accept_posts_manual_mapping_and_refetches() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;
        api.clear_calls();

        let saved = reconciler.accept("Sandwiches").await.unwrap();
        assert_eq!(saved.canonical_category_id, "c1");

        assert_eq!(
            api.calls(),
            vec![
                MockCall::SaveMapping(NewMapping {
                    source_type: source.source_type,
                    source_id: source.source_id.clone(),
                    raw_category: "Sandwiches".to_string(),
                    canonical_category_id: "c1".to_string(),
                    is_manual: true,
                }),
                MockCall::Mappings(source.clone()),
                MockCall::Suggest(source.clone()),
            ]
        );

        let store = reconciler.snapshot().await;
        assert_eq!(store.mappings().len(), 1);
        assert!(store.suggestion_for("Sandwiches").is_none());
        let table = store.table();
        assert_eq!(table.rows[0].state, RowState::Mapped { manual: true });
        assert!(!table.header.show_auto_map);
    }

    #[tokio::test]
    async fn test_accept_can_record_automatic_origin() {
        let (api, source) = scenario();
        let config = ReconcileConfig {
            accept_marks_manual: false,
            ..Default::default()
        };
        let reconciler = Reconciler::new(api.clone(), source.clone(), raw(&["Sandwiches"]), config);
        reconciler.mount().await;

        reconciler.accept("Sandwiches").await.unwrap();
        assert!(!api.stored_mappings(&source)[0].is_manual);
    }

    #[tokio::test]
    async fn test_accept_without_suggestion() {
        let (api, source) = scenario();
        let reconciler =
            Reconciler::new(api.clone(), source, raw(&["Sides"]), ReconcileConfig::default());
        reconciler.mount().await;

        let err = reconciler.accept("Sides").await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuggestion(raw) if raw == "Sides"));
    }

    #[tokio::test]
    async fn test_repick_always_manual() {
        let source = SourceKey::operator("op");
        let api = MockCategoryApi::new()
            .with_canonical(vec![
                CanonicalCategory::new("c1", "Burgers"),
                CanonicalCategory::new("c2", "Sandwiches & Wraps"),
            ])
            .with_suggestions(&source, vec![suggestion("Subs", "c1", 0.95)]);
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["Subs"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;
        reconciler.auto_map().await.unwrap();
        assert!(!api.stored_mappings(&source)[0].is_manual);

        api.clear_calls();
        reconciler.repick("Subs", "c2").await.unwrap();

        match &api.calls()[0] {
            MockCall::SaveMapping(body) => {
                assert!(body.is_manual);
                assert_eq!(body.canonical_category_id, "c2");
            }
            other => panic!("unexpected call {other:?}"),
        }
        let stored = api.stored_mappings(&source);
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_manual);

        let table = reconciler.table().await;
        assert_eq!(
            table.rows[0].action,
            RowAction::Picker { selected: Some("c2".to_string()) }
        );
    }

    #[tokio::test]
    async fn test_auto_map_threshold_is_inclusive() {
        let source = SourceKey::competitor("c-1");
        let api = MockCategoryApi::new()
            .with_canonical(vec![CanonicalCategory::new("c1", "Burgers")])
            .with_suggestions(
                &source,
                vec![
                    suggestion("r1", "c1", 0.9),
                    suggestion("r2", "c1", 0.7),
                    suggestion("r3", "c1", 0.75),
                ],
            );
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["r1", "r2", "r3"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        let outcome = reconciler.auto_map().await.unwrap();
        assert_eq!(outcome.mapped, 2);
        assert!(api.calls().contains(&MockCall::AutoMap(source.clone(), 0.75)));

        let store = reconciler.snapshot().await;
        assert!(store.mapping_for("r1").is_some());
        assert!(store.mapping_for("r3").is_some());
        assert!(store.mapping_for("r2").is_none());
        assert!(store.suggestion_for("r2").is_some());
        assert_eq!(store.last_auto_map().map(|o| o.mapped), Some(2));
        assert_eq!(store.error(), None);
    }

    #[tokio::test]
    async fn test_auto_map_with_nothing_to_map_is_not_an_error() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(
            api.clone(),
            source,
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        let outcome = reconciler
            .auto_map_with(Threshold::new(0.9).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.mapped, 0);
        assert_eq!(reconciler.snapshot().await.error(), None);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_lists() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(
            api.clone(),
            source,
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        api.fail(MockOp::Suggest);
        api.fail(MockOp::Canonical);
        reconciler.load_canonical().await;
        reconciler.refresh().await;

        let store = reconciler.snapshot().await;
        assert_eq!(store.canonical().len(), 1);
        assert_eq!(store.suggestions().len(), 1);
        assert_eq!(store.error(), None);
        assert!(!store.progress().loading_suggestions);
    }

    #[tokio::test]
    async fn test_mutation_failure_is_inline_and_retryable() {
        let (api, source) = scenario();
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        api.fail(MockOp::SaveMapping);
        let err = reconciler.accept("Sandwiches").await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));

        let store = reconciler.snapshot().await;
        assert!(store.error().unwrap().contains("Sandwiches"));
        assert!(store.mappings().is_empty());
        assert_eq!(store.suggestions().len(), 1);
        assert!(!store.progress().mutation_in_flight());

        api.recover(MockOp::SaveMapping);
        reconciler.accept("Sandwiches").await.unwrap();
        let store = reconciler.snapshot().await;
        assert_eq!(store.error(), None);
        assert_eq!(api.stored_mappings(&source).len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_canonical_surfaces_error() {
        let (api, source) = scenario();
        let reconciler =
            Reconciler::new(api, source, raw(&["Sides"]), ReconcileConfig::default());
        reconciler.mount().await;

        assert!(reconciler.repick("Sides", "missing").await.is_err());
        assert!(reconciler.table().await.error.is_some());
    }

    #[tokio::test]
    async fn test_empty_raw_category_never_dispatched() {
        let (api, source) = scenario();
        let reconciler =
            Reconciler::new(api.clone(), source, raw(&["Sides"]), ReconcileConfig::default());

        let err = reconciler.repick("  ", "c1").await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyRawCategory));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_switch_source_reloads_new_view() {
        let (api, source) = scenario();
        let other = SourceKey::operator("op");
        let api = api.with_suggestions(&other, vec![suggestion("Melts", "c1", 0.55)]);
        let reconciler = Reconciler::new(
            api.clone(),
            source,
            raw(&["Sandwiches"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        reconciler.switch_source(other.clone(), raw(&["Melts"])).await;

        let store = reconciler.snapshot().await;
        assert_eq!(store.source(), &other);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.suggestions().len(), 1);
        assert_eq!(store.suggestions()[0].raw_category, "Melts");
        assert!(api.calls().contains(&MockCall::Suggest(other)));
    }

    #[tokio::test]
    async fn test_raw_category_keys_are_not_trimmed() {
        let source = SourceKey::competitor("c-1");
        let api = MockCategoryApi::new()
            .with_canonical(vec![CanonicalCategory::new("c1", "Burgers")])
            .with_suggestions(&source, vec![suggestion("Sandwiches ", "c1", 0.82)]);
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["Sandwiches "]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;

        let table = reconciler.table().await;
        assert_eq!(table.rows[0].raw_category, "Sandwiches ");
        assert_eq!(table.rows[0].state, RowState::Suggested);
        assert!(table.header.show_auto_map);

        reconciler.accept("Sandwiches ").await.unwrap();
        assert_eq!(api.stored_mappings(&source)[0].raw_category, "Sandwiches ");

        let table = reconciler.table().await;
        assert_eq!(table.rows[0].state, RowState::Mapped { manual: true });
        assert_eq!(table.header.mapped, 1);
    }

    #[tokio::test]
    async fn test_mutation_stays_in_flight_until_refetch_lands() {
        let source = SourceKey::operator("op");
        let mock = MockCategoryApi::new()
            .with_canonical(vec![CanonicalCategory::new("c1", "Burgers")])
            .with_suggestions(
                &source,
                vec![suggestion("A", "c1", 0.9), suggestion("B", "c1", 0.9)],
            );
        let api = GatedApi::new(mock.clone());
        let reconciler = Reconciler::new(
            api.clone(),
            source.clone(),
            raw(&["A", "B"]),
            ReconcileConfig::default(),
        );
        reconciler.mount().await;
        api.hold_next_mappings();

        let overlapping = async {
            api.parked.notified().await;
            let busy = reconciler.table().await.header.busy;
            let second = reconciler.accept("B").await;
            api.release.notify_one();
            (busy, second)
        };
        let (first, (busy, second)) = tokio::join!(reconciler.accept("A"), overlapping);

        first.unwrap();
        assert!(busy);
        assert!(matches!(second, Err(StoreError::MutationInFlight)));
        assert_eq!(mock.stored_mappings(&source).len(), 1);

        reconciler.accept("B").await.unwrap();

        let store = reconciler.snapshot().await;
        let mapped: Vec<&str> = store
            .mappings()
            .iter()
            .map(|m| m.raw_category.as_str())
            .collect();
        assert_eq!(mapped, vec!["A", "B"]);
        assert_eq!(store.counts().unmapped, 0);
        assert!(!store.progress().mutation_in_flight());
    }
}
