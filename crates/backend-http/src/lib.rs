//! HTTP backend for the category reconciliation flow.
//!
//! Provides the `CategoryApi` trait, its reqwest implementation and an
//! in-memory mock. The store depends only on the trait, so the same
//! reconciliation logic runs against the live pricing service or a test
//! double.

mod mock;

pub use mock::{MockCall, MockCategoryApi, MockOp};

use menuscope_features::{distinct_categories, raw_categories_from_menu};
use menuscope_model::{
    AutoMapOutcome, CanonicalCategory, CategoryComparison, CategoryMapping, CategorySuggestion,
    MenuItem, NewMapping, SourceKey, SourceType, Threshold,
};
use menuscope_query::{Method, Operation, QueryDialect, QueryError, RestDialect};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Errors from backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] QueryError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backend not available")]
    Unavailable,
}

/// Trait for category backends (live HTTP service, in-memory mock).
pub trait CategoryApi: Send + Sync {
    /// Global canonical category list.
    fn canonical_categories(
        &self,
    ) -> impl Future<Output = Result<Vec<CanonicalCategory>, BackendError>> + Send;

    /// Create the predefined canonical categories; returns only the new ones.
    fn seed_canonical(
        &self,
    ) -> impl Future<Output = Result<Vec<CanonicalCategory>, BackendError>> + Send;

    /// All persisted mappings of one source.
    fn mappings(
        &self,
        source: &SourceKey,
    ) -> impl Future<Output = Result<Vec<CategoryMapping>, BackendError>> + Send;

    /// Suggestions for the source's currently unmapped raw categories.
    fn suggestions(
        &self,
        source: &SourceKey,
    ) -> impl Future<Output = Result<Vec<CategorySuggestion>, BackendError>> + Send;

    /// Upsert one mapping.
    fn save_mapping(
        &self,
        mapping: &NewMapping,
    ) -> impl Future<Output = Result<CategoryMapping, BackendError>> + Send;

    /// Accept every suggestion at or above `threshold`.
    fn auto_map(
        &self,
        source: &SourceKey,
        threshold: Threshold,
    ) -> impl Future<Output = Result<AutoMapOutcome, BackendError>> + Send;

    /// Distinct raw categories present on the source's menu.
    fn raw_categories(
        &self,
        source: &SourceKey,
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    /// Operator vs market pricing per canonical category.
    fn comparison(&self) -> impl Future<Output = Result<CategoryComparison, BackendError>> + Send;

    /// Check if the backend is healthy.
    fn health_check(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Get the backend name for logging.
    fn name(&self) -> &'static str;
}

/// HTTP backend configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Scheme and authority of the pricing service
    pub base_url: String,
    /// Versioned API prefix
    pub api_prefix: String,
    /// Tenant code sent as `X-Tenant-ID`
    pub tenant: Option<String>,
    /// Request timeout in seconds; `None` keeps the transport default
    pub timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            api_prefix: "/api/v1".to_string(),
            tenant: None,
            timeout_secs: None,
        }
    }
}

impl HttpConfig {
    /// Build from `MENUSCOPE_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self, BackendError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BackendError> {
        let mut config = Self::default();
        if let Some(url) = lookup("MENUSCOPE_API_URL") {
            config.base_url = url;
        }
        if let Some(prefix) = lookup("MENUSCOPE_API_PREFIX") {
            config.api_prefix = prefix;
        }
        config.tenant = lookup("MENUSCOPE_TENANT").filter(|t| !t.trim().is_empty());
        if let Some(secs) = lookup("MENUSCOPE_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|_| {
                BackendError::InvalidConfig(format!("MENUSCOPE_TIMEOUT_SECS={secs}"))
            })?;
            config.timeout_secs = Some(secs);
        }
        Ok(config)
    }
}

/// reqwest-backed client for the pricing service.
pub struct HttpCategoryApi {
    config: HttpConfig,
    dialect: RestDialect,
    client: reqwest::Client,
}

impl HttpCategoryApi {
    pub fn new(config: HttpConfig) -> Result<Self, BackendError> {
        let mut builder = reqwest::Client::builder();

        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        if let Some(tenant) = &config.tenant {
            let value = HeaderValue::from_str(tenant)
                .map_err(|e| BackendError::InvalidConfig(format!("tenant: {e}")))?;
            let mut headers = HeaderMap::new();
            headers.insert("X-Tenant-ID", value);
            builder = builder.default_headers(headers);
        }

        let client = builder
            .build()
            .map_err(|e| BackendError::InvalidConfig(e.to_string()))?;
        let dialect = RestDialect::new(config.api_prefix.clone());

        Ok(Self {
            config,
            dialect,
            client,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn execute<T>(&self, operation: Operation) -> Result<T, BackendError>
    where
        T: DeserializeOwned + Send,
    {
        let request = self.dialect.translate(&operation)?;
        let url = self.url(&request.path);

        tracing::debug!(method = ?request.method, url = %url, "Dispatching backend request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))
    }
}

impl CategoryApi for HttpCategoryApi {
    async fn canonical_categories(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
        self.execute(Operation::ListCanonical).await
    }

    async fn seed_canonical(&self) -> Result<Vec<CanonicalCategory>, BackendError> {
        self.execute(Operation::SeedCanonical).await
    }

    async fn mappings(&self, source: &SourceKey) -> Result<Vec<CategoryMapping>, BackendError> {
        self.execute(Operation::ListMappings(source.clone())).await
    }

    async fn suggestions(
        &self,
        source: &SourceKey,
    ) -> Result<Vec<CategorySuggestion>, BackendError> {
        self.execute(Operation::Suggest(source.clone())).await
    }

    async fn save_mapping(&self, mapping: &NewMapping) -> Result<CategoryMapping, BackendError> {
        self.execute(Operation::SaveMapping(mapping.clone())).await
    }

    async fn auto_map(
        &self,
        source: &SourceKey,
        threshold: Threshold,
    ) -> Result<AutoMapOutcome, BackendError> {
        self.execute(Operation::AutoMap(source.clone(), threshold))
            .await
    }

    async fn raw_categories(&self, source: &SourceKey) -> Result<Vec<String>, BackendError> {
        let operation = Operation::RawCategories(source.clone());
        match source.source_type {
            SourceType::Operator => {
                let labels: Vec<String> = self.execute(operation).await?;
                Ok(distinct_categories(labels))
            }
            SourceType::Competitor => {
                let items: Vec<MenuItem> = self.execute(operation).await?;
                Ok(raw_categories_from_menu(&items))
            }
        }
    }

    async fn comparison(&self) -> Result<CategoryComparison, BackendError> {
        self.execute(Operation::Comparison).await
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        match self.execute::<serde_json::Value>(Operation::Health).await {
            Ok(_) => Ok(()),
            Err(BackendError::Status { .. }) => Err(BackendError::Unavailable),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::HeaderMap as AxumHeaders;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorded {
        bodies: Arc<Mutex<Vec<Value>>>,
        tenants: Arc<Mutex<Vec<String>>>,
    }

    async fn list_mappings(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        Json(json!([{
            "id": "m1",
            "source_type": q.get("source_type").cloned().unwrap_or_default(),
            "source_id": q.get("source_id").cloned().unwrap_or_default(),
            "raw_category": "Burgers",
            "canonical_category_id": "c1",
            "confidence_score": "0.9100",
            "is_manual": false
        }]))
    }

    async fn save_mapping(
        State(recorded): State<Recorded>,
        headers: AxumHeaders,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        if let Some(tenant) = headers.get("x-tenant-id").and_then(|v| v.to_str().ok()) {
            recorded.tenants.lock().unwrap().push(tenant.to_string());
        }
        recorded.bodies.lock().unwrap().push(body.clone());
        Json(json!({
            "id": "m-new",
            "source_type": body["source_type"],
            "source_id": body["source_id"],
            "raw_category": body["raw_category"],
            "canonical_category_id": body["canonical_category_id"],
            "confidence_score": null,
            "is_manual": body["is_manual"]
        }))
    }

    async fn auto_map(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
        let threshold: f64 = q["threshold"].parse().unwrap();
        Json(json!({ "mapped": 2, "skipped": 1, "threshold": threshold }))
    }

    async fn spawn_backend(recorded: Recorded) -> String {
        let app = Router::new()
            .route("/api/health", get(|| async { Json(json!({"status": "ok"})) }))
            .route(
                "/api/v1/categories/canonical",
                get(|| async { Json(json!([{"id": "c1", "name": "Burgers", "keywords": "burger,patty"}])) }),
            )
            .route("/api/v1/categories/mappings", get(list_mappings).post(save_mapping))
            .route(
                "/api/v1/categories/suggest",
                get(|| async {
                    Json(json!([{
                        "raw_category": "Sandwiches",
                        "canonical_category_id": "c1",
                        "canonical_category_name": "Burgers",
                        "confidence_score": 0.82,
                        "alternatives": []
                    }]))
                }),
            )
            .route("/api/v1/categories/auto-map", post(auto_map))
            .route(
                "/api/v1/operator/categories",
                get(|| async { Json(json!(["Burgers", "Sides", "Burgers", ""])) }),
            )
            .route(
                "/api/v1/competitors/c-1/menu",
                get(|| async {
                    Json(json!([
                        {"id": "i1", "name": "Classic", "category": "Smash Burgers", "current_price": "9.99"},
                        {"id": "i2", "name": "Fries", "category": null},
                        {"id": "i3", "name": "Double", "category": "Smash Burgers"}
                    ]))
                }),
            )
            .with_state(recorded);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn api_for(base_url: String, tenant: Option<&str>) -> HttpCategoryApi {
        HttpCategoryApi::new(HttpConfig {
            base_url,
            tenant: tenant.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_reads_against_live_server() {
        let base = spawn_backend(Recorded::default()).await;
        let api = api_for(base, None);
        let source = SourceKey::competitor("c-1");

        api.health_check().await.unwrap();

        let canonical = api.canonical_categories().await.unwrap();
        assert_eq!(canonical[0].keyword_list(), vec!["burger", "patty"]);

        let mappings = api.mappings(&source).await.unwrap();
        assert_eq!(mappings[0].source_key(), source);
        assert_eq!(mappings[0].confidence_score, Some(0.91));

        let suggestions = api.suggestions(&source).await.unwrap();
        assert_eq!(suggestions[0].raw_category, "Sandwiches");

        assert_eq!(api.raw_categories(&source).await.unwrap(), vec!["Smash Burgers"]);
        assert_eq!(
            api.raw_categories(&SourceKey::operator("op")).await.unwrap(),
            vec!["Burgers", "Sides"]
        );
    }

    #[tokio::test]
    async fn test_save_mapping_posts_body_with_tenant() {
        let recorded = Recorded::default();
        let base = spawn_backend(recorded.clone()).await;
        let api = api_for(base, Some("acme"));

        let body = NewMapping::new(&SourceKey::operator("op-1"), "Sandwiches", "c1", true);
        let saved = api.save_mapping(&body).await.unwrap();
        assert_eq!(saved.raw_category, "Sandwiches");
        assert!(saved.is_manual);

        let bodies = recorded.bodies.lock().unwrap().clone();
        assert_eq!(
            bodies,
            vec![json!({
                "source_type": "operator",
                "source_id": "op-1",
                "raw_category": "Sandwiches",
                "canonical_category_id": "c1",
                "is_manual": true
            })]
        );
        assert_eq!(recorded.tenants.lock().unwrap().clone(), vec!["acme".to_string()]);
    }

    #[tokio::test]
    async fn test_auto_map_sends_threshold() {
        let base = spawn_backend(Recorded::default()).await;
        let api = api_for(base, None);

        let outcome = api
            .auto_map(&SourceKey::operator("op"), Threshold::new(0.75).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome.mapped, 2);
        assert_eq!(outcome.threshold, Some(0.75));
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let base = spawn_backend(Recorded::default()).await;
        let api = api_for(base, None);

        let err = api.comparison().await.unwrap_err();
        assert!(matches!(err, BackendError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_invalid_request_never_dispatched() {
        let api = api_for("http://127.0.0.1:9".to_string(), None);
        let err = api
            .save_mapping(&NewMapping::new(&SourceKey::operator("op"), "", "c1", true))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidRequest(QueryError::EmptyRawCategory)));
    }

    #[test]
    fn test_config_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("MENUSCOPE_API_URL", "https://pricing.example.com"),
            ("MENUSCOPE_TENANT", "acme"),
            ("MENUSCOPE_TIMEOUT_SECS", "15"),
        ]
        .into_iter()
        .collect();
        let config = HttpConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url, "https://pricing.example.com");
        assert_eq!(config.api_prefix, "/api/v1");
        assert_eq!(config.tenant.as_deref(), Some("acme"));
        assert_eq!(config.timeout_secs, Some(15));

        let bad = HttpConfig::from_lookup(|k| {
            (k == "MENUSCOPE_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        assert!(matches!(bad, Err(BackendError::InvalidConfig(_))));
    }
}
