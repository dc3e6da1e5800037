//! Request translation for the pricing backend.
//!
//! Converts abstract `Operation`s into concrete HTTP request descriptions:
//! - REST paths and query strings (`RestDialect`)
//! - JSON bodies for mutations
//!
//! Inputs are validated here so the transport never sends a request the
//! backend would reject for a malformed key.

use menuscope_model::{NewMapping, SourceKey, SourceType, Threshold};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("Empty raw category")]
    EmptyRawCategory,
    #[error("Empty source id")]
    EmptySourceId,
    #[error("Invalid source id: {0}")]
    InvalidSourceId(String),
    #[error("Empty canonical category id")]
    EmptyCanonicalId,
}

/// A backend operation, independent of wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Health,
    ListCanonical,
    SeedCanonical,
    ListMappings(SourceKey),
    Suggest(SourceKey),
    SaveMapping(NewMapping),
    AutoMap(SourceKey, Threshold),
    RawCategories(SourceKey),
    Comparison,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully translated request, relative to the backend's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path including any API prefix, always starting with `/`
    pub path: String,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    fn get(path: String) -> Self {
        Self {
            method: Method::Get,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn post(path: String) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    fn with_source(mut self, source: &SourceKey) -> Self {
        self.query
            .push(("source_type", source.source_type.as_str().to_string()));
        self.query.push(("source_id", source.source_id.clone()));
        self
    }
}

/// Trait for translating operations to a backend-specific request shape.
pub trait QueryDialect {
    /// The output type (usually a request description)
    type Output;

    /// Translate an operation to this dialect
    fn translate(&self, operation: &Operation) -> Result<Self::Output, QueryError>;
}

/// The FastAPI-style REST layout served under a versioned prefix.
#[derive(Debug, Clone)]
pub struct RestDialect {
    api_prefix: String,
}

impl RestDialect {
    pub fn new(api_prefix: impl Into<String>) -> Self {
        let prefix = api_prefix.into();
        let trimmed = prefix.trim_matches('/');
        let api_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self { api_prefix }
    }

    fn path(&self, rest: &str) -> String {
        format!("{}{}", self.api_prefix, rest)
    }
}

impl Default for RestDialect {
    fn default() -> Self {
        Self::new("/api/v1")
    }
}

impl QueryDialect for RestDialect {
    type Output = HttpRequest;

    fn translate(&self, operation: &Operation) -> Result<HttpRequest, QueryError> {
        let request = match operation {
            // Health lives outside the versioned prefix
            Operation::Health => HttpRequest::get("/api/health".to_string()),
            Operation::ListCanonical => HttpRequest::get(self.path("/categories/canonical")),
            Operation::SeedCanonical => HttpRequest::post(self.path("/categories/canonical/seed")),
            Operation::ListMappings(source) => {
                validate_source(source)?;
                HttpRequest::get(self.path("/categories/mappings")).with_source(source)
            }
            Operation::Suggest(source) => {
                validate_source(source)?;
                HttpRequest::get(self.path("/categories/suggest")).with_source(source)
            }
            Operation::SaveMapping(mapping) => {
                validate_source(&mapping.source_key())?;
                if mapping.raw_category.trim().is_empty() {
                    return Err(QueryError::EmptyRawCategory);
                }
                if mapping.canonical_category_id.trim().is_empty() {
                    return Err(QueryError::EmptyCanonicalId);
                }
                let mut request = HttpRequest::post(self.path("/categories/mappings"));
                request.body = Some(serde_json::json!({
                    "source_type": mapping.source_type,
                    "source_id": mapping.source_id,
                    "raw_category": mapping.raw_category,
                    "canonical_category_id": mapping.canonical_category_id,
                    "is_manual": mapping.is_manual,
                }));
                request
            }
            Operation::AutoMap(source, threshold) => {
                validate_source(source)?;
                let mut request =
                    HttpRequest::post(self.path("/categories/auto-map")).with_source(source);
                request.query.push(("threshold", threshold.to_string()));
                request
            }
            Operation::RawCategories(source) => {
                validate_source(source)?;
                match source.source_type {
                    SourceType::Operator => HttpRequest::get(self.path("/operator/categories")),
                    SourceType::Competitor => HttpRequest::get(
                        self.path(&format!("/competitors/{}/menu", source.source_id)),
                    ),
                }
            }
            Operation::Comparison => HttpRequest::get(self.path("/categories/comparison")),
        };

        Ok(request)
    }
}

fn validate_source(source: &SourceKey) -> Result<(), QueryError> {
    let id = source.source_id.trim();
    if id.is_empty() {
        return Err(QueryError::EmptySourceId);
    }
    if id.contains(['/', '?', '#']) {
        return Err(QueryError::InvalidSourceId(source.source_id.clone()));
    }
    Ok(())
}
