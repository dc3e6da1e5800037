//! Core domain model for menuscope category reconciliation.
//!
//! This crate defines the types exchanged with the pricing backend:
//! - `SourceType` / `SourceKey`: whose menu a raw category came from
//! - `CanonicalCategory`: the normalized taxonomy entry
//! - `CategoryMapping`: a persisted raw -> canonical binding
//! - `CategorySuggestion`: a transient AI recommendation
//! - `Threshold`: a validated confidence cut-off for auto-mapping

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors from parsing model values supplied by users.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("Unknown source type: {0} (expected operator or competitor)")]
    UnknownSourceType(String),

    #[error("Threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Auto-map threshold must be at least {floor}, got {value}")]
    BelowAutoMapFloor { value: f64, floor: f64 },
}

/// Which kind of menu a raw category belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// The restaurant operator's own menu
    Operator,
    /// A tracked competitor's menu
    Competitor,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Competitor => "competitor",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "operator" => Ok(Self::Operator),
            "competitor" => Ok(Self::Competitor),
            other => Err(ModelError::UnknownSourceType(other.to_string())),
        }
    }
}

/// Identifies one menu source: `(source_type, source_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub source_type: SourceType,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
        }
    }

    pub fn operator(source_id: impl Into<String>) -> Self {
        Self::new(SourceType::Operator, source_id)
    }

    pub fn competitor(source_id: impl Into<String>) -> Self {
        Self::new(SourceType::Competitor, source_id)
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source_type, self.source_id)
    }
}

/// A normalized category that many raw categories can map onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCategory {
    pub id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Comma-separated keywords used by the backend matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
}

impl CanonicalCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            keywords: None,
        }
    }

    /// Keywords split into trimmed, non-empty entries.
    pub fn keyword_list(&self) -> Vec<&str> {
        self.keywords
            .as_deref()
            .map(|k| {
                k.split(',')
                    .map(str::trim)
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A persisted binding of one raw category of one source to a canonical category.
///
/// The backend keeps at most one mapping per `(source_type, source_id, raw_category)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub id: String,

    pub source_type: SourceType,

    pub source_id: String,

    pub raw_category: String,

    pub canonical_category_id: String,

    /// Present when the mapping came from an automatic suggestion
    #[serde(
        default,
        deserialize_with = "decimal::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence_score: Option<f64>,

    #[serde(default)]
    pub is_manual: bool,

    /// Expanded canonical category, when the backend includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_category: Option<CanonicalCategory>,
}

impl CategoryMapping {
    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(self.source_type, self.source_id.clone())
    }
}

/// A lower-ranked candidate attached to a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionAlternative {
    pub id: String,
    pub name: String,
    pub score: f64,
}

/// An AI recommendation for an unmapped raw category. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    pub raw_category: String,

    pub canonical_category_id: String,

    pub canonical_category_name: String,

    /// Confidence in [0, 1]
    pub confidence_score: f64,

    /// Ranked alternatives, best first
    #[serde(default)]
    pub alternatives: Vec<SuggestionAlternative>,
}

/// Request body for creating or updating a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMapping {
    pub source_type: SourceType,
    pub source_id: String,
    pub raw_category: String,
    pub canonical_category_id: String,
    pub is_manual: bool,
}

impl NewMapping {
    pub fn new(
        source: &SourceKey,
        raw_category: impl Into<String>,
        canonical_category_id: impl Into<String>,
        is_manual: bool,
    ) -> Self {
        Self {
            source_type: source.source_type,
            source_id: source.source_id.clone(),
            raw_category: raw_category.into(),
            canonical_category_id: canonical_category_id.into(),
            is_manual,
        }
    }

    pub fn source_key(&self) -> SourceKey {
        SourceKey::new(self.source_type, self.source_id.clone())
    }
}

/// Result of a bulk auto-map request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoMapOutcome {
    /// Number of mappings created
    pub mapped: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Minimum confidence a suggestion needs to be auto-accepted. Inclusive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Threshold(f64);

impl Threshold {
    /// Cut-off used by the dashboard's "Auto-Map All" action.
    pub const AUTO_MAP_DEFAULT: f64 = 0.75;

    pub fn new(value: f64) -> Result<Self, ModelError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ModelError::ThresholdOutOfRange(value))
        }
    }

    /// Lowest threshold the backend's auto-map endpoint accepts.
    pub const AUTO_MAP_FLOOR: f64 = 0.3;

    pub fn value(self) -> f64 {
        self.0
    }

    /// Reject thresholds the auto-map endpoint would refuse.
    pub fn for_auto_map(self) -> Result<Self, ModelError> {
        if self.0 < Self::AUTO_MAP_FLOOR {
            return Err(ModelError::BelowAutoMapFloor {
                value: self.0,
                floor: Self::AUTO_MAP_FLOOR,
            });
        }
        Ok(self)
    }

    /// Whether a confidence score clears this threshold.
    pub fn admits(self, score: f64) -> bool {
        score >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self(Self::AUTO_MAP_DEFAULT)
    }
}

impl TryFrom<f64> for Threshold {
    type Error = ModelError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Threshold> for f64 {
    fn from(t: Threshold) -> Self {
        t.0
    }
}

impl FromStr for Threshold {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f64 = s
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidThreshold(s.to_string()))?;
        Self::new(value)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A menu item as returned by the competitor menu endpoint.
///
/// Only the fields needed to derive raw categories are modelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Operator vs market pricing for one canonical category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonItem {
    pub canonical_category_id: String,

    pub canonical_category_name: String,

    #[serde(default, deserialize_with = "decimal::option")]
    pub operator_avg: Option<f64>,

    #[serde(default)]
    pub operator_items: u32,

    #[serde(default, deserialize_with = "decimal::option")]
    pub market_avg: Option<f64>,

    #[serde(default)]
    pub market_items: u32,

    /// Percent difference of operator average vs market average
    #[serde(default, deserialize_with = "decimal::option")]
    pub delta_pct: Option<f64>,
}

/// Semantic category comparison across operator and competitors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryComparison {
    #[serde(default)]
    pub comparisons: Vec<ComparisonItem>,

    #[serde(default)]
    pub unmapped_operator_categories: Vec<String>,

    #[serde(default)]
    pub unmapped_competitor_categories: Vec<String>,
}

/// The backend serializes decimal columns as strings; accept either form.
mod decimal {
    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    pub fn option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(n)) => Ok(Some(n)),
            Some(NumberOrString::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| de::Error::custom(format!("not a decimal: {s:?}"))),
        }
    }
}
