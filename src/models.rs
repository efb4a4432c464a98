//! Data models for property reconciliation.
//!
//! This module contains the core data structures shared by the
//! reconciliation engine, the orchestrator, and the report generator:
//! per-source records, per-field analyses, and the final analysis.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A property attribute tracked and compared across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Price,
    Bedrooms,
    Bathrooms,
    SquareFeet,
    YearBuilt,
    LotSize,
    PropertyType,
}

/// How values of a field are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Measured quantity; conflicts beyond a relative tolerance.
    Measured,
    /// Counted or recorded value; any difference conflicts.
    Exact,
    /// Half-step quantity (bathrooms); tolerates a half-bath difference.
    HalfStep,
    /// Free-form label normalized through a synonym table.
    Categorical,
}

impl Field {
    /// Every tracked field, in reporting order.
    pub const ALL: [Field; 7] = [
        Field::Price,
        Field::Bedrooms,
        Field::Bathrooms,
        Field::SquareFeet,
        Field::YearBuilt,
        Field::LotSize,
        Field::PropertyType,
    ];

    /// Snake-case name, as used in config keys and JSON.
    pub fn name(&self) -> &'static str {
        match self {
            Field::Price => "price",
            Field::Bedrooms => "bedrooms",
            Field::Bathrooms => "bathrooms",
            Field::SquareFeet => "square_feet",
            Field::YearBuilt => "year_built",
            Field::LotSize => "lot_size",
            Field::PropertyType => "property_type",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Field::Price => "Price",
            Field::Bedrooms => "Bedrooms",
            Field::Bathrooms => "Bathrooms",
            Field::SquareFeet => "Square feet",
            Field::YearBuilt => "Year built",
            Field::LotSize => "Lot size",
            Field::PropertyType => "Property type",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Price | Field::SquareFeet | Field::LotSize => FieldKind::Measured,
            Field::Bedrooms | Field::YearBuilt => FieldKind::Exact,
            Field::Bathrooms => FieldKind::HalfStep,
            Field::PropertyType => FieldKind::Categorical,
        }
    }

    /// Fields whose authoritative value lives in legal/public records.
    pub fn is_legal_record(&self) -> bool {
        matches!(self, Field::YearBuilt | Field::LotSize)
    }

    /// Parse a snake-case field name.
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Format a value of this field for display.
    pub fn format_value(&self, value: &FieldValue) -> String {
        match (self, value) {
            (Field::Price, FieldValue::Numeric(n)) => format!("${}", group_thousands(*n)),
            (Field::SquareFeet, FieldValue::Numeric(n)) => {
                format!("{} sqft", group_thousands(*n))
            }
            (Field::LotSize, FieldValue::Numeric(n)) => format!("{} sqft", group_thousands(*n)),
            (Field::Bathrooms, FieldValue::Numeric(n)) => format_half_step(*n),
            (_, FieldValue::Numeric(n)) => format!("{}", n.round() as i64),
            (_, FieldValue::Categorical(s)) => s.clone(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Format a whole number with thousands separators (1250000 -> "1,250,000").
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    if rounded < 0 {
        format!("-{}", out)
    } else {
        out
    }
}

fn format_half_step(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Categorical(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(n) => Some(*n),
            FieldValue::Categorical(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Numeric(_) => None,
            FieldValue::Categorical(s) => Some(s),
        }
    }
}

/// One source's value for a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValue {
    pub source: String,
    pub value: FieldValue,
}

/// One source's view of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Provider name (e.g. "Zillow").
    pub source: String,
    pub price: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    pub year_built: Option<i32>,
    pub lot_size: Option<f64>,
    pub property_type: Option<String>,
    pub description: Option<String>,
    pub last_updated: Option<NaiveDate>,
    /// Provider payload as received.
    #[serde(default)]
    pub raw_data: serde_json::Value,
}

impl SourceRecord {
    /// Creates an empty record for a source.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            price: None,
            bedrooms: None,
            bathrooms: None,
            square_feet: None,
            year_built: None,
            lot_size: None,
            property_type: None,
            description: None,
            last_updated: None,
            raw_data: serde_json::Value::Null,
        }
    }

    /// Returns this record's value for a tracked field, if reported.
    pub fn value_of(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::Price => self.price.map(FieldValue::Numeric),
            Field::Bedrooms => self.bedrooms.map(|b| FieldValue::Numeric(b as f64)),
            Field::Bathrooms => self.bathrooms.map(FieldValue::Numeric),
            Field::SquareFeet => self.square_feet.map(FieldValue::Numeric),
            Field::YearBuilt => self.year_built.map(|y| FieldValue::Numeric(y as f64)),
            Field::LotSize => self.lot_size.map(FieldValue::Numeric),
            Field::PropertyType => self
                .property_type
                .as_ref()
                .map(|t| FieldValue::Categorical(t.clone())),
        }
    }
}

/// Reconciliation outcome for a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAnalysis {
    pub field_name: Field,
    /// Values as reported, in source order (missing values excluded).
    pub values: Vec<SourceValue>,
    pub conflicts: bool,
    pub recommended_value: FieldValue,
    /// Confidence in the recommended value, in [0, 1].
    pub confidence: f64,
    pub reasoning: String,
    /// Relative spread `(max - min) / min` for numeric fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

/// Aggregate reconciliation result for one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub field_analyses: Vec<FieldAnalysis>,
    pub overall_confidence: f64,
    /// Tracked fields absent from every source.
    pub missing_fields: Vec<Field>,
    pub conflict_summary: String,
}

impl ConflictResolution {
    /// Returns the analysis for a field, if any source reported it.
    pub fn get(&self, field: Field) -> Option<&FieldAnalysis> {
        self.field_analyses.iter().find(|fa| fa.field_name == field)
    }

    /// Fields whose sources disagree beyond tolerance.
    pub fn conflicting_fields(&self) -> Vec<Field> {
        self.field_analyses
            .iter()
            .filter(|fa| fa.conflicts)
            .map(|fa| fa.field_name)
            .collect()
    }
}

/// Unified view of a property.
///
/// Absent core fields mean "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySummary {
    pub price: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    pub year_built: Option<i32>,
    pub lot_size: Option<f64>,
    pub property_type: Option<String>,
    pub key_features: Vec<String>,
    pub condition: Option<String>,
    pub highlights: Vec<String>,
    pub concerns: Vec<String>,
}

/// The complete result of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyAnalysis {
    /// Catalog id; `None` for raw-input analyses.
    pub property_id: Option<String>,
    pub address: String,
    pub data_sources: Vec<SourceRecord>,
    pub conflict_resolution: ConflictResolution,
    pub property_summary: PropertySummary,
    /// Narrative analysis; `None` when the narrative generator was unavailable.
    pub analysis: Option<String>,
    pub insights: Vec<String>,
    /// Mirrors `conflict_resolution.overall_confidence`.
    pub confidence_score: f64,
    pub generated_at: DateTime<Utc>,
}

/// Single-source input for raw-input analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyInput {
    pub address: Option<String>,
    pub price: Option<f64>,
    pub bedrooms: Option<u32>,
    pub bathrooms: Option<f64>,
    pub square_feet: Option<f64>,
    pub year_built: Option<i32>,
    pub description: Option<String>,
}

impl PropertyInput {
    /// Number of input fields that can be populated.
    pub const FIELD_COUNT: usize = 7;

    /// Number of populated input fields (blank strings do not count).
    pub fn populated_count(&self) -> usize {
        let text = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());

        [
            text(&self.address),
            self.price.is_some(),
            self.bedrooms.is_some(),
            self.bathrooms.is_some(),
            self.square_feet.is_some(),
            self.year_built.is_some(),
            text(&self.description),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count()
    }
}

/// A property listing returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySearchResult {
    pub id: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Service health as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub dependency_available: bool,
}

impl HealthStatus {
    pub fn from_availability(dependency_available: bool) -> Self {
        Self {
            status: if dependency_available {
                "healthy".to_string()
            } else {
                "degraded".to_string()
            },
            dependency_available,
        }
    }
}
