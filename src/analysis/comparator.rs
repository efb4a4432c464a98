//! Field comparison: decides whether sources disagree on a field.
//!
//! Missing and malformed values are dropped before comparison. Numeric
//! fields are compared by spread against a per-field rule, categorical
//! fields after case-folding and synonym mapping.

use crate::config::ReconcileConfig;
use crate::models::{Field, FieldKind, FieldValue, SourceValue};
use tracing::debug;

/// Tolerance slack for float comparisons at the boundary.
const EPSILON: f64 = 1e-9;

/// How a field's values are judged to conflict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonRule {
    /// Conflict iff `(max - min) / min` exceeds the tolerance.
    Relative { tolerance: f64 },
    /// Conflict iff any two values differ.
    Exact,
    /// Conflict iff `max - min` exceeds the step.
    Step { max_spread: f64 },
    /// Conflict iff normalized labels differ.
    Categorical,
}

impl ComparisonRule {
    /// The configured rule for a field.
    pub fn for_field(field: Field, config: &ReconcileConfig) -> Self {
        match (field, field.kind()) {
            (Field::Price, _) => ComparisonRule::Relative {
                tolerance: config.price_tolerance,
            },
            (Field::SquareFeet, _) => ComparisonRule::Relative {
                tolerance: config.square_feet_tolerance,
            },
            (Field::LotSize, _) => ComparisonRule::Relative {
                tolerance: config.lot_size_tolerance,
            },
            (_, FieldKind::HalfStep) => ComparisonRule::Step {
                max_spread: config.bathrooms_step,
            },
            (_, FieldKind::Categorical) => ComparisonRule::Categorical,
            (_, FieldKind::Exact) | (_, FieldKind::Measured) => ComparisonRule::Exact,
        }
    }
}

/// Result of comparing one field across sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: Field,
    pub rule: ComparisonRule,
    pub conflicts: bool,
    /// Normalized values in source order, missing values excluded.
    pub values: Vec<SourceValue>,
    /// The same values as reported, aligned with `values`. Labels keep the
    /// source's wording; numbers are unchanged.
    pub reported: Vec<SourceValue>,
    /// `(max - min) / min` for numeric fields with a positive minimum.
    pub relative_spread: Option<f64>,
    /// `max - min` for numeric fields.
    pub absolute_spread: Option<f64>,
}

impl Comparison {
    /// Number of sources that reported a usable value.
    pub fn reporting(&self) -> usize {
        self.values.len()
    }

    pub fn is_missing(&self) -> bool {
        self.values.is_empty()
    }
}

/// Compare a field's values across sources.
///
/// `values` pairs each source name with its (possibly absent) raw value,
/// in source order.
pub fn compare(
    field: Field,
    values: &[(String, Option<FieldValue>)],
    rule: ComparisonRule,
) -> Comparison {
    let (values, reported): (Vec<SourceValue>, Vec<SourceValue>) = values
        .iter()
        .filter_map(|(source, value)| {
            let value = value.as_ref()?;
            match normalize(field, value) {
                Some(normalized) => Some((
                    SourceValue {
                        source: source.clone(),
                        value: normalized,
                    },
                    SourceValue {
                        source: source.clone(),
                        value: as_reported(value),
                    },
                )),
                None => {
                    debug!(
                        "Treating malformed {} from {} as missing: {:?}",
                        field, source, value
                    );
                    None
                }
            }
        })
        .unzip();

    let numbers: Vec<f64> = values.iter().filter_map(|v| v.value.as_f64()).collect();
    let (min, max) = numbers.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), n| {
        (lo.min(*n), hi.max(*n))
    });

    let (absolute_spread, relative_spread) = if numbers.is_empty() {
        (None, None)
    } else {
        let absolute = max - min;
        let relative = if min > 0.0 { Some(absolute / min) } else { None };
        (Some(absolute), relative)
    };

    let conflicts = values.len() > 1
        && match rule {
            ComparisonRule::Relative { tolerance } => match relative_spread {
                Some(spread) => spread > tolerance + EPSILON,
                // Non-positive values never survive normalization for measured fields.
                None => absolute_spread.unwrap_or(0.0) > 0.0,
            },
            ComparisonRule::Exact => absolute_spread.unwrap_or(0.0) > EPSILON,
            ComparisonRule::Step { max_spread } => {
                absolute_spread.unwrap_or(0.0) > max_spread + EPSILON
            }
            ComparisonRule::Categorical => {
                let first = values[0].value.as_str();
                values.iter().any(|v| v.value.as_str() != first)
            }
        };

    Comparison {
        field,
        rule,
        conflicts,
        values,
        reported,
        relative_spread,
        absolute_spread,
    }
}

/// Normalize a raw value, returning `None` when it is unusable.
fn normalize(field: Field, value: &FieldValue) -> Option<FieldValue> {
    match (field.kind(), value) {
        (FieldKind::Categorical, FieldValue::Categorical(label)) => {
            canonical_property_type(label).map(FieldValue::Categorical)
        }
        (FieldKind::Categorical, FieldValue::Numeric(_)) => None,
        (_, FieldValue::Categorical(_)) => None,
        (kind, FieldValue::Numeric(n)) => {
            if !n.is_finite() || *n < 0.0 {
                return None;
            }
            // Zero price, area or build year is a placeholder, not a measurement.
            if *n == 0.0 && (kind == FieldKind::Measured || field == Field::YearBuilt) {
                return None;
            }
            Some(FieldValue::Numeric(*n))
        }
    }
}

fn as_reported(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::Categorical(label) => FieldValue::Categorical(label.trim().to_string()),
        other => other.clone(),
    }
}

/// Case-fold and map a property type label onto its canonical name.
///
/// Returns `None` for blank labels.
pub fn canonical_property_type(label: &str) -> Option<String> {
    let folded = label
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    if folded.is_empty() {
        return None;
    }

    let canonical = match folded.as_str() {
        "condo" | "condominium" | "condo unit" => "Condominium",
        "single family" | "single family residential" | "single family home"
        | "single family residence" | "sfr" | "house" => "Single Family",
        "townhouse" | "townhome" | "town house" => "Townhouse",
        "multi family" | "multifamily" | "duplex" | "triplex" | "fourplex" => "Multi Family",
        "co op" | "coop" | "cooperative" => "Co-op",
        "mobile home" | "manufactured" | "manufactured home" => "Manufactured",
        "land" | "lot" | "vacant land" => "Land",
        _ => return Some(title_case(&folded)),
    };

    Some(canonical.to_string())
}

fn title_case(folded: &str) -> String {
    folded
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn numeric(values: &[(&str, Option<f64>)]) -> Vec<(String, Option<FieldValue>)> {
        values
            .iter()
            .map(|(s, v)| (s.to_string(), v.map(FieldValue::Numeric)))
            .collect()
    }

    fn labels(values: &[(&str, &str)]) -> Vec<(String, Option<FieldValue>)> {
        values
            .iter()
            .map(|(s, v)| (s.to_string(), Some(FieldValue::Categorical(v.to_string()))))
            .collect()
    }

    fn rule(field: Field) -> ComparisonRule {
        ComparisonRule::for_field(field, &ReconcileConfig::default())
    }

    #[test]
    fn test_sample_price_conflicts() {
        let values = numeric(&[
            ("Zillow", Some(1_250_000.0)),
            ("Redfin", Some(1_295_000.0)),
            ("Public Records", Some(1_180_000.0)),
        ]);
        let cmp = compare(Field::Price, &values, rule(Field::Price));

        assert!(cmp.conflicts);
        let spread = cmp.relative_spread.unwrap();
        assert!(spread > 0.05 && spread < 0.10);
        assert_eq!(cmp.reporting(), 3);
    }

    #[test]
    fn test_sample_bedrooms_agree() {
        let values = numeric(&[
            ("Zillow", Some(3.0)),
            ("Redfin", Some(3.0)),
            ("Public Records", Some(3.0)),
        ]);
        let cmp = compare(Field::Bedrooms, &values, rule(Field::Bedrooms));
        assert!(!cmp.conflicts);
        assert_eq!(cmp.absolute_spread, Some(0.0));
    }

    #[test]
    fn test_sample_property_type_synonyms_agree() {
        let values = labels(&[
            ("Zillow", "Condo"),
            ("Redfin", "Condominium"),
            ("Public Records", "Condominium"),
        ]);
        let cmp = compare(Field::PropertyType, &values, rule(Field::PropertyType));

        assert!(!cmp.conflicts);
        assert!(cmp
            .values
            .iter()
            .all(|v| v.value == FieldValue::Categorical("Condominium".to_string())));
        assert_eq!(
            cmp.reported[0].value,
            FieldValue::Categorical("Condo".to_string())
        );
        assert_eq!(cmp.reported.len(), cmp.values.len());
    }

    #[test]
    fn test_square_feet_within_tolerance() {
        let values = numeric(&[
            ("Zillow", Some(1800.0)),
            ("Redfin", Some(1850.0)),
            ("Public Records", Some(1822.0)),
        ]);
        let cmp = compare(Field::SquareFeet, &values, rule(Field::SquareFeet));
        assert!(!cmp.conflicts);
    }

    #[test]
    fn test_bathrooms_half_step_tolerated() {
        let values = numeric(&[("Zillow", Some(2.5)), ("Public Records", Some(2.0))]);
        assert!(!compare(Field::Bathrooms, &values, rule(Field::Bathrooms)).conflicts);

        let values = numeric(&[("Zillow", Some(3.5)), ("Public Records", Some(2.5))]);
        assert!(compare(Field::Bathrooms, &values, rule(Field::Bathrooms)).conflicts);
    }

    #[test]
    fn test_year_built_exact() {
        let values = numeric(&[("Zillow", Some(1925.0)), ("Redfin", Some(1924.0))]);
        assert!(compare(Field::YearBuilt, &values, rule(Field::YearBuilt)).conflicts);
    }

    #[test]
    fn test_single_reporter_never_conflicts() {
        let values = numeric(&[("Zillow", Some(1_250_000.0)), ("Redfin", None)]);
        let cmp = compare(Field::Price, &values, rule(Field::Price));
        assert!(!cmp.conflicts);
        assert!(!cmp.is_missing());
        assert_eq!(cmp.reporting(), 1);
    }

    #[test]
    fn test_all_missing() {
        let values = numeric(&[("Zillow", None), ("Redfin", None)]);
        let cmp = compare(Field::LotSize, &values, rule(Field::LotSize));
        assert!(cmp.is_missing());
        assert!(!cmp.conflicts);
        assert_eq!(cmp.relative_spread, None);
    }

    #[test]
    fn test_malformed_values_treated_as_missing() {
        let values = vec![
            ("Zillow".to_string(), Some(FieldValue::Numeric(f64::NAN))),
            ("Redfin".to_string(), Some(FieldValue::Categorical("lots".to_string()))),
            ("Other".to_string(), Some(FieldValue::Numeric(-5.0))),
            ("Public Records".to_string(), Some(FieldValue::Numeric(0.0))),
        ];
        let cmp = compare(Field::Price, &values, rule(Field::Price));
        assert!(cmp.is_missing());
    }

    #[test]
    fn test_canonical_property_type() {
        assert_eq!(canonical_property_type("CONDO").as_deref(), Some("Condominium"));
        assert_eq!(
            canonical_property_type("Single-Family Residential").as_deref(),
            Some("Single Family")
        );
        assert_eq!(canonical_property_type(" victorian ").as_deref(), Some("Victorian"));
        assert_eq!(canonical_property_type("   "), None);
    }

    proptest! {
        #[test]
        fn relative_conflict_iff_spread_exceeds_tolerance(
            prices in prop::collection::vec(100_000.0f64..3_000_000.0, 1..6),
        ) {
            let values: Vec<(String, Option<FieldValue>)> = prices
                .iter()
                .enumerate()
                .map(|(i, p)| (format!("source{}", i), Some(FieldValue::Numeric(*p))))
                .collect();
            let cmp = compare(Field::Price, &values, rule(Field::Price));

            let min = prices.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = prices.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let expected = prices.len() > 1 && (max - min) / min > 0.05 + EPSILON;
            prop_assert_eq!(cmp.conflicts, expected);
        }

        #[test]
        fn exact_conflict_iff_any_differ(beds in prop::collection::vec(0u32..7, 1..6)) {
            let values: Vec<(String, Option<FieldValue>)> = beds
                .iter()
                .enumerate()
                .map(|(i, b)| (format!("source{}", i), Some(FieldValue::Numeric(*b as f64))))
                .collect();
            let cmp = compare(Field::Bedrooms, &values, rule(Field::Bedrooms));
            let expected = beds.iter().any(|b| *b != beds[0]);
            prop_assert_eq!(cmp.conflicts, expected);
        }

        #[test]
        fn step_conflict_iff_spread_exceeds_half(halves in prop::collection::vec(2u32..12, 1..6)) {
            let baths: Vec<f64> = halves.iter().map(|h| *h as f64 / 2.0).collect();
            let values: Vec<(String, Option<FieldValue>)> = baths
                .iter()
                .enumerate()
                .map(|(i, b)| (format!("source{}", i), Some(FieldValue::Numeric(*b))))
                .collect();
            let cmp = compare(Field::Bathrooms, &values, rule(Field::Bathrooms));

            let min = baths.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = baths.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(cmp.conflicts, max - min > 0.5);
        }

        #[test]
        fn categorical_conflict_iff_canonical_labels_differ(
            picks in prop::collection::vec(0usize..5, 1..6),
        ) {
            let pool = ["Condo", "condominium", "Townhome", "townhouse", "Victorian"];
            let values: Vec<(String, Option<FieldValue>)> = picks
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let label = FieldValue::Categorical(pool[*p].to_string());
                    (format!("source{}", i), Some(label))
                })
                .collect();
            let cmp = compare(Field::PropertyType, &values, rule(Field::PropertyType));

            let canon: Vec<Option<String>> =
                picks.iter().map(|p| canonical_property_type(pool[*p])).collect();
            prop_assert_eq!(cmp.conflicts, canon.iter().any(|c| *c != canon[0]));
        }
    }
}
