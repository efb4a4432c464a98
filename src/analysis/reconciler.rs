//! Field reconciliation: picks a recommended value per field.
//!
//! Agreeing fields take the agreed value (or the mean, for measured
//! fields). Conflicting fields are resolved by trust-and-recency weighting:
//! a weighted mean for measured fields, a weighted vote otherwise.

use std::collections::HashMap;

use chrono::NaiveDate;

use super::comparator::{Comparison, ComparisonRule};
use crate::config::ReconcileConfig;
use crate::models::{Field, FieldAnalysis, FieldValue, SourceRecord, SourceValue};

/// Per-source weighting inputs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceWeight {
    pub trust: f64,
    pub recency: f64,
    pub authority: bool,
    pub last_updated: Option<NaiveDate>,
}

/// Source metadata used to weight conflicting values.
#[derive(Debug, Clone)]
pub struct SourceWeights {
    weights: HashMap<String, SourceWeight>,
    most_recent: Option<NaiveDate>,
    default_trust: f64,
    authority_boost: f64,
    undated_recency: f64,
}

impl SourceWeights {
    /// Build weights for the records of one run.
    ///
    /// Recency is measured against the newest `last_updated` among the
    /// records, so identical inputs always weigh identically.
    pub fn from_records(records: &[SourceRecord], config: &ReconcileConfig) -> Self {
        let most_recent = records.iter().filter_map(|r| r.last_updated).max();

        let weights = records
            .iter()
            .map(|record| {
                let recency = match (record.last_updated, most_recent) {
                    (Some(updated), Some(newest)) => {
                        let age_days = (newest - updated).num_days().max(0) as f64;
                        0.5f64.powf(age_days / config.recency_half_life_days)
                    }
                    _ => config.undated_recency,
                };

                let weight = SourceWeight {
                    trust: config.trust_for(&record.source),
                    recency,
                    authority: config.is_authority(&record.source),
                    last_updated: record.last_updated,
                };
                (record.source.clone(), weight)
            })
            .collect();

        Self {
            weights,
            most_recent,
            default_trust: config.default_trust,
            authority_boost: config.authority_boost,
            undated_recency: config.undated_recency,
        }
    }

    /// Combined weight of a source for a field.
    pub fn weight(&self, source: &str, field: Field) -> f64 {
        match self.weights.get(source) {
            Some(w) => {
                let boost = if w.authority && field.is_legal_record() {
                    self.authority_boost
                } else {
                    1.0
                };
                w.trust * w.recency * boost
            }
            None => self.default_trust * self.undated_recency,
        }
    }

    pub fn get(&self, source: &str) -> Option<&SourceWeight> {
        self.weights.get(source)
    }

    fn is_most_recent(&self, source: &str) -> bool {
        match (self.get(source).and_then(|w| w.last_updated), self.most_recent) {
            (Some(updated), Some(newest)) => updated == newest,
            _ => false,
        }
    }
}

/// Reconcile one compared field into a `FieldAnalysis`.
///
/// Returns `None` when no source reported a usable value; such fields are
/// reported as missing instead.
pub fn reconcile(
    comparison: &Comparison,
    total_sources: usize,
    weights: &SourceWeights,
    config: &ReconcileConfig,
) -> Option<FieldAnalysis> {
    if comparison.is_missing() {
        return None;
    }

    let analysis = if comparison.conflicts {
        reconcile_conflict(comparison, weights, config)
    } else {
        reconcile_agreement(comparison, total_sources, weights, config)
    };

    Some(analysis)
}

fn reconcile_agreement(
    comparison: &Comparison,
    total_sources: usize,
    weights: &SourceWeights,
    config: &ReconcileConfig,
) -> FieldAnalysis {
    let field = comparison.field;
    let values = &comparison.values;
    let reporting = comparison.reporting();
    let total = total_sources.max(reporting);

    let coverage = reporting as f64 / total as f64;
    let confidence =
        (config.agreement_base + (1.0 - config.agreement_base) * coverage).clamp(0.0, 1.0);

    let (recommended, mut reasoning) = if reporting == 1 {
        let only = &values[0];
        (
            only.value.clone(),
            format!(
                "Only {} reports {}; no cross-check available.",
                only.source,
                field.label().to_lowercase()
            ),
        )
    } else {
        match comparison.rule {
            ComparisonRule::Relative { tolerance } => {
                let average = round_for(field, mean(values));
                let recommended = FieldValue::Numeric(average);
                let reasoning = format!(
                    "{} sources agree within the {:.1}% tolerance (spread {:.1}%); using their average, {}.",
                    reporting,
                    tolerance * 100.0,
                    comparison.relative_spread.unwrap_or(0.0) * 100.0,
                    field.format_value(&recommended)
                );
                (recommended, reasoning)
            }
            ComparisonRule::Step { .. } if comparison.absolute_spread.unwrap_or(0.0) > 0.0 => {
                let tally = weighted_vote(field, values, weights);
                let winner = &tally[0];
                let reasoning = format!(
                    "Sources differ by at most a half bath ({}), within tolerance; using {} as reported by {}.",
                    list_values(field, values),
                    field.format_value(&winner.value),
                    winner.sources.join(", ")
                );
                (winner.value.clone(), reasoning)
            }
            ComparisonRule::Categorical => {
                let recommended = values[0].value.clone();
                let sources: Vec<String> = values.iter().map(|v| v.source.clone()).collect();
                let reasoning = format!(
                    "All {} sources describe the same type ({}): {}.",
                    reporting,
                    sources.join(", "),
                    field.format_value(&recommended)
                );
                (recommended, reasoning)
            }
            _ => {
                let recommended = values[0].value.clone();
                let reasoning = format!(
                    "All {} reporting sources agree on {}.",
                    reporting,
                    field.format_value(&recommended)
                );
                (recommended, reasoning)
            }
        }
    };

    if reporting < total {
        reasoning.push_str(&format!(
            " Reported by {} of {} sources.",
            reporting, total
        ));
    }

    FieldAnalysis {
        field_name: field,
        values: comparison.reported.clone(),
        conflicts: false,
        recommended_value: recommended,
        confidence,
        reasoning,
        spread: comparison.relative_spread,
    }
}

fn reconcile_conflict(
    comparison: &Comparison,
    weights: &SourceWeights,
    config: &ReconcileConfig,
) -> FieldAnalysis {
    let field = comparison.field;
    let values = &comparison.values;
    let floor = config.conflict_confidence_floor;
    let ceiling = config.conflict_confidence_ceiling;

    let (recommended, confidence, decision, backing) = match comparison.rule {
        ComparisonRule::Relative { .. } => {
            let total_weight: f64 = values.iter().map(|v| weights.weight(&v.source, field)).sum();
            let weighted = if total_weight > 0.0 {
                values
                    .iter()
                    .filter_map(|v| v.value.as_f64().map(|n| n * weights.weight(&v.source, field)))
                    .sum::<f64>()
                    / total_weight
            } else {
                mean(values)
            };
            let recommended = FieldValue::Numeric(round_for(field, weighted));
            let spread = comparison.relative_spread.unwrap_or(1.0);
            let confidence = (1.0 - spread).clamp(floor, ceiling);
            let decision = format!(
                "Recommended the trust-and-recency weighted mean, {}.",
                field.format_value(&recommended)
            );
            let backing: Vec<&str> = values.iter().map(|v| v.source.as_str()).collect();
            (recommended, confidence, decision, backing)
        }
        _ => {
            let tally = weighted_vote(field, values, weights);
            let total_weight: f64 = tally.iter().map(|t| t.weight).sum();
            let winner = &tally[0];
            let share = if total_weight > 0.0 {
                winner.weight / total_weight
            } else {
                1.0 / tally.len() as f64
            };
            let spread_penalty = comparison.relative_spread.unwrap_or(0.0).min(1.0);
            let confidence = (share * (1.0 - spread_penalty)).clamp(floor, ceiling);

            let mut decision = format!("Chose {}", field.format_value(&winner.value));
            if winner.sources.len() > 1 {
                decision.push_str(&format!(
                    " on majority agreement ({} of {} sources)",
                    winner.sources.len(),
                    values.len()
                ));
            }
            decision.push('.');
            let backing: Vec<&str> = values
                .iter()
                .filter(|v| winner.sources.contains(&v.source))
                .map(|v| v.source.as_str())
                .collect();
            (winner.value.clone(), confidence, decision, backing)
        }
    };

    let heaviest = heaviest_source(field, &backing, weights);
    let why = weighting_reasons(field, heaviest, weights);

    let disagreement = match comparison.relative_spread {
        Some(spread) if matches!(comparison.rule, ComparisonRule::Relative { .. }) => format!(
            "Sources disagree on {} by {:.1}% ({}).",
            field.label().to_lowercase(),
            spread * 100.0,
            list_values(field, &comparison.reported)
        ),
        _ => format!(
            "Sources disagree on {} ({}).",
            field.label().to_lowercase(),
            list_values(field, &comparison.reported)
        ),
    };

    let weighting = if why.is_empty() {
        format!("{} carried the most weight.", heaviest)
    } else {
        format!("Weighted toward {}: {}.", heaviest, why.join("; "))
    };

    FieldAnalysis {
        field_name: field,
        values: comparison.reported.clone(),
        conflicts: true,
        recommended_value: recommended,
        confidence,
        reasoning: format!("{} {} {}", disagreement, weighting, decision),
        spread: comparison.relative_spread,
    }
}

/// Accumulated vote for one distinct value.
#[derive(Debug, Clone)]
struct Tally {
    value: FieldValue,
    weight: f64,
    sources: Vec<String>,
}

/// Group equal values and sum their weights, heaviest first.
///
/// Ties keep first-seen order, except half-step fields where the larger
/// value wins.
fn weighted_vote(field: Field, values: &[SourceValue], weights: &SourceWeights) -> Vec<Tally> {
    let mut tally: Vec<Tally> = Vec::new();

    for v in values {
        let w = weights.weight(&v.source, field);
        match tally.iter_mut().find(|t| t.value == v.value) {
            Some(existing) => {
                existing.weight += w;
                existing.sources.push(v.source.clone());
            }
            None => tally.push(Tally {
                value: v.value.clone(),
                weight: w,
                sources: vec![v.source.clone()],
            }),
        }
    }

    let prefer_larger = field == Field::Bathrooms;
    // Stable sort keeps first-seen order among equal weights.
    tally.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                if prefer_larger {
                    let x = a.value.as_f64().unwrap_or(0.0);
                    let y = b.value.as_f64().unwrap_or(0.0);
                    y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal)
                } else {
                    std::cmp::Ordering::Equal
                }
            })
    });

    tally
}

fn heaviest_source<'a>(field: Field, sources: &[&'a str], weights: &SourceWeights) -> &'a str {
    let mut best = sources[0];
    let mut best_weight = weights.weight(best, field);
    for &source in &sources[1..] {
        let w = weights.weight(source, field);
        if w > best_weight {
            best = source;
            best_weight = w;
        }
    }
    best
}

/// Explain why a source was weighted heavily.
fn weighting_reasons(field: Field, source: &str, weights: &SourceWeights) -> Vec<String> {
    let mut reasons = Vec::new();
    let Some(w) = weights.get(source) else {
        return reasons;
    };

    if w.authority && field.is_legal_record() {
        reasons.push("public-record authority for legal fields".to_string());
    }
    if weights.is_most_recent(source) {
        if let Some(updated) = w.last_updated {
            reasons.push(format!("most recent record (updated {})", updated));
        }
    }
    if w.trust > weights.default_trust {
        reasons.push(format!("higher configured trust ({:.1})", w.trust));
    }

    reasons
}

fn mean(values: &[SourceValue]) -> f64 {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.value.as_f64()).collect();
    if numbers.is_empty() {
        0.0
    } else {
        numbers.iter().sum::<f64>() / numbers.len() as f64
    }
}

/// Round a derived value to the precision the field is reported in.
fn round_for(field: Field, value: f64) -> f64 {
    match field {
        Field::Bathrooms => (value * 2.0).round() / 2.0,
        _ => value.round(),
    }
}

fn list_values(field: Field, values: &[SourceValue]) -> String {
    values
        .iter()
        .map(|v| format!("{}: {}", v.source, field.format_value(&v.value)))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::comparator::compare;

    fn record(source: &str, updated: Option<&str>) -> SourceRecord {
        let mut r = SourceRecord::new(source);
        r.last_updated = updated.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap());
        r
    }

    fn sample_records() -> Vec<SourceRecord> {
        vec![
            record("Zillow", Some("2024-01-15")),
            record("Redfin", Some("2024-01-20")),
            record("Public Records", None),
        ]
    }

    fn run(
        field: Field,
        raw: &[(&str, Option<FieldValue>)],
        records: &[SourceRecord],
    ) -> Option<FieldAnalysis> {
        let config = ReconcileConfig::default();
        let values: Vec<(String, Option<FieldValue>)> =
            raw.iter().map(|(s, v)| (s.to_string(), v.clone())).collect();
        let cmp = compare(field, &values, ComparisonRule::for_field(field, &config));
        let weights = SourceWeights::from_records(records, &config);
        reconcile(&cmp, records.len(), &weights, &config)
    }

    fn num(n: f64) -> Option<FieldValue> {
        Some(FieldValue::Numeric(n))
    }

    #[test]
    fn test_recency_weights() {
        let config = ReconcileConfig::default();
        let weights = SourceWeights::from_records(&sample_records(), &config);

        assert_eq!(weights.get("Redfin").unwrap().recency, 1.0);
        let zillow = weights.get("Zillow").unwrap().recency;
        assert!(zillow < 1.0 && zillow > 0.9);
        assert_eq!(weights.get("Public Records").unwrap().recency, 0.5);
        assert_eq!(weights.weight("Public Records", Field::YearBuilt), 1.0);
        assert_eq!(weights.weight("Public Records", Field::Price), 0.5);
    }

    #[test]
    fn test_conflicting_price_weighted_mean() {
        let fa = run(
            Field::Price,
            &[
                ("Zillow", num(1_250_000.0)),
                ("Redfin", num(1_295_000.0)),
                ("Public Records", num(1_180_000.0)),
            ],
            &sample_records(),
        )
        .unwrap();

        assert!(fa.conflicts);
        let price = fa.recommended_value.as_f64().unwrap();
        // Pulled toward the recent listings, away from the assessment.
        assert!(price > 1_241_666.0 && price < 1_295_000.0);
        assert!(fa.confidence >= 0.2 && fa.confidence <= 0.9);
        assert!(fa.reasoning.contains("Weighted toward Redfin"));
        assert!(fa.reasoning.contains("most recent record (updated 2024-01-20)"));
    }

    #[test]
    fn test_agreement_uses_mean_for_measured_fields() {
        let fa = run(
            Field::SquareFeet,
            &[
                ("Zillow", num(1800.0)),
                ("Redfin", num(1850.0)),
                ("Public Records", num(1822.0)),
            ],
            &sample_records(),
        )
        .unwrap();

        assert!(!fa.conflicts);
        assert_eq!(fa.recommended_value, FieldValue::Numeric(1824.0));
        assert!((fa.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_coverage_penalty() {
        let fa = run(
            Field::Bedrooms,
            &[("Zillow", num(3.0)), ("Redfin", num(3.0)), ("Public Records", None)],
            &sample_records(),
        )
        .unwrap();

        assert!(!fa.conflicts);
        assert!((fa.confidence - (0.7 + 0.3 * 2.0 / 3.0)).abs() < 1e-9);
        assert!(fa.reasoning.contains("Reported by 2 of 3 sources"));
    }

    #[test]
    fn test_bedrooms_majority_vote() {
        let records = vec![
            record("Zillow", Some("2024-01-10")),
            record("Redfin", Some("2024-01-19")),
            record("Public Records", None),
        ];
        let fa = run(
            Field::Bedrooms,
            &[("Zillow", num(5.0)), ("Redfin", num(4.0)), ("Public Records", num(4.0))],
            &records,
        )
        .unwrap();

        assert!(fa.conflicts);
        assert_eq!(fa.recommended_value, FieldValue::Numeric(4.0));
        assert!(fa.reasoning.contains("majority agreement (2 of 3 sources)"));
        assert!(fa.confidence < 0.9);
    }

    #[test]
    fn test_year_built_public_record_authority() {
        let records = vec![
            record("Zillow", Some("2023-11-20")),
            record("Redfin", Some("2024-01-14")),
            record("Public Records", None),
        ];
        let fa = run(
            Field::YearBuilt,
            &[("Zillow", num(1925.0)), ("Redfin", num(1924.0)), ("Public Records", num(1925.0))],
            &records,
        )
        .unwrap();

        assert_eq!(fa.recommended_value, FieldValue::Numeric(1925.0));
        assert!(fa.reasoning.contains("public-record authority"));
    }

    #[test]
    fn test_bathrooms_half_step_prefers_heavier_then_larger() {
        let records = vec![record("Zillow", Some("2024-01-18")), record("Public Records", None)];
        let fa = run(
            Field::Bathrooms,
            &[("Zillow", num(2.5)), ("Public Records", num(2.0))],
            &records,
        )
        .unwrap();

        assert!(!fa.conflicts);
        assert_eq!(fa.recommended_value, FieldValue::Numeric(2.5));
    }

    #[test]
    fn test_single_reporter() {
        let fa = run(
            Field::LotSize,
            &[("Zillow", None), ("Redfin", num(5000.0)), ("Public Records", None)],
            &sample_records(),
        )
        .unwrap();

        assert!(!fa.conflicts);
        assert_eq!(fa.recommended_value, FieldValue::Numeric(5000.0));
        assert!(fa.reasoning.starts_with("Only Redfin reports lot size"));
        assert!((fa.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_all_missing_yields_none() {
        let fa = run(
            Field::LotSize,
            &[("Zillow", None), ("Redfin", None), ("Public Records", None)],
            &sample_records(),
        );
        assert!(fa.is_none());
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let raw = [
            ("Zillow", Some(FieldValue::Categorical("Single Family".into()))),
            ("Redfin", Some(FieldValue::Categorical("Single Family Residential".into()))),
            ("Public Records", Some(FieldValue::Categorical("Residential".into()))),
        ];
        let a = run(Field::PropertyType, &raw, &sample_records());
        let b = run(Field::PropertyType, &raw, &sample_records());
        assert_eq!(a, b);
        let fa = a.unwrap();
        assert!(fa.conflicts);
        assert_eq!(
            fa.recommended_value,
            FieldValue::Categorical("Single Family".to_string())
        );
    }

    #[test]
    fn test_reported_labels_survive_canonical_recommendation() {
        let raw = [
            ("Zillow", Some(FieldValue::Categorical(" Condo ".into()))),
            ("Redfin", Some(FieldValue::Categorical("Condominium".into()))),
            ("Public Records", Some(FieldValue::Categorical("Townhouse".into()))),
        ];
        let fa = run(Field::PropertyType, &raw, &sample_records()).unwrap();

        assert!(fa.conflicts);
        assert_eq!(
            fa.recommended_value,
            FieldValue::Categorical("Condominium".to_string())
        );
        let shown: Vec<String> = fa
            .values
            .iter()
            .map(|v| format!("{}={}", v.source, Field::PropertyType.format_value(&v.value)))
            .collect();
        assert_eq!(
            shown,
            vec!["Zillow=Condo", "Redfin=Condominium", "Public Records=Townhouse"]
        );
        assert!(fa.reasoning.contains("Zillow: Condo;"));
    }
}
