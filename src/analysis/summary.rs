//! Summary building and overall confidence.
//!
//! This module aggregates reconciled fields into a `PropertySummary`
//! and computes the overall confidence score.

use crate::config::{ReconcileConfig, SummaryConfig};
use crate::models::{group_thousands, Field, FieldAnalysis, FieldKind, FieldValue, PropertySummary};

/// Description phrases recognised as features, with their display label.
const FEATURE_PHRASES: &[(&[&str], &str)] = &[
    (&["renovated", "modern updates"], "Renovated"),
    (&["updated kitchen", "renovated kitchen"], "Updated kitchen"),
    (&["stainless steel"], "Stainless steel appliances"),
    (&["in-unit laundry"], "In-unit laundry"),
    (&["solar"], "Solar panels"),
    (&["energy efficient"], "Energy efficient"),
    (&["hardwood"], "Hardwood floors"),
    (&["open floor plan", "open concept"], "Open floor plan"),
    (&["high ceilings"], "High ceilings"),
    (&["gym"], "Fitness facilities"),
    (&["rooftop"], "Rooftop deck"),
    (&["garage"], "Garage parking"),
    (&["backyard"], "Backyard"),
    (&["schools"], "Near well-rated schools"),
    (&["bart", "public transportation", "transit"], "Transit access"),
    (
        &["crown molding", "built-ins", "original details", "period details"],
        "Preserved period details",
    ),
];

const RENOVATION_PHRASES: &[&str] = &["renovated", "updated", "modern updates", "remodeled"];

/// Overall confidence from field confidences and missing fields.
///
/// Importance-weighted mean over every tracked field, where a missing
/// field counts with confidence 0, scaled by `1 - missing / total_tracked`.
/// Always in [0, 1], and strictly lower whenever a reported field goes
/// missing.
pub fn overall_confidence(
    field_analyses: &[FieldAnalysis],
    missing: &[Field],
    total_tracked: usize,
    config: &ReconcileConfig,
) -> f64 {
    let (weighted, reported_weight) = field_analyses.iter().fold((0.0, 0.0), |(sum, weight), fa| {
        let importance = config.importance_of(fa.field_name).max(0.0);
        (sum + importance * fa.confidence, weight + importance)
    });
    let missing_weight: f64 = missing
        .iter()
        .map(|f| config.importance_of(*f).max(0.0))
        .sum();
    let total_weight = reported_weight + missing_weight;

    if total_weight <= 0.0 || total_tracked == 0 {
        return 0.0;
    }

    let missing_share = (missing.len() as f64 / total_tracked as f64).min(1.0);
    ((weighted / total_weight) * (1.0 - missing_share)).clamp(0.0, 1.0)
}

/// Short text describing conflicts and gaps.
pub fn conflict_summary(field_analyses: &[FieldAnalysis], missing: &[Field]) -> String {
    let conflicting: Vec<&str> = field_analyses
        .iter()
        .filter(|fa| fa.conflicts)
        .map(|fa| fa.field_name.name())
        .collect();

    let mut summary = if field_analyses.is_empty() {
        "No tracked fields were reported".to_string()
    } else if conflicting.is_empty() {
        format!("All {} reported fields agree", field_analyses.len())
    } else {
        format!(
            "{} of {} reported fields conflict ({})",
            conflicting.len(),
            field_analyses.len(),
            conflicting.join(", ")
        )
    };

    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|f| f.name()).collect();
        summary.push_str(&format!("; missing from all sources: {}", names.join(", ")));
    }
    summary.push('.');

    summary
}

/// Builds a `PropertySummary` from reconciled fields.
pub struct SummaryBuilder<'a> {
    config: &'a SummaryConfig,
    /// Year against which build age is measured.
    reference_year: i32,
}

impl<'a> SummaryBuilder<'a> {
    pub fn new(config: &'a SummaryConfig, reference_year: i32) -> Self {
        Self {
            config,
            reference_year,
        }
    }

    /// Build the summary.
    ///
    /// `source_count` is the number of sources in the run; `descriptions`
    /// are the free-text descriptions they supplied.
    pub fn build(
        &self,
        field_analyses: &[FieldAnalysis],
        missing: &[Field],
        descriptions: &[String],
        source_count: usize,
    ) -> PropertySummary {
        let number = |field: Field| -> Option<f64> {
            field_analyses
                .iter()
                .find(|fa| fa.field_name == field)
                .and_then(|fa| fa.recommended_value.as_f64())
        };

        let mut summary = PropertySummary {
            price: number(Field::Price),
            bedrooms: number(Field::Bedrooms).map(|b| b.round() as u32),
            bathrooms: number(Field::Bathrooms),
            square_feet: number(Field::SquareFeet),
            year_built: number(Field::YearBuilt).map(|y| y.round() as i32),
            lot_size: number(Field::LotSize),
            property_type: field_analyses
                .iter()
                .find(|fa| fa.field_name == Field::PropertyType)
                .and_then(|fa| fa.recommended_value.as_str().map(String::from)),
            ..Default::default()
        };

        let lowered: Vec<String> = descriptions.iter().map(|d| d.to_lowercase()).collect();

        summary.key_features = self.key_features(&summary, &lowered);
        summary.condition = self.condition(summary.year_built, &lowered);
        summary.highlights = self.highlights(&summary, field_analyses, source_count);
        summary.concerns = self.concerns(&summary, field_analyses, missing);

        summary
    }

    fn key_features(&self, summary: &PropertySummary, descriptions: &[String]) -> Vec<String> {
        let mut features = Vec::new();

        if let Some(beds) = summary.bedrooms {
            features.push(format!("{} bedrooms", beds));
        }
        if let Some(baths) = summary.bathrooms {
            features.push(format!(
                "{} bathrooms",
                Field::Bathrooms.format_value(&FieldValue::Numeric(baths))
            ));
        }
        if let Some(sqft) = summary.square_feet {
            features.push(format!("{} sqft", group_thousands(sqft)));
        }
        if let Some(lot) = summary.lot_size {
            features.push(format!("{} sqft lot", group_thousands(lot)));
        }
        if let Some(year) = summary.year_built {
            features.push(format!("Built {}", year));
        }
        if let Some(ref kind) = summary.property_type {
            features.push(kind.clone());
        }

        for (needles, label) in FEATURE_PHRASES {
            let mentioned = descriptions
                .iter()
                .any(|d| needles.iter().any(|needle| d.contains(needle)));
            if mentioned && !features.iter().any(|f| f == label) {
                features.push(label.to_string());
            }
        }

        features
    }

    fn condition(&self, year_built: Option<i32>, descriptions: &[String]) -> Option<String> {
        let renovated = descriptions
            .iter()
            .any(|d| RENOVATION_PHRASES.iter().any(|p| d.contains(p)));
        let age = year_built.map(|y| self.reference_year - y);

        match age {
            Some(age) if age <= 10 => Some("Newer construction".to_string()),
            _ if renovated => Some("Updated or renovated per listing descriptions".to_string()),
            Some(age) if age >= self.config.historic_build_years => Some(format!(
                "Older home ({} years); condition depends on system updates",
                age
            )),
            _ => None,
        }
    }

    fn highlights(
        &self,
        summary: &PropertySummary,
        field_analyses: &[FieldAnalysis],
        source_count: usize,
    ) -> Vec<String> {
        let mut highlights = Vec::new();

        if let Some(year) = summary.year_built {
            if self.reference_year - year <= self.config.recent_build_years {
                highlights.push(format!("Relatively recent construction (built {})", year));
            }
        }
        if let Some(sqft) = summary.square_feet {
            if sqft >= self.config.large_square_feet {
                highlights.push(format!("Spacious interior ({} sqft)", group_thousands(sqft)));
            }
        }
        if let Some(beds) = summary.bedrooms {
            if beds >= self.config.many_bedrooms {
                highlights.push(format!("Family-sized layout with {} bedrooms", beds));
            }
        }
        if let Some(lot) = summary.lot_size {
            if lot >= self.config.large_lot_size {
                highlights.push(format!("Large lot ({} sqft)", group_thousands(lot)));
            }
        }
        if source_count > 1
            && !field_analyses.is_empty()
            && field_analyses.iter().all(|fa| !fa.conflicts)
        {
            highlights.push(format!(
                "All {} sources agree on every reported field",
                source_count
            ));
        }

        highlights
    }

    fn concerns(
        &self,
        summary: &PropertySummary,
        field_analyses: &[FieldAnalysis],
        missing: &[Field],
    ) -> Vec<String> {
        let mut concerns = Vec::new();

        for fa in field_analyses.iter().filter(|fa| fa.conflicts) {
            let field = fa.field_name;
            match (field.kind(), fa.spread) {
                (FieldKind::Measured, Some(spread)) => {
                    if spread > self.config.material_spread {
                        concerns.push(format!(
                            "{} differs by {:.1}% across sources; verify before relying on it",
                            field.label(),
                            spread * 100.0
                        ));
                    }
                }
                _ => {
                    let mut distinct: Vec<String> = Vec::new();
                    for v in &fa.values {
                        let shown = field.format_value(&v.value);
                        if !distinct.contains(&shown) {
                            distinct.push(shown);
                        }
                    }
                    concerns.push(format!(
                        "Sources disagree on {} ({})",
                        field.label().to_lowercase(),
                        distinct.join(" vs ")
                    ));
                }
            }
        }

        for field in missing.iter().filter(|f| self.config.is_important(**f)) {
            concerns.push(format!("{} is not reported by any source", field.label()));
        }

        if let Some(year) = summary.year_built {
            if self.reference_year - year >= self.config.historic_build_years {
                concerns.push(format!(
                    "Built in {}; older systems may need inspection",
                    year
                ));
            }
        }

        concerns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceValue;

    fn analysis(
        field: Field,
        value: FieldValue,
        conflicts: bool,
        confidence: f64,
    ) -> FieldAnalysis {
        FieldAnalysis {
            field_name: field,
            values: vec![SourceValue {
                source: "Zillow".to_string(),
                value: value.clone(),
            }],
            conflicts,
            recommended_value: value,
            confidence,
            reasoning: String::new(),
            spread: None,
        }
    }

    #[test]
    fn test_overall_confidence_weighted_by_importance() {
        let config = ReconcileConfig::default();
        let analyses = vec![
            analysis(Field::Price, FieldValue::Numeric(1.0), true, 0.5),
            analysis(Field::YearBuilt, FieldValue::Numeric(2000.0), false, 1.0),
        ];
        // (3 * 0.5 + 1 * 1.0) / 4 = 0.625, no missing fields.
        let overall = overall_confidence(&analyses, &[], 2, &config);
        assert!((overall - 0.625).abs() < 1e-9);
    }

    #[test]
    fn test_overall_confidence_penalizes_missing() {
        let config = ReconcileConfig::default();
        let analyses = vec![analysis(Field::Price, FieldValue::Numeric(1.0), false, 1.0)];
        let others: Vec<Field> = Field::ALL
            .into_iter()
            .filter(|f| *f != Field::Price)
            .collect();

        let mut previous = f64::INFINITY;
        for missing in 0..=others.len() {
            let overall = overall_confidence(&analyses, &others[..missing], 7, &config);
            assert!((0.0..=1.0).contains(&overall));
            assert!(overall < previous);
            previous = overall;
        }
        assert_eq!(overall_confidence(&[], &Field::ALL, 7, &config), 0.0);
    }

    #[test]
    fn test_losing_a_low_confidence_field_lowers_overall() {
        let config = ReconcileConfig::default();
        let mut analyses = vec![analysis(Field::Price, FieldValue::Numeric(1.0), true, 0.2)];
        for field in Field::ALL.into_iter().filter(|f| *f != Field::Price) {
            analyses.push(analysis(field, FieldValue::Numeric(1.0), false, 1.0));
        }
        let with_price = overall_confidence(&analyses, &[], 7, &config);

        let without_price = overall_confidence(&analyses[1..], &[Field::Price], 7, &config);
        assert!(without_price < with_price);
    }

    #[test]
    fn test_conflict_summary_text() {
        let analyses = vec![
            analysis(Field::Price, FieldValue::Numeric(1.0), true, 0.5),
            analysis(Field::Bedrooms, FieldValue::Numeric(3.0), false, 1.0),
        ];
        assert_eq!(
            conflict_summary(&analyses, &[Field::LotSize]),
            "1 of 2 reported fields conflict (price); missing from all sources: lot_size."
        );
        assert_eq!(
            conflict_summary(&analyses[1..], &[]),
            "All 1 reported fields agree."
        );
    }

    #[test]
    fn test_build_maps_core_fields_and_features() {
        let config = SummaryConfig::default();
        let builder = SummaryBuilder::new(&config, 2024);
        let analyses = vec![
            analysis(Field::Price, FieldValue::Numeric(1_259_000.0), false, 1.0),
            analysis(Field::Bedrooms, FieldValue::Numeric(3.0), false, 1.0),
            analysis(Field::Bathrooms, FieldValue::Numeric(2.5), false, 1.0),
            analysis(Field::SquareFeet, FieldValue::Numeric(1824.0), false, 1.0),
            analysis(Field::YearBuilt, FieldValue::Numeric(2005.0), false, 1.0),
            analysis(
                Field::PropertyType,
                FieldValue::Categorical("Condominium".to_string()),
                false,
                1.0,
            ),
        ];
        let descriptions = vec![
            "Recently renovated kitchen with stainless steel appliances. Walking distance to BART."
                .to_string(),
        ];

        let summary = builder.build(&analyses, &[Field::LotSize], &descriptions, 3);

        assert_eq!(summary.price, Some(1_259_000.0));
        assert_eq!(summary.bedrooms, Some(3));
        assert_eq!(summary.lot_size, None);
        assert_eq!(summary.property_type.as_deref(), Some("Condominium"));
        assert_eq!(summary.key_features[0], "3 bedrooms");
        assert!(summary.key_features.contains(&"2.5 bathrooms".to_string()));
        assert!(summary.key_features.contains(&"Stainless steel appliances".to_string()));
        assert!(summary.key_features.contains(&"Transit access".to_string()));
        assert_eq!(
            summary.condition.as_deref(),
            Some("Updated or renovated per listing descriptions")
        );
        assert!(summary
            .highlights
            .contains(&"Relatively recent construction (built 2005)".to_string()));
        assert!(summary
            .highlights
            .contains(&"All 3 sources agree on every reported field".to_string()));
        // lot_size is missing but not important.
        assert!(summary.concerns.is_empty());
    }

    #[test]
    fn test_concerns_for_material_conflicts_and_missing() {
        let config = SummaryConfig::default();
        let builder = SummaryBuilder::new(&config, 2024);

        let mut price = analysis(Field::Price, FieldValue::Numeric(900_000.0), true, 0.8);
        price.spread = Some(0.12);
        let mut sqft = analysis(Field::SquareFeet, FieldValue::Numeric(2000.0), true, 0.9);
        sqft.spread = Some(0.04);
        let mut beds = analysis(Field::Bedrooms, FieldValue::Numeric(4.0), true, 0.6);
        beds.values.push(SourceValue {
            source: "Redfin".to_string(),
            value: FieldValue::Numeric(5.0),
        });
        let year = analysis(Field::YearBuilt, FieldValue::Numeric(1915.0), false, 1.0);

        let summary = builder.build(&[price, sqft, beds, year], &[Field::Price], &[], 2);

        assert!(summary.concerns[0].starts_with("Price differs by 12.0%"));
        assert_eq!(summary.concerns[1], "Sources disagree on bedrooms (4 vs 5)");
        assert!(summary.concerns.contains(&"Price is not reported by any source".to_string()));
        assert!(summary
            .concerns
            .contains(&"Built in 1915; older systems may need inspection".to_string()));
        // Square footage conflict below materiality is not a concern.
        assert!(!summary.concerns.iter().any(|c| c.starts_with("Square feet")));
        assert!(summary.condition.unwrap().starts_with("Older home (109 years)"));
    }
}
