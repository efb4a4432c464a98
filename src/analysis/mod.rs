//! Conflict detection and reconciliation.
//!
//! The pipeline runs per field: collect each source's value, compare them
//! under the field's rule, reconcile into a recommended value with a
//! confidence score, then aggregate into a `ConflictResolution` and a
//! `PropertySummary`.

pub mod comparator;
pub mod reconciler;
pub mod summary;

use chrono::{Datelike, Utc};
use tracing::debug;

use crate::config::{ReconcileConfig, SummaryConfig};
use crate::models::{
    ConflictResolution, Field, FieldAnalysis, PropertySummary, SourceRecord, SourceValue,
};
use comparator::{compare, ComparisonRule};
use reconciler::{reconcile, SourceWeights};
use summary::{conflict_summary, overall_confidence, SummaryBuilder};

/// Output of one reconciliation run.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub resolution: ConflictResolution,
    pub summary: PropertySummary,
}

/// Reconcile a set of source records for one property.
///
/// Deterministic for a given record list: recency is measured against the
/// newest `last_updated` among the records, not the wall clock.
pub fn run_pipeline(
    records: &[SourceRecord],
    reconcile_config: &ReconcileConfig,
    summary_config: &SummaryConfig,
) -> Reconciliation {
    let weights = SourceWeights::from_records(records, reconcile_config);
    let mut field_analyses = Vec::new();
    let mut missing_fields = Vec::new();

    for field in Field::ALL {
        let values: Vec<(String, Option<_>)> = records
            .iter()
            .map(|r| (r.source.clone(), r.value_of(field)))
            .collect();

        let rule = ComparisonRule::for_field(field, reconcile_config);
        let comparison = compare(field, &values, rule);

        match reconcile(&comparison, records.len(), &weights, reconcile_config) {
            Some(analysis) => {
                debug!(
                    "{}: conflicts={} confidence={:.2}",
                    field, analysis.conflicts, analysis.confidence
                );
                field_analyses.push(analysis);
            }
            None => missing_fields.push(field),
        }
    }

    let overall = overall_confidence(
        &field_analyses,
        &missing_fields,
        Field::ALL.len(),
        reconcile_config,
    );
    let descriptions = descriptions_of(records);
    let summary = SummaryBuilder::new(summary_config, reference_year(records)).build(
        &field_analyses,
        &missing_fields,
        &descriptions,
        records.len(),
    );

    Reconciliation {
        resolution: ConflictResolution {
            conflict_summary: conflict_summary(&field_analyses, &missing_fields),
            field_analyses,
            overall_confidence: overall,
            missing_fields,
        },
        summary,
    }
}

/// Build a resolution for a single user-supplied record.
///
/// No cross-source comparison happens: each supplied field is taken as
/// given with full confidence, and the overall confidence is the share
/// of the `total_inputs` input fields that were filled in.
pub fn run_single_source(
    record: &SourceRecord,
    populated: usize,
    total_inputs: usize,
    summary_config: &SummaryConfig,
) -> Reconciliation {
    let field_analyses: Vec<FieldAnalysis> = Field::ALL
        .into_iter()
        .filter_map(|field| {
            record.value_of(field).map(|value| FieldAnalysis {
                field_name: field,
                values: vec![SourceValue {
                    source: record.source.clone(),
                    value: value.clone(),
                }],
                conflicts: false,
                recommended_value: value,
                confidence: 1.0,
                reasoning: format!("Provided directly by {}.", record.source),
                spread: None,
            })
        })
        .collect();

    let overall = if total_inputs == 0 {
        0.0
    } else {
        (populated as f64 / total_inputs as f64).clamp(0.0, 1.0)
    };

    let descriptions = descriptions_of(std::slice::from_ref(record));
    let summary = SummaryBuilder::new(summary_config, Utc::now().year()).build(
        &field_analyses,
        &[],
        &descriptions,
        1,
    );

    Reconciliation {
        resolution: ConflictResolution {
            field_analyses,
            overall_confidence: overall,
            missing_fields: Vec::new(),
            conflict_summary: format!(
                "Single source ({}); no cross-source comparison performed.",
                record.source
            ),
        },
        summary,
    }
}

fn descriptions_of(records: &[SourceRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.description.clone())
        .filter(|d| !d.trim().is_empty())
        .collect()
}

fn reference_year(records: &[SourceRecord]) -> i32 {
    records
        .iter()
        .filter_map(|r| r.last_updated)
        .max()
        .map(|d| d.year())
        .unwrap_or_else(|| Utc::now().year())
}
