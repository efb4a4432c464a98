//! Markdown report generation.
//!
//! This module renders a `PropertyAnalysis` as a Markdown report, or as
//! pretty-printed JSON.

use crate::config::ReportConfig;
use crate::models::{group_thousands, Field, FieldValue, PropertyAnalysis, PropertySummary};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Run details shown in the report header.
#[derive(Debug, Clone, Default)]
pub struct ReportMetadata {
    pub model_used: String,
    pub duration_seconds: f64,
    /// Orchestrator generation the analysis was computed for.
    pub generation: Option<u64>,
    /// Why the narrative is missing, for partial results.
    pub narrative_error: Option<String>,
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(
    analysis: &PropertyAnalysis,
    metadata: &ReportMetadata,
    options: &ReportConfig,
) -> String {
    let mut output = String::new();

    output.push_str("# Property Analysis Report\n\n");

    output.push_str(&generate_metadata_section(analysis, metadata));
    output.push_str(&generate_summary_section(analysis));
    output.push_str(&generate_list_section("Highlights", &analysis.property_summary.highlights));
    output.push_str(&generate_list_section("Concerns", &analysis.property_summary.concerns));
    output.push_str(&generate_reconciliation_section(analysis, options.include_reasoning));

    if options.include_sources {
        output.push_str(&generate_sources_section(analysis));
    }

    output.push_str(&generate_narrative_section(analysis, metadata));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(analysis: &PropertyAnalysis, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Property:** {}\n", analysis.address));
    if let Some(ref id) = analysis.property_id {
        section.push_str(&format!("- **Property ID:** `{}`\n", id));
    }
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        analysis.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Sources:** {}\n", analysis.data_sources.len()));
    section.push_str(&format!(
        "- **Overall Confidence:** {:.0}%\n",
        analysis.confidence_score * 100.0
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    if let Some(generation) = metadata.generation {
        section.push_str(&format!("- **Generation:** {}\n", generation));
    }
    if metadata.narrative_error.is_some() {
        section.push_str("- **Status:** partial analysis, narrative unavailable\n");
    }
    section.push('\n');

    section
}

fn summary_rows(summary: &PropertySummary) -> Vec<(&'static str, Option<Field>, Option<String>)> {
    let show = |field: Field, value: Option<f64>| {
        value.map(|v| field.format_value(&FieldValue::Numeric(v)))
    };

    vec![
        ("Price", Some(Field::Price), show(Field::Price, summary.price)),
        ("Bedrooms", Some(Field::Bedrooms), summary.bedrooms.map(|b| b.to_string())),
        ("Bathrooms", Some(Field::Bathrooms), show(Field::Bathrooms, summary.bathrooms)),
        ("Square Feet", Some(Field::SquareFeet), summary.square_feet.map(group_thousands)),
        ("Year Built", Some(Field::YearBuilt), summary.year_built.map(|y| y.to_string())),
        ("Lot Size", Some(Field::LotSize), show(Field::LotSize, summary.lot_size)),
        ("Property Type", Some(Field::PropertyType), summary.property_type.clone()),
        ("Condition", None, summary.condition.clone()),
    ]
}

fn generate_summary_section(analysis: &PropertyAnalysis) -> String {
    let summary = &analysis.property_summary;
    let resolution = &analysis.conflict_resolution;
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str("| Attribute | Value | Confidence |\n");
    section.push_str("|:---|:---|:---:|\n");
    for (label, field, value) in summary_rows(summary) {
        let confidence = field
            .and_then(|f| resolution.get(f))
            .map(|fa| format!("{:.0}%", fa.confidence * 100.0))
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            label,
            value.unwrap_or_else(|| "*unknown*".to_string()),
            confidence
        ));
    }
    section.push('\n');

    if !summary.key_features.is_empty() {
        section.push_str("### Key Features\n\n");
        for feature in &summary.key_features {
            section.push_str(&format!("- {}\n", feature));
        }
        section.push('\n');
    }

    section
}

fn generate_list_section(title: &str, items: &[String]) -> String {
    if items.is_empty() {
        return String::new();
    }

    let mut section = format!("## {}\n\n", title);
    for item in items {
        section.push_str(&format!("- {}\n", item));
    }
    section.push('\n');

    section
}

fn generate_reconciliation_section(analysis: &PropertyAnalysis, include_reasoning: bool) -> String {
    let resolution = &analysis.conflict_resolution;
    let mut section = String::new();

    section.push_str("## Field Reconciliation\n\n");
    section.push_str(&format!("{}\n\n", resolution.conflict_summary));

    if !resolution.field_analyses.is_empty() {
        section.push_str("| Field | Reported Values | Conflict | Recommended | Confidence |\n");
        section.push_str("|:---|:---|:---:|:---|:---:|\n");

        for fa in &resolution.field_analyses {
            let values = fa
                .values
                .iter()
                .map(|v| format!("{}: {}", v.source, fa.field_name.format_value(&v.value)))
                .collect::<Vec<_>>()
                .join("<br>");
            section.push_str(&format!(
                "| {} | {} | {} | {} | {:.0}% |\n",
                fa.field_name.label(),
                values,
                if fa.conflicts { "yes" } else { "no" },
                fa.field_name.format_value(&fa.recommended_value),
                fa.confidence * 100.0
            ));
        }
        section.push('\n');
    }

    if include_reasoning {
        for fa in resolution.field_analyses.iter().filter(|fa| !fa.reasoning.is_empty()) {
            section.push_str(&format!("- **{}:** {}\n", fa.field_name.label(), fa.reasoning));
        }
        section.push('\n');
    }

    if !resolution.missing_fields.is_empty() {
        section.push_str("### Missing Fields\n\n");
        for field in &resolution.missing_fields {
            section.push_str(&format!("- {}\n", field.label()));
        }
        section.push('\n');
    }

    section
}

fn generate_sources_section(analysis: &PropertyAnalysis) -> String {
    let mut section = String::new();

    section.push_str("## Data Sources\n\n");
    section.push_str("| Source | Last Updated | Description |\n");
    section.push_str("|:---|:---:|:---|\n");

    for record in &analysis.data_sources {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            record.source,
            record
                .last_updated
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            record
                .description
                .as_deref()
                .map(|d| d.replace('|', "/"))
                .unwrap_or_else(|| "-".to_string())
        ));
    }
    section.push('\n');

    section
}

fn generate_narrative_section(analysis: &PropertyAnalysis, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Analysis\n\n");
    match (&analysis.analysis, &metadata.narrative_error) {
        (Some(text), _) => {
            section.push_str(text);
            section.push_str("\n\n");
        }
        (None, Some(reason)) => {
            section.push_str(&format!("> Narrative unavailable: {}\n\n", reason));
        }
        (None, None) => section.push_str("> Narrative unavailable.\n\n"),
    }

    if !analysis.insights.is_empty() {
        section.push_str("## Insights\n\n");
        for (i, insight) in analysis.insights.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", i + 1, insight));
        }
        section.push('\n');
    }

    section
}

fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by propinsight v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(analysis: &PropertyAnalysis) -> Result<String> {
    serde_json::to_string_pretty(analysis).map_err(Into::into)
}

/// Write rendered report content to a file.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
