//! Analysis entry points.
//!
//! `PropertyService` wires the directory, the source store and the
//! narrative generator around the reconciliation pipeline.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tracing::{debug, info, warn};

use crate::analysis::{run_pipeline, run_single_source, Reconciliation};
use crate::config::{Config, ReconcileConfig, SummaryConfig};
use crate::error::{AnalysisError, NarrativeError, StoreError, Transient};
use crate::models::{
    HealthStatus, PropertyAnalysis, PropertyInput, PropertySearchResult, SourceRecord,
};
use crate::narrative::{NarrativeContext, NarrativeGenerator};
use crate::sources::{PropertyDirectory, SourceStore};

/// Source label for raw-input analyses.
pub const USER_INPUT_SOURCE: &str = "User Input";

/// Tunables the service needs from the config.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub reconcile: ReconcileConfig,
    pub summary: SummaryConfig,
    pub search_timeout: Duration,
    /// Budget for the whole narrative step, retry included.
    pub narrative_timeout: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            reconcile: config.reconcile.clone(),
            summary: config.summary.clone(),
            search_timeout: Duration::from_secs(config.sources.search_timeout_seconds),
            narrative_timeout: Duration::from_secs(config.model.timeout_seconds),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Runs analyses against the configured collaborators.
pub struct PropertyService {
    directory: Arc<dyn PropertyDirectory>,
    store: Arc<dyn SourceStore>,
    narrator: Arc<dyn NarrativeGenerator>,
    settings: ServiceSettings,
}

impl PropertyService {
    pub fn new(
        directory: Arc<dyn PropertyDirectory>,
        store: Arc<dyn SourceStore>,
        narrator: Arc<dyn NarrativeGenerator>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            directory,
            store,
            narrator,
            settings,
        }
    }

    /// Name of the narrative generator, for report metadata.
    pub fn narrator_name(&self) -> &str {
        self.narrator.name()
    }

    pub async fn search_properties(
        &self,
        query: &str,
    ) -> Result<Vec<PropertySearchResult>, AnalysisError> {
        let deadline = self.settings.search_timeout;
        with_retry("property search", || async move {
            match tokio::time::timeout(deadline, self.directory.search(query)).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout {
                    backend: "property directory".to_string(),
                    seconds: deadline.as_secs(),
                }),
            }
        })
        .await
        .map_err(|e| AnalysisError::from_store("property search", e))
    }

    /// Fetch every source for a property and reconcile them.
    pub async fn analyze_by_property_id(
        &self,
        property_id: &str,
    ) -> Result<PropertyAnalysis, AnalysisError> {
        info!("Analyzing property {}", property_id);

        let listing = with_retry("property lookup", || self.directory.get(property_id))
            .await
            .map_err(|e| AnalysisError::from_store("property lookup", e))?
            .ok_or_else(|| AnalysisError::PropertyNotFound(property_id.to_string()))?;

        let records = with_retry("source fetch", || self.store.fetch_all(property_id))
            .await
            .map_err(|e| AnalysisError::from_store("source fetch", e))?;

        if records.is_empty() {
            return Err(AnalysisError::NoSourcesFound {
                property_id: property_id.to_string(),
            });
        }
        info!("Retrieved {} sources for {}", records.len(), property_id);

        let reconciliation =
            run_pipeline(&records, &self.settings.reconcile, &self.settings.summary);
        debug!("{}", reconciliation.resolution.conflict_summary);

        self.finish(Some(property_id.to_string()), listing.address, records, reconciliation)
            .await
    }

    /// Analyze user-supplied values as a single source.
    pub async fn analyze_by_raw_input(
        &self,
        input: &PropertyInput,
    ) -> Result<PropertyAnalysis, AnalysisError> {
        validate_input(input)?;

        let populated = input.populated_count();
        let record = input_record(input);
        let reconciliation = run_single_source(
            &record,
            populated,
            PropertyInput::FIELD_COUNT,
            &self.settings.summary,
        );

        let address = input
            .address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or("Unspecified address")
            .to_string();

        self.finish(None, address, vec![record], reconciliation).await
    }

    pub async fn health(&self) -> HealthStatus {
        HealthStatus::from_availability(self.narrator.is_available().await)
    }

    /// Attach the narrative, degrading to a partial result when it fails.
    async fn finish(
        &self,
        property_id: Option<String>,
        address: String,
        records: Vec<SourceRecord>,
        reconciliation: Reconciliation,
    ) -> Result<PropertyAnalysis, AnalysisError> {
        let Reconciliation {
            resolution,
            summary,
        } = reconciliation;

        let narrative = {
            let context = NarrativeContext {
                address: &address,
                summary: &summary,
                resolution: &resolution,
                sources: &records,
            };
            let deadline = self.settings.narrative_timeout;
            let attempts = with_retry("narrative generation", || self.narrator.generate(&context));
            match tokio::time::timeout(deadline, attempts).await {
                Ok(result) => result,
                Err(_) => Err(NarrativeError::Timeout {
                    seconds: deadline.as_secs(),
                }),
            }
        };

        let mut analysis = PropertyAnalysis {
            property_id,
            address,
            data_sources: records,
            confidence_score: resolution.overall_confidence,
            conflict_resolution: resolution,
            property_summary: summary,
            analysis: None,
            insights: Vec::new(),
            generated_at: Utc::now(),
        };

        match narrative {
            Ok(narrative) => {
                analysis.analysis = Some(narrative.analysis);
                analysis.insights = narrative.insights;
                Ok(analysis)
            }
            Err(e) => {
                if matches!(e, NarrativeError::Disabled) {
                    debug!("Narrative disabled, returning structured result");
                } else {
                    warn!("Narrative unavailable: {}", e);
                }
                Err(AnalysisError::NarrativeUnavailable {
                    reason: e.to_string(),
                    partial: Box::new(analysis),
                })
            }
        }
    }
}

/// Run `attempt`, retrying once if the failure is transient.
async fn with_retry<T, E, F, Fut>(operation: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + Display,
{
    match attempt().await {
        Err(e) if e.is_transient() => {
            warn!("{} failed ({}), retrying once", operation, e);
            attempt().await
        }
        other => other,
    }
}

fn validate_input(input: &PropertyInput) -> Result<(), AnalysisError> {
    if input.populated_count() == 0 {
        return Err(AnalysisError::InvalidInput(
            "at least one property field must be provided".to_string(),
        ));
    }

    let positive = |name: &str, value: Option<f64>| match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(AnalysisError::InvalidInput(format!(
            "{} must be a positive number",
            name
        ))),
        _ => Ok(()),
    };
    positive("price", input.price)?;
    positive("square_feet", input.square_feet)?;

    if let Some(baths) = input.bathrooms {
        if !baths.is_finite() || baths < 0.0 {
            return Err(AnalysisError::InvalidInput(
                "bathrooms must not be negative".to_string(),
            ));
        }
    }

    if let Some(year) = input.year_built {
        let latest = Utc::now().year() + 5;
        if !(1600..=latest).contains(&year) {
            return Err(AnalysisError::InvalidInput(format!(
                "year_built must be between 1600 and {}",
                latest
            )));
        }
    }

    Ok(())
}

fn input_record(input: &PropertyInput) -> SourceRecord {
    let mut record = SourceRecord::new(USER_INPUT_SOURCE);
    record.price = input.price;
    record.bedrooms = input.bedrooms;
    record.bathrooms = input.bathrooms;
    record.square_feet = input.square_feet;
    record.year_built = input.year_built;
    record.description = input
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(String::from);
    record.raw_data = serde_json::to_value(input).unwrap_or_default();
    record
}
