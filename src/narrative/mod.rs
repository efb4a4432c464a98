//! Narrative generation.
//!
//! The narrative is the free-text analysis and list of insights layered on
//! top of the structured reconciliation. It is optional: when generation
//! fails the structured result still stands.

pub mod ollama;

use async_trait::async_trait;

use crate::error::NarrativeError;
use crate::models::{ConflictResolution, PropertySummary, SourceRecord};

pub use ollama::OllamaNarrator;

/// Structured facts handed to a narrative generator.
#[derive(Debug, Clone, Copy)]
pub struct NarrativeContext<'a> {
    pub address: &'a str,
    pub summary: &'a PropertySummary,
    pub resolution: &'a ConflictResolution,
    /// Raw per-source records the resolution was built from.
    pub sources: &'a [SourceRecord],
}

/// Generated analysis text and insights.
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub analysis: String,
    pub insights: Vec<String>,
}

/// Produces human-readable analysis from structured facts.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    async fn generate(&self, context: &NarrativeContext<'_>) -> Result<Narrative, NarrativeError>;

    /// Whether the generator can currently be reached.
    async fn is_available(&self) -> bool;

    /// Model or generator name, for report metadata.
    fn name(&self) -> &str;
}

/// Generator used when narrative output is turned off.
#[derive(Debug, Default)]
pub struct DisabledNarrator;

#[async_trait]
impl NarrativeGenerator for DisabledNarrator {
    async fn generate(&self, _context: &NarrativeContext<'_>) -> Result<Narrative, NarrativeError> {
        Err(NarrativeError::Disabled)
    }

    async fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_narrator() {
        let summary = PropertySummary::default();
        let resolution = ConflictResolution {
            field_analyses: vec![],
            overall_confidence: 0.0,
            missing_fields: vec![],
            conflict_summary: String::new(),
        };
        let context = NarrativeContext {
            address: "1 Main St",
            summary: &summary,
            resolution: &resolution,
            sources: &[],
        };

        let narrator = DisabledNarrator;
        assert!(matches!(
            narrator.generate(&context).await,
            Err(NarrativeError::Disabled)
        ));
        assert!(!narrator.is_available().await);
    }
}
