//! Error types for analysis runs and their collaborators.

use crate::models::PropertyAnalysis;

/// Failure of a collaborator that can be retried once when transient.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Errors from the property directory and source backends.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A backend or lookup exceeded its deadline.
    #[error("{backend} timed out after {seconds}s")]
    Timeout { backend: String, seconds: u64 },

    /// A backend could not be reached.
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    /// A backend returned a payload that could not be normalized.
    #[error("{backend} returned a malformed record: {reason}")]
    Malformed { backend: String, reason: String },

    /// The catalog file could not be read or parsed.
    #[error("catalog error: {0}")]
    Catalog(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout { .. } | StoreError::Unavailable { .. })
    }
}

/// Errors from the narrative generator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NarrativeError {
    #[error("narrative generation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cannot connect to narrative generator at {url}")]
    Connect { url: String },

    #[error("narrative generator API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse narrative response: {0}")]
    Parse(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("narrative generation is disabled")]
    Disabled,
}

impl Transient for NarrativeError {
    fn is_transient(&self) -> bool {
        matches!(self, NarrativeError::Timeout { .. } | NarrativeError::Connect { .. })
    }
}

/// Distinguishing kind of an analysis failure, for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoSourcesFound,
    PropertyNotFound,
    NarrativeUnavailable,
    InvalidInput,
    UpstreamTimeout,
    Upstream,
}

impl ErrorKind {
    /// Short user-facing label that tells failures apart.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::NoSourcesFound => "no data",
            ErrorKind::PropertyNotFound => "unknown property",
            ErrorKind::NarrativeUnavailable => "partial analysis",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::UpstreamTimeout => "timed out",
            ErrorKind::Upstream => "analysis failed",
        }
    }
}

/// Errors surfaced by an analysis run.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The source store returned zero records.
    #[error("no source data available for property {property_id}")]
    NoSourcesFound { property_id: String },

    /// The directory has no property with this id.
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// Narrative generation failed; the structured result is still available.
    #[error("partial analysis, narrative unavailable: {reason}")]
    NarrativeUnavailable {
        reason: String,
        partial: Box<PropertyAnalysis>,
    },

    /// Raw input rejected before entering the pipeline.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A collaborator exceeded its deadline (after one retry).
    #[error("{operation} timed out after {seconds}s")]
    UpstreamTimeout { operation: String, seconds: u64 },

    /// A collaborator failed for a non-timeout reason.
    #[error("upstream error: {0}")]
    Upstream(#[from] StoreError),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::NoSourcesFound { .. } => ErrorKind::NoSourcesFound,
            AnalysisError::PropertyNotFound(_) => ErrorKind::PropertyNotFound,
            AnalysisError::NarrativeUnavailable { .. } => ErrorKind::NarrativeUnavailable,
            AnalysisError::InvalidInput(_) => ErrorKind::InvalidInput,
            AnalysisError::UpstreamTimeout { .. } => ErrorKind::UpstreamTimeout,
            AnalysisError::Upstream(_) => ErrorKind::Upstream,
        }
    }

    /// The structured-only result, when the failure was narrative-only.
    pub fn partial(&self) -> Option<&PropertyAnalysis> {
        match self {
            AnalysisError::NarrativeUnavailable { partial, .. } => Some(&**partial),
            _ => None,
        }
    }

    /// Map a store failure for an operation into the surfaced error.
    pub fn from_store(operation: &str, err: StoreError) -> Self {
        match err {
            StoreError::Timeout { seconds, .. } => AnalysisError::UpstreamTimeout {
                operation: operation.to_string(),
                seconds,
            },
            other => AnalysisError::Upstream(other),
        }
    }
}

/// Errors from driving the orchestrator state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    #[error("no property has been selected")]
    NothingSelected,

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_transience() {
        let timeout = StoreError::Timeout {
            backend: "Zillow".to_string(),
            seconds: 10,
        };
        let malformed = StoreError::Malformed {
            backend: "Zillow".to_string(),
            reason: "missing source".to_string(),
        };
        assert!(timeout.is_transient());
        assert!(!malformed.is_transient());
    }

    #[test]
    fn test_narrative_error_transience() {
        assert!(NarrativeError::Timeout { seconds: 120 }.is_transient());
        assert!(NarrativeError::Connect {
            url: "http://localhost:11434".to_string()
        }
        .is_transient());
        assert!(!NarrativeError::Disabled.is_transient());
        assert!(!NarrativeError::Api {
            status: 500,
            body: String::new()
        }
        .is_transient());
    }

    #[test]
    fn test_from_store_maps_timeout() {
        let err = AnalysisError::from_store(
            "source fetch",
            StoreError::Timeout {
                backend: "all backends".to_string(),
                seconds: 10,
            },
        );
        assert_eq!(err.kind(), ErrorKind::UpstreamTimeout);
        assert_eq!(err.to_string(), "source fetch timed out after 10s");

        let err = AnalysisError::from_store("search", StoreError::Catalog("bad".to_string()));
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert!(err.partial().is_none());
    }

    #[test]
    fn test_kind_labels_tell_failures_apart() {
        let no_data = AnalysisError::NoSourcesFound {
            property_id: "prop_001".to_string(),
        };
        let timeout = AnalysisError::UpstreamTimeout {
            operation: "source fetch".to_string(),
            seconds: 10,
        };
        assert_eq!(no_data.kind().label(), "no data");
        assert_eq!(timeout.kind().label(), "timed out");
        assert_eq!(ErrorKind::NarrativeUnavailable.label(), "partial analysis");
    }
}
