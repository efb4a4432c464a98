//! Analysis request lifecycle states.

use std::fmt;
use std::sync::Arc;

use crate::error::{AnalysisError, OrchestratorError};
use crate::models::{PropertyAnalysis, PropertySearchResult};

/// Where a client session is in the search → select → analyze cycle.
///
/// Selection has no state of its own: `select` passes through
/// `Phase::Selected` and lands in `Analyzing` within one update.
#[derive(Debug, Clone)]
pub enum AnalysisState {
    Idle,
    Searching {
        query: String,
        results: Vec<PropertySearchResult>,
        generation: u64,
    },
    Analyzing {
        property_id: String,
        generation: u64,
    },
    Complete {
        property_id: String,
        generation: u64,
        analysis: Arc<PropertyAnalysis>,
    },
    Failed {
        property_id: String,
        generation: u64,
        error: Arc<AnalysisError>,
    },
}

/// State discriminant, used for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Searching,
    Selected,
    Analyzing,
    Complete,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Searching => "searching",
            Phase::Selected => "selected",
            Phase::Analyzing => "analyzing",
            Phase::Complete => "complete",
            Phase::Failed => "failed",
        }
    }

    /// Whether `self -> to` is a legal transition.
    ///
    /// Selecting straight from `Idle` covers opening a known property id.
    /// Terminal states only leave through a new search or a (re)selection.
    pub fn can_transition(&self, to: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, to),
            (Idle, Searching)
                | (Idle, Selected)
                | (Searching, Searching)
                | (Searching, Selected)
                | (Selected, Analyzing)
                | (Analyzing, Searching)
                | (Analyzing, Selected)
                | (Analyzing, Complete)
                | (Analyzing, Failed)
                | (Complete, Searching)
                | (Complete, Selected)
                | (Failed, Searching)
                | (Failed, Selected)
        )
    }

    pub fn check(&self, to: Phase) -> Result<(), OrchestratorError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: self.name(),
                to: to.name(),
            })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl AnalysisState {
    pub fn phase(&self) -> Phase {
        match self {
            AnalysisState::Idle => Phase::Idle,
            AnalysisState::Searching { .. } => Phase::Searching,
            AnalysisState::Analyzing { .. } => Phase::Analyzing,
            AnalysisState::Complete { .. } => Phase::Complete,
            AnalysisState::Failed { .. } => Phase::Failed,
        }
    }

    /// The property this state concerns, if any.
    pub fn property_id(&self) -> Option<&str> {
        match self {
            AnalysisState::Analyzing { property_id, .. }
            | AnalysisState::Complete { property_id, .. }
            | AnalysisState::Failed { property_id, .. } => Some(property_id),
            AnalysisState::Idle | AnalysisState::Searching { .. } => None,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            AnalysisState::Searching { generation, .. }
            | AnalysisState::Analyzing { generation, .. }
            | AnalysisState::Complete { generation, .. }
            | AnalysisState::Failed { generation, .. } => Some(*generation),
            AnalysisState::Idle => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, AnalysisState::Analyzing { .. })
    }
}

/// The request currently tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub property_id: String,
    pub phase: Phase,
    pub generation: u64,
}

impl AnalysisRequest {
    pub fn from_state(state: &AnalysisState) -> Option<Self> {
        match (state.property_id(), state.generation()) {
            (Some(property_id), Some(generation)) => Some(Self {
                property_id: property_id.to_string(),
                phase: state.phase(),
                generation,
            }),
            _ => None,
        }
    }
}
