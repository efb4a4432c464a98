//! Analysis request orchestration.
//!
//! The orchestrator owns one client session's lifecycle: search, select,
//! analyze, then complete or fail. Each analysis gets a generation number
//! allocated under the state lock; a finished analysis is applied only if
//! its generation is still the current one, so results of superseded
//! selections are dropped instead of surfacing.

pub mod service;
pub mod state;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{AnalysisError, OrchestratorError};
use crate::models::PropertySearchResult;

pub use service::{PropertyService, ServiceSettings};
pub use state::{AnalysisRequest, AnalysisState, Phase};

/// Drives searches and analyses for one session.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    service: Arc<PropertyService>,
    state: Arc<watch::Sender<AnalysisState>>,
    /// Last allocated generation. Only touched while holding the state lock.
    generation: Arc<AtomicU64>,
}

impl AnalysisOrchestrator {
    pub fn new(service: Arc<PropertyService>) -> Self {
        let (state, _) = watch::channel(AnalysisState::Idle);
        Self {
            service,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn service(&self) -> &PropertyService {
        &self.service
    }

    /// Current state.
    pub fn snapshot(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn current_request(&self) -> Option<AnalysisRequest> {
        AnalysisRequest::from_state(&self.state.borrow())
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.subscribe()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Search for properties, superseding any analysis in flight.
    pub async fn search(
        &self,
        query: &str,
    ) -> Result<Vec<PropertySearchResult>, AnalysisError> {
        let mut generation = 0;
        self.state.send_modify(|current| {
            generation = self.next_generation();
            if let AnalysisState::Analyzing { property_id, .. } = current {
                debug!("Search supersedes analysis of {}", property_id);
            }
            *current = AnalysisState::Searching {
                query: query.to_string(),
                results: Vec::new(),
                generation,
            };
        });

        let results = self.service.search_properties(query).await?;

        self.state.send_if_modified(|current| match current {
            AnalysisState::Searching {
                generation: g,
                results: slot,
                ..
            } if *g == generation => {
                *slot = results.clone();
                true
            }
            _ => false,
        });

        Ok(results)
    }

    /// Select a property and start analyzing it.
    ///
    /// Reselecting while an analysis is in flight invalidates the earlier
    /// one. Returns the generation of the new analysis.
    pub fn select(&self, property_id: &str) -> Result<u64, OrchestratorError> {
        let mut outcome = Ok(0);
        self.state.send_if_modified(|current| {
            let checked = current
                .phase()
                .check(Phase::Selected)
                .and_then(|_| Phase::Selected.check(Phase::Analyzing));
            match checked {
                Ok(()) => {
                    if let AnalysisState::Analyzing {
                        property_id: previous,
                        generation,
                    } = current
                    {
                        debug!(
                            "Superseding analysis of {} (generation {})",
                            previous, generation
                        );
                    }
                    let generation = self.next_generation();
                    *current = AnalysisState::Analyzing {
                        property_id: property_id.to_string(),
                        generation,
                    };
                    outcome = Ok(generation);
                    true
                }
                Err(e) => {
                    outcome = Err(e);
                    false
                }
            }
        });

        let generation = outcome?;
        info!("Selected {} (generation {})", property_id, generation);
        self.spawn_analysis(property_id.to_string(), generation);
        Ok(generation)
    }

    /// Re-run the analysis for the current property.
    pub fn reanalyze(&self) -> Result<u64, OrchestratorError> {
        let property_id = self
            .state
            .borrow()
            .property_id()
            .map(String::from)
            .ok_or(OrchestratorError::NothingSelected)?;
        self.select(&property_id)
    }

    /// Wait until no analysis is in flight and return the settled state.
    pub async fn settled(&self) -> AnalysisState {
        let mut receiver = self.state.subscribe();
        let settled = match receiver.wait_for(AnalysisState::is_settled).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        };
        settled
    }

    fn spawn_analysis(&self, property_id: String, generation: u64) {
        let service = self.service.clone();
        let state = self.state.clone();

        tokio::spawn(async move {
            let outcome = service.analyze_by_property_id(&property_id).await;

            let applied = state.send_if_modified(|current| match current {
                AnalysisState::Analyzing { generation: g, .. } if *g == generation => {
                    *current = match outcome {
                        Ok(analysis) => AnalysisState::Complete {
                            property_id: property_id.clone(),
                            generation,
                            analysis: Arc::new(analysis),
                        },
                        Err(error) => AnalysisState::Failed {
                            property_id: property_id.clone(),
                            generation,
                            error: Arc::new(error),
                        },
                    };
                    true
                }
                _ => false,
            });

            if applied {
                debug!("Applied result for {} (generation {})", property_id, generation);
            } else {
                debug!(
                    "Dropping stale result for {} (generation {})",
                    property_id, generation
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::service::tests::CannedNarrator;
    use super::*;
    use crate::error::{ErrorKind, NarrativeError, StoreError};
    use crate::models::SourceRecord;
    use crate::sources::{Catalog, SourceStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Store that holds back selected properties until released.
    struct GatedStore {
        gates: HashMap<String, Arc<Notify>>,
    }

    #[async_trait]
    impl SourceStore for GatedStore {
        async fn fetch_all(&self, property_id: &str) -> Result<Vec<SourceRecord>, StoreError> {
            if let Some(gate) = self.gates.get(property_id) {
                gate.notified().await;
            }
            let mut record = SourceRecord::new("Zillow");
            record.price = Some(1_000_000.0);
            record.bedrooms = Some(3);
            Ok(vec![record])
        }
    }

    fn orchestrator(gated: &[&str]) -> (AnalysisOrchestrator, HashMap<String, Arc<Notify>>) {
        let gates: HashMap<String, Arc<Notify>> = gated
            .iter()
            .map(|id| (id.to_string(), Arc::new(Notify::new())))
            .collect();
        let service = PropertyService::new(
            Arc::new(Catalog::sample().unwrap()),
            Arc::new(GatedStore {
                gates: gates.clone(),
            }),
            Arc::new(CannedNarrator::ok()),
            ServiceSettings::default(),
        );
        (AnalysisOrchestrator::new(Arc::new(service)), gates)
    }

    #[tokio::test]
    async fn test_select_completes() {
        let (orchestrator, _) = orchestrator(&[]);
        let generation = orchestrator.select("prop_001").unwrap();

        match orchestrator.settled().await {
            AnalysisState::Complete {
                property_id,
                generation: g,
                analysis,
            } => {
                assert_eq!(property_id, "prop_001");
                assert_eq!(g, generation);
                assert_eq!(analysis.property_id.as_deref(), Some("prop_001"));
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reselection_drops_stale_result() {
        let (orchestrator, gates) = orchestrator(&["prop_001"]);

        let first = orchestrator.select("prop_001").unwrap();
        let second = orchestrator.select("prop_002").unwrap();
        assert!(second > first);

        let settled = orchestrator.settled().await;
        assert_eq!(settled.property_id(), Some("prop_002"));
        assert_eq!(settled.phase(), Phase::Complete);

        // Let the superseded analysis finish; it must not replace the result.
        gates["prop_001"].notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let state = orchestrator.snapshot();
        assert_eq!(state.property_id(), Some("prop_002"));
        assert_eq!(state.generation(), Some(second));
    }

    #[tokio::test]
    async fn test_search_supersedes_analysis() {
        let (orchestrator, gates) = orchestrator(&["prop_003"]);
        orchestrator.select("prop_003").unwrap();

        let results = orchestrator.search("San Jose").await.unwrap();
        assert_eq!(results[0].id, "prop_004");

        gates["prop_003"].notify_one();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match orchestrator.snapshot() {
            AnalysisState::Searching { query, results, .. } => {
                assert_eq!(query, "San Jose");
                assert_eq!(results.len(), 1);
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert!(orchestrator.current_request().is_none());
    }

    #[tokio::test]
    async fn test_reanalyze_requires_selection() {
        let (orchestrator, _) = orchestrator(&[]);
        assert_eq!(
            orchestrator.reanalyze().unwrap_err(),
            OrchestratorError::NothingSelected
        );

        let first = orchestrator.select("prop_005").unwrap();
        orchestrator.settled().await;
        let second = orchestrator.reanalyze().unwrap();
        assert!(second > first);

        let settled = orchestrator.settled().await;
        assert_eq!(settled.generation(), Some(second));
        assert_eq!(settled.property_id(), Some("prop_005"));
    }

    #[tokio::test]
    async fn test_failed_analysis_keeps_partial() {
        let service = PropertyService::new(
            Arc::new(Catalog::sample().unwrap()),
            Arc::new(GatedStore {
                gates: HashMap::new(),
            }),
            Arc::new(CannedNarrator::failing(
                usize::MAX,
                NarrativeError::Api {
                    status: 500,
                    body: "model not loaded".to_string(),
                },
            )),
            ServiceSettings::default(),
        );
        let orchestrator = AnalysisOrchestrator::new(Arc::new(service));

        orchestrator.select("prop_001").unwrap();
        match orchestrator.settled().await {
            AnalysisState::Failed { error, .. } => {
                assert_eq!(error.kind(), ErrorKind::NarrativeUnavailable);
                assert!(error.partial().is_some());
            }
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_property_fails() {
        let (orchestrator, _) = orchestrator(&[]);
        orchestrator.select("prop_999").unwrap();
        match orchestrator.settled().await {
            AnalysisState::Failed { error, .. } => {
                assert_eq!(error.kind(), ErrorKind::PropertyNotFound)
            }
            other => panic!("unexpected state {:?}", other),
        }
    }
}
