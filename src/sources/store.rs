//! Concurrent fetching across source backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use tokio::time::error::Elapsed;
use tracing::{debug, warn};

use super::normalize::normalize_record;
use super::{SourceBackend, SourceStore};
use crate::error::StoreError;
use crate::models::SourceRecord;

/// One backend's answer, or `Elapsed` when it missed the deadline.
type Fetched = (
    Arc<dyn SourceBackend>,
    Result<Result<Option<serde_json::Value>, StoreError>, Elapsed>,
);

/// Queries every backend with bounded concurrency and a per-backend deadline.
///
/// Records come back in backend order regardless of completion order. A
/// failing backend is skipped with a warning. If nothing came back, a
/// timeout on any backend makes the whole fetch a timeout, and errors from
/// every backend make it unavailable.
pub struct FanOutStore {
    backends: Vec<Arc<dyn SourceBackend>>,
    fan_out: usize,
    timeout: Duration,
}

impl FanOutStore {
    pub fn new(backends: Vec<Arc<dyn SourceBackend>>, fan_out: usize, timeout: Duration) -> Self {
        Self {
            backends,
            fan_out: fan_out.max(1),
            timeout,
        }
    }
}

async fn fetch_one(
    backend: Arc<dyn SourceBackend>,
    property_id: &str,
    deadline: Duration,
) -> Fetched {
    let outcome = tokio::time::timeout(deadline, backend.fetch(property_id)).await;
    (backend, outcome)
}

#[async_trait]
impl SourceStore for FanOutStore {
    async fn fetch_all(&self, property_id: &str) -> Result<Vec<SourceRecord>, StoreError> {
        let deadline = self.timeout;

        let fetches: Vec<BoxFuture<'_, Fetched>> = self
            .backends
            .iter()
            .cloned()
            .map(|backend| fetch_one(backend, property_id, deadline).boxed())
            .collect();
        let outcomes: Vec<Fetched> = stream::iter(fetches)
            .buffered(self.fan_out)
            .collect()
            .await;

        let mut records = Vec::new();
        let mut timed_out = false;
        let mut last_failure = None;
        let mut failures = 0;

        for (backend, outcome) in outcomes {
            let name = backend.name();
            match outcome {
                Ok(Ok(Some(raw))) => match normalize_record(name, raw) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping {}: {}", name, e),
                },
                Ok(Ok(None)) => debug!("{} has no data for {}", name, property_id),
                Ok(Err(e)) => {
                    if matches!(e, StoreError::Timeout { .. }) {
                        timed_out = true;
                    }
                    warn!("Skipping {}: {}", name, e);
                    failures += 1;
                    last_failure = Some(e.to_string());
                }
                Err(_) => {
                    timed_out = true;
                    warn!(
                        "Skipping {}: no response within {}s",
                        name,
                        deadline.as_secs()
                    );
                }
            }
        }

        if records.is_empty() {
            if timed_out {
                return Err(StoreError::Timeout {
                    backend: "source backends".to_string(),
                    seconds: deadline.as_secs(),
                });
            }
            if failures > 0 && failures == self.backends.len() {
                return Err(StoreError::Unavailable {
                    backend: "source backends".to_string(),
                    reason: last_failure.unwrap_or_default(),
                });
            }
        }

        debug!(
            "Fetched {} of {} sources for {}",
            records.len(),
            self.backends.len(),
            property_id
        );

        Ok(records)
    }
}
