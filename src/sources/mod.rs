//! Property directory and listing source access.
//!
//! A `PropertyDirectory` answers searches and id lookups; a `SourceBackend`
//! returns one provider's raw payload for a property; a `SourceStore`
//! gathers normalized records from every backend.

pub mod catalog;
pub mod normalize;
pub mod store;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{PropertySearchResult, SourceRecord};

pub use catalog::Catalog;
pub use store::FanOutStore;

/// Lookup of known properties.
#[async_trait]
pub trait PropertyDirectory: Send + Sync {
    /// Search by address, city, or zip. Short queries list a default page.
    async fn search(&self, query: &str) -> Result<Vec<PropertySearchResult>, StoreError>;

    /// Find a property by id.
    async fn get(&self, property_id: &str) -> Result<Option<PropertySearchResult>, StoreError>;
}

/// One listing provider.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    /// Provider name, used as the record's source label.
    fn name(&self) -> &str;

    /// Raw payload for a property, `Ok(None)` when the provider has no data.
    async fn fetch(&self, property_id: &str) -> Result<Option<serde_json::Value>, StoreError>;
}

/// Source of per-provider records for a property.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Normalized records in backend order. An empty list means no
    /// provider had data.
    async fn fetch_all(&self, property_id: &str) -> Result<Vec<SourceRecord>, StoreError>;
}
