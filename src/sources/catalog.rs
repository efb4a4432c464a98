//! In-memory property catalog.
//!
//! The catalog holds the property directory and the raw payload each
//! provider returns per property. A sample catalog is compiled in; a
//! JSON file with the same layout can replace it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{PropertyDirectory, SourceBackend};
use crate::error::StoreError;
use crate::models::PropertySearchResult;

const SAMPLE_CATALOG: &str = include_str!("../../data/sample_catalog.json");

/// Searches shorter than this list the default page.
const MIN_QUERY_LEN: usize = 2;

/// Size of the default page.
const DEFAULT_PAGE: usize = 5;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    properties: Vec<PropertySearchResult>,
    #[serde(default)]
    backends: Vec<BackendFile>,
}

#[derive(Debug, Deserialize)]
struct BackendFile {
    name: String,
    #[serde(default)]
    records: BTreeMap<String, serde_json::Value>,
}

/// Property directory plus per-provider payloads.
#[derive(Debug, Clone)]
pub struct Catalog {
    properties: Vec<PropertySearchResult>,
    backends: Vec<Arc<CatalogBackend>>,
}

impl Catalog {
    /// The compiled-in sample catalog.
    pub fn sample() -> Result<Self, StoreError> {
        Self::from_json(SAMPLE_CATALOG)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, StoreError> {
        let file: CatalogFile = serde_json::from_str(content)
            .map_err(|e| StoreError::Catalog(format!("invalid catalog: {}", e)))?;

        debug!(
            "Catalog loaded: {} properties, {} backends",
            file.properties.len(),
            file.backends.len()
        );

        Ok(Self {
            properties: file.properties,
            backends: file
                .backends
                .into_iter()
                .map(|b| {
                    Arc::new(CatalogBackend {
                        name: b.name,
                        records: b.records,
                    })
                })
                .collect(),
        })
    }

    /// Backends in catalog order.
    pub fn backends(&self) -> Vec<Arc<dyn SourceBackend>> {
        self.backends
            .iter()
            .map(|b| b.clone() as Arc<dyn SourceBackend>)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    fn matches(&self, query: &str) -> Vec<PropertySearchResult> {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return self.properties.iter().take(DEFAULT_PAGE).cloned().collect();
        }

        let needle = query.to_lowercase();
        self.properties
            .iter()
            .filter(|p| {
                p.address.to_lowercase().contains(&needle)
                    || p.city.to_lowercase().contains(&needle)
                    || p.zip.contains(&needle)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PropertyDirectory for Catalog {
    async fn search(&self, query: &str) -> Result<Vec<PropertySearchResult>, StoreError> {
        Ok(self.matches(query))
    }

    async fn get(&self, property_id: &str) -> Result<Option<PropertySearchResult>, StoreError> {
        Ok(self.properties.iter().find(|p| p.id == property_id).cloned())
    }
}

/// One provider's payloads from the catalog.
#[derive(Debug)]
pub struct CatalogBackend {
    name: String,
    records: BTreeMap<String, serde_json::Value>,
}

#[async_trait]
impl SourceBackend for CatalogBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, property_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self
            .records
            .get(property_id)
            .filter(|v| v.as_object().map(|o| !o.is_empty()).unwrap_or(true))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_sample_catalog_search() {
        let catalog = Catalog::sample().unwrap();
        assert_eq!(catalog.len(), 5);

        let results = catalog.search("palo").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "prop_002");

        let results = catalog.search("94607").await.unwrap();
        assert_eq!(results[0].city, "Oakland");

        assert!(catalog.search("Seattle").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_query_lists_default_page() {
        let catalog = Catalog::sample().unwrap();
        assert_eq!(catalog.search("").await.unwrap().len(), 5);
        assert_eq!(catalog.search(" a ").await.unwrap().len(), 5);
    }

    #[test]
    fn test_lookup_and_backends() {
        let catalog = Catalog::sample().unwrap();

        let found = tokio_test::block_on(catalog.get("prop_001")).unwrap().unwrap();
        assert_eq!(found.address, "123 Market Street, San Francisco, CA 94102");
        assert!(tokio_test::block_on(catalog.get("prop_999")).unwrap().is_none());

        let names: Vec<String> = catalog
            .backends()
            .iter()
            .map(|b| b.name().to_string())
            .collect();
        assert_eq!(names, vec!["Zillow", "Redfin", "Public Records"]);

        let backends = catalog.backends();
        let raw = tokio_test::block_on(backends[2].fetch("prop_001")).unwrap().unwrap();
        assert_eq!(raw["assessed_value"], serde_json::json!(1180000));
        assert!(tokio_test::block_on(backends[0].fetch("prop_999")).unwrap().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "properties": [
                    {{"id": "p1", "address": "1 Main St", "city": "Fresno", "state": "CA", "zip": "93650"}}
                ],
                "backends": [
                    {{"name": "County", "records": {{"p1": {{"assessed_value": 410000}}}}}}
                ]
            }}"#
        )
        .unwrap();

        let catalog = Catalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.backends().len(), 1);
    }

    #[test]
    fn test_invalid_catalog_is_an_error() {
        let err = Catalog::from_json("{ not json").unwrap_err();
        assert!(matches!(err, StoreError::Catalog(_)));
    }
}
