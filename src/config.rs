//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.propinsight.toml` files.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::Field;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".propinsight.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Narrative model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Source store settings.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Reconciliation rules.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Summary thresholds.
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Report output path; reports go to stdout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: None,
            verbose: false,
        }
    }
}

/// Narrative generator (Ollama) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Ollama API URL.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Temperature for the analysis text.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Narrative generation timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// When false, analyses are structured-only.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            ollama_url: default_ollama_url(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            enabled: true,
        }
    }
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    120 // LLM generation can take up to 2 minutes
}

fn default_true() -> bool {
    true
}

/// Source store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Maximum concurrent backend fetches.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,

    /// Per-backend fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,

    /// Search and lookup timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub search_timeout_seconds: u64,

    /// JSON catalog replacing the built-in sample data.
    #[serde(default)]
    pub data_file: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            fan_out: default_fan_out(),
            fetch_timeout_seconds: default_fetch_timeout(),
            search_timeout_seconds: default_fetch_timeout(),
            data_file: None,
        }
    }
}

fn default_fan_out() -> usize {
    3
}

fn default_fetch_timeout() -> u64 {
    10
}

/// Reconciliation rules: tolerances, source weighting, confidence constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Relative spread tolerated for price.
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance: f64,

    /// Relative spread tolerated for square footage.
    #[serde(default = "default_square_feet_tolerance")]
    pub square_feet_tolerance: f64,

    /// Relative spread tolerated for lot size.
    #[serde(default = "default_lot_size_tolerance")]
    pub lot_size_tolerance: f64,

    /// Absolute spread tolerated for bathrooms (half-bath ambiguity).
    #[serde(default = "default_bathrooms_step")]
    pub bathrooms_step: f64,

    /// Static trust weight per source name.
    #[serde(default)]
    pub trust_weights: BTreeMap<String, f64>,

    /// Trust weight for sources not listed in `trust_weights`.
    #[serde(default = "default_one")]
    pub default_trust: f64,

    /// Age (days) at which a record's recency weight halves.
    #[serde(default = "default_half_life")]
    pub recency_half_life_days: f64,

    /// Recency weight for records without `last_updated`.
    #[serde(default = "default_undated_recency")]
    pub undated_recency: f64,

    /// Sources authoritative for legal fields (year built, lot size).
    #[serde(default = "default_authority_sources")]
    pub authority_sources: Vec<String>,

    /// Weight multiplier for authority sources on legal fields.
    #[serde(default = "default_authority_boost")]
    pub authority_boost: f64,

    /// Confidence when every source agrees, before the coverage bonus.
    #[serde(default = "default_agreement_base")]
    pub agreement_base: f64,

    /// Lower clamp for conflicting-field confidence.
    #[serde(default = "default_conflict_floor")]
    pub conflict_confidence_floor: f64,

    /// Upper clamp for conflicting-field confidence.
    #[serde(default = "default_conflict_ceiling")]
    pub conflict_confidence_ceiling: f64,

    /// Importance weight per field name for overall confidence.
    #[serde(default = "default_importance")]
    pub importance: BTreeMap<String, f64>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            price_tolerance: default_price_tolerance(),
            square_feet_tolerance: default_square_feet_tolerance(),
            lot_size_tolerance: default_lot_size_tolerance(),
            bathrooms_step: default_bathrooms_step(),
            trust_weights: BTreeMap::new(),
            default_trust: default_one(),
            recency_half_life_days: default_half_life(),
            undated_recency: default_undated_recency(),
            authority_sources: default_authority_sources(),
            authority_boost: default_authority_boost(),
            agreement_base: default_agreement_base(),
            conflict_confidence_floor: default_conflict_floor(),
            conflict_confidence_ceiling: default_conflict_ceiling(),
            importance: default_importance(),
        }
    }
}

impl ReconcileConfig {
    /// Static trust weight for a source.
    pub fn trust_for(&self, source: &str) -> f64 {
        self.trust_weights
            .get(source)
            .copied()
            .unwrap_or(self.default_trust)
    }

    /// Whether a source is authoritative for legal fields.
    pub fn is_authority(&self, source: &str) -> bool {
        self.authority_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(source))
    }

    /// Importance weight of a field (defaults to 1.0).
    pub fn importance_of(&self, field: Field) -> f64 {
        self.importance.get(field.name()).copied().unwrap_or(1.0)
    }
}

fn default_price_tolerance() -> f64 {
    0.05
}

fn default_square_feet_tolerance() -> f64 {
    0.03
}

fn default_lot_size_tolerance() -> f64 {
    0.05
}

fn default_bathrooms_step() -> f64 {
    0.5
}

fn default_one() -> f64 {
    1.0
}

fn default_half_life() -> f64 {
    90.0
}

fn default_undated_recency() -> f64 {
    0.5
}

fn default_authority_sources() -> Vec<String> {
    vec!["Public Records".to_string()]
}

fn default_authority_boost() -> f64 {
    2.0
}

fn default_agreement_base() -> f64 {
    0.7
}

fn default_conflict_floor() -> f64 {
    0.2
}

fn default_conflict_ceiling() -> f64 {
    0.9
}

fn default_importance() -> BTreeMap<String, f64> {
    [
        ("price", 3.0),
        ("bedrooms", 3.0),
        ("bathrooms", 2.0),
        ("square_feet", 2.0),
        ("year_built", 1.0),
        ("lot_size", 1.0),
        ("property_type", 1.0),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Thresholds for highlights and concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Relative spread above which a conflict becomes a concern.
    #[serde(default = "default_material_spread")]
    pub material_spread: f64,

    /// A home built within this many years is "recent".
    #[serde(default = "default_recent_build_years")]
    pub recent_build_years: i32,

    /// A home older than this many years gets an inspection concern.
    #[serde(default = "default_historic_build_years")]
    pub historic_build_years: i32,

    /// Interior area (sqft) considered spacious.
    #[serde(default = "default_large_square_feet")]
    pub large_square_feet: f64,

    /// Lot area (sqft) considered large.
    #[serde(default = "default_large_lot_size")]
    pub large_lot_size: f64,

    /// Bedroom count considered family-sized.
    #[serde(default = "default_many_bedrooms")]
    pub many_bedrooms: u32,

    /// Fields whose absence is raised as a concern.
    #[serde(default = "default_important_fields")]
    pub important_fields: Vec<String>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            material_spread: default_material_spread(),
            recent_build_years: default_recent_build_years(),
            historic_build_years: default_historic_build_years(),
            large_square_feet: default_large_square_feet(),
            large_lot_size: default_large_lot_size(),
            many_bedrooms: default_many_bedrooms(),
            important_fields: default_important_fields(),
        }
    }
}

impl SummaryConfig {
    pub fn is_important(&self, field: Field) -> bool {
        self.important_fields.iter().any(|f| f == field.name())
    }
}

fn default_material_spread() -> f64 {
    0.10
}

fn default_recent_build_years() -> i32 {
    20
}

fn default_historic_build_years() -> i32 {
    90
}

fn default_large_square_feet() -> f64 {
    2500.0
}

fn default_large_lot_size() -> f64 {
    7000.0
}

fn default_many_bedrooms() -> u32 {
    4
}

fn default_important_fields() -> Vec<String> {
    vec!["price".to_string(), "bedrooms".to_string()]
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Include the per-source data table.
    #[serde(default = "default_true")]
    pub include_sources: bool,

    /// Include per-field reasoning in the reconciliation table.
    #[serde(default = "default_true")]
    pub include_reasoning: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            include_sources: true,
            include_reasoning: true,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Check values that would make reconciliation meaningless.
    pub fn validate(&self) -> Result<()> {
        let r = &self.reconcile;

        for (name, tolerance) in [
            ("price_tolerance", r.price_tolerance),
            ("square_feet_tolerance", r.square_feet_tolerance),
            ("lot_size_tolerance", r.lot_size_tolerance),
            ("bathrooms_step", r.bathrooms_step),
        ] {
            if !(tolerance >= 0.0) {
                bail!("reconcile.{} must be non-negative", name);
            }
        }

        if !(0.0..=1.0).contains(&r.agreement_base) {
            bail!("reconcile.agreement_base must be between 0.0 and 1.0");
        }

        if r.conflict_confidence_floor > r.conflict_confidence_ceiling
            || r.conflict_confidence_floor < 0.0
            || r.conflict_confidence_ceiling > 1.0
        {
            bail!("reconcile conflict confidence bounds must satisfy 0 <= floor <= ceiling <= 1");
        }

        if r.recency_half_life_days <= 0.0 {
            bail!("reconcile.recency_half_life_days must be positive");
        }

        if r.trust_weights.values().any(|w| *w < 0.0) || r.default_trust < 0.0 {
            bail!("reconcile trust weights must be non-negative");
        }

        if let Some(unknown) = r.importance.keys().find(|k| Field::from_name(k).is_none()) {
            bail!("reconcile.importance has unknown field '{}'", unknown);
        }

        if self.sources.fan_out == 0 {
            bail!("sources.fan_out must be at least 1");
        }

        Ok(())
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.model.name = model.clone();
        }
        if let Some(ref url) = args.ollama_url {
            self.model.ollama_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }
        if args.no_narrative {
            self.model.enabled = false;
        }

        if let Some(ref data) = args.data {
            self.sources.data_file = Some(data.display().to_string());
        }

        if let Some(ref output) = args.output {
            self.general.output = Some(output.display().to_string());
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model.name, "llama3.2:latest");
        assert_eq!(config.model.timeout_seconds, 120);
        assert_eq!(config.reconcile.price_tolerance, 0.05);
        assert_eq!(config.reconcile.importance_of(Field::Price), 3.0);
        assert!(config.reconcile.is_authority("public records"));
        assert!(config.summary.is_important(Field::Bedrooms));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true

[model]
name = "mistral:latest"
enabled = false

[reconcile]
price_tolerance = 0.08

[reconcile.trust_weights]
Redfin = 1.5
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output.as_deref(), Some("custom_report.md"));
        assert!(config.general.verbose);
        assert_eq!(config.model.name, "mistral:latest");
        assert!(!config.model.enabled);
        assert_eq!(config.reconcile.price_tolerance, 0.08);
        assert_eq!(config.reconcile.square_feet_tolerance, 0.03);
        assert_eq!(config.reconcile.trust_for("Redfin"), 1.5);
        assert_eq!(config.reconcile.trust_for("Zillow"), 1.0);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.reconcile.conflict_confidence_floor = 0.95;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reconcile.importance.insert("garage".to_string(), 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sources]\nfan_out = 2\nfetch_timeout_seconds = 3").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sources.fan_out, 2);
        assert_eq!(config.sources.fetch_timeout_seconds, 3);
        assert_eq!(config.sources.search_timeout_seconds, 10);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[model]"));
        assert!(toml_str.contains("[reconcile]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.reconcile.importance.len(), 7);
    }
}
