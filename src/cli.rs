//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::models::PropertyInput;

/// propinsight - reconcile property records from multiple sources
///
/// Pulls a property's records from every configured source, detects
/// field-level conflicts, recommends a value per field with a confidence
/// score, and writes a Markdown/JSON report with an optional local-LLM
/// narrative.
///
/// Examples:
///   propinsight search "palo alto"
///   propinsight analyze prop_001
///   propinsight analyze prop_003 --format json --output prop_003.json
///   propinsight analyze-input --address "1 Main St" --price 850000 --bedrooms 2
///   propinsight --no-narrative session
///   propinsight --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .propinsight.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Ollama model used for the narrative
    #[arg(short, long, env = "PROPINSIGHT_MODEL", global = true)]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL", global = true)]
    pub ollama_url: Option<String>,

    /// Narrative request timeout in seconds
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Skip narrative generation and report the structured analysis only
    #[arg(long, global = true)]
    pub no_narrative: bool,

    /// JSON catalog of properties and source payloads
    ///
    /// Replaces the built-in sample catalog.
    #[arg(long, value_name = "FILE", env = "PROPINSIGHT_DATA", global = true)]
    pub data: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT", global = true)]
    pub format: OutputFormat,

    /// Output file path for the report
    ///
    /// Without it the report is printed to stdout.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub output: Option<PathBuf>,

    /// Fail if the overall confidence is below this value (0.0 - 1.0)
    ///
    /// Exit code 2 when the analysis falls short.
    #[arg(long, value_name = "SCORE", global = true)]
    pub min_confidence: Option<f64>,

    /// Generate a default .propinsight.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Search properties by address, city, or zip
    Search {
        /// Search text; shorter than two characters lists the default page
        query: Option<String>,
    },

    /// Reconcile all sources for a property id
    Analyze {
        /// Property id, e.g. prop_001
        property_id: String,
    },

    /// Analyze values you supply as a single source
    AnalyzeInput(InputArgs),

    /// Check whether the narrative generator is reachable
    Health,

    /// Interactive search/select loop on stdin
    Session,
}

/// Property fields for `analyze-input`.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct InputArgs {
    #[arg(long)]
    pub address: Option<String>,

    #[arg(long)]
    pub price: Option<f64>,

    #[arg(long)]
    pub bedrooms: Option<u32>,

    #[arg(long)]
    pub bathrooms: Option<f64>,

    #[arg(long)]
    pub square_feet: Option<f64>,

    #[arg(long)]
    pub year_built: Option<i32>,

    #[arg(long)]
    pub description: Option<String>,
}

impl From<&InputArgs> for PropertyInput {
    fn from(args: &InputArgs) -> Self {
        PropertyInput {
            address: args.address.clone(),
            price: args.price,
            bedrooms: args.bedrooms,
            bathrooms: args.bathrooms,
            square_feet: args.square_feet,
            year_built: args.year_built,
            description: args.description.clone(),
        }
    }
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.command.is_none() {
            return Err(
                "A command is required (search, analyze, analyze-input, health, session)"
                    .to_string(),
            );
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(min) = self.min_confidence {
            if !(0.0..=1.0).contains(&min) {
                return Err("Minimum confidence must be between 0.0 and 1.0".to_string());
            }
        }

        if let Some(ref data) = self.data {
            if !data.is_file() {
                return Err(format!("Data file does not exist: {}", data.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
