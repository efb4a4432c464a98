//! propinsight - multi-source property record reconciliation
//!
//! A CLI tool that gathers a property's records from several listing
//! sources, detects field-level conflicts, recommends a value per field
//! with a confidence score, and reports the result with an optional
//! narrative from a local Ollama model.
//!
//! Exit codes:
//!   0 - Success (including partial results without a narrative)
//!   1 - Runtime error (no data, unknown property, config, timeout, etc.)
//!   2 - Overall confidence below --min-confidence

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod narrative;
mod orchestrator;
mod report;
mod sources;

use anyhow::{bail, Context, Result};
use cli::{Args, Command, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use error::AnalysisError;
use indicatif::{ProgressBar, ProgressStyle};
use models::{PropertyAnalysis, PropertyInput, PropertySearchResult};
use narrative::{DisabledNarrator, NarrativeGenerator, OllamaNarrator};
use orchestrator::{AnalysisOrchestrator, AnalysisState, PropertyService, ServiceSettings};
use report::ReportMetadata;
use sources::{Catalog, FanOutStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config decides verbosity too, so load it before logging starts
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(&args, &config);

    info!("propinsight v{}", env!("CARGO_PKG_VERSION"));
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .propinsight.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to tune tolerances, source trust, and the narrative model.");
    Ok(())
}

/// Initialize logging on stderr so reports on stdout stay clean.
fn init_logging(args: &Args, config: &Config) {
    let level = if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Load configuration from the explicit path, the working directory, or defaults.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    if let Some(ref config_path) = args.config {
        return Ok((Config::load(config_path)?, Some(config_path.clone())));
    }

    match Config::load_default()? {
        Some(config) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        None => Ok((Config::default(), None)),
    }
}

/// Wire the catalog, source store and narrator into a service.
fn build_service(config: &Config) -> Result<PropertyService> {
    let catalog = match config.sources.data_file {
        Some(ref path) => {
            info!("Using catalog: {}", path);
            Catalog::load(Path::new(path)).context("Failed to load property catalog")?
        }
        None => Catalog::sample().context("Failed to load sample catalog")?,
    };
    if catalog.is_empty() {
        warn!("Property catalog is empty");
    } else {
        debug!("Catalog holds {} properties", catalog.len());
    }

    let store = FanOutStore::new(
        catalog.backends(),
        config.sources.fan_out,
        Duration::from_secs(config.sources.fetch_timeout_seconds),
    );

    let narrator: Arc<dyn NarrativeGenerator> = if config.model.enabled {
        Arc::new(OllamaNarrator::new(&config.model)?)
    } else {
        info!("Narrative generation disabled");
        Arc::new(DisabledNarrator)
    };

    Ok(PropertyService::new(
        Arc::new(catalog),
        Arc::new(store),
        narrator,
        ServiceSettings::from_config(config),
    ))
}

/// Dispatch the subcommand. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let service = Arc::new(build_service(&config)?);
    let orchestrator = AnalysisOrchestrator::new(service);

    match args.command.clone() {
        Some(Command::Search { query }) => {
            handle_search(&orchestrator, query.as_deref().unwrap_or(""), &args).await
        }
        Some(Command::Analyze { property_id }) => {
            handle_analyze(&orchestrator, &property_id, &args, &config).await
        }
        Some(Command::AnalyzeInput(fields)) => {
            handle_analyze_input(&orchestrator, PropertyInput::from(&fields), &args, &config)
                .await
        }
        Some(Command::Health) => handle_health(&orchestrator, &args).await,
        Some(Command::Session) => run_session(&orchestrator).await,
        None => bail!("No command given"),
    }
}

async fn handle_search(
    orchestrator: &AnalysisOrchestrator,
    query: &str,
    args: &Args,
) -> Result<i32> {
    let results = orchestrator.search(query).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
        OutputFormat::Markdown => print_results(&results),
    }

    Ok(0)
}

fn print_results(results: &[PropertySearchResult]) {
    if results.is_empty() {
        println!("No matching properties.");
        return;
    }
    for (i, property) in results.iter().enumerate() {
        println!("{:>2}. {:<10} {}", i + 1, property.id, property.address);
    }
}

async fn handle_analyze(
    orchestrator: &AnalysisOrchestrator,
    property_id: &str,
    args: &Args,
    config: &Config,
) -> Result<i32> {
    let start_time = Instant::now();
    let spinner = spinner(args.quiet, format!("Analyzing {}...", property_id));

    orchestrator.select(property_id)?;
    let state = orchestrator.settled().await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let (analysis, narrative_error, generation) = match state {
        AnalysisState::Complete {
            analysis,
            generation,
            ..
        } => (analysis.as_ref().clone(), None, generation),
        AnalysisState::Failed {
            error, generation, ..
        } => match error.partial() {
            Some(partial) => (partial.clone(), Some(narrative_reason(&error)), generation),
            None => bail!("{}: {}", error.kind().label(), error),
        },
        other => bail!("Analysis did not finish (state: {})", other.phase()),
    };

    let metadata = ReportMetadata {
        model_used: orchestrator.service().narrator_name().to_string(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
        generation: Some(generation),
        narrative_error,
    };

    emit_report(&analysis, &metadata, args, config)
}

async fn handle_analyze_input(
    orchestrator: &AnalysisOrchestrator,
    input: PropertyInput,
    args: &Args,
    config: &Config,
) -> Result<i32> {
    let start_time = Instant::now();
    let spinner = spinner(args.quiet, "Analyzing supplied values...".to_string());

    let outcome = orchestrator.service().analyze_by_raw_input(&input).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let (analysis, narrative_error) = match outcome {
        Ok(analysis) => (analysis, None),
        Err(e) => match e.partial() {
            Some(partial) => (partial.clone(), Some(narrative_reason(&e))),
            None => bail!("{}: {}", e.kind().label(), e),
        },
    };

    let metadata = ReportMetadata {
        model_used: orchestrator.service().narrator_name().to_string(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
        generation: None,
        narrative_error,
    };

    emit_report(&analysis, &metadata, args, config)
}

fn narrative_reason(error: &AnalysisError) -> String {
    match error {
        AnalysisError::NarrativeUnavailable { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Render, write or print the report, and apply --min-confidence.
fn emit_report(
    analysis: &PropertyAnalysis,
    metadata: &ReportMetadata,
    args: &Args,
    config: &Config,
) -> Result<i32> {
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(analysis)?,
        OutputFormat::Markdown => {
            report::generate_markdown_report(analysis, metadata, &config.report)
        }
    };

    let output_path = config.general.output.as_deref().map(Path::new);
    match output_path {
        Some(path) => {
            report::write_report(&output, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        None => println!("{}", output),
    }

    if let Some(ref reason) = metadata.narrative_error {
        warn!("Partial analysis, narrative unavailable: {}", reason);
    }

    if !args.quiet {
        let resolution = &analysis.conflict_resolution;
        eprintln!("\n📊 Analysis Summary:");
        eprintln!("   Property: {}", analysis.address);
        eprintln!("   Sources: {}", analysis.data_sources.len());
        eprintln!(
            "   Fields: {} reported, {} conflicting, {} missing",
            resolution.field_analyses.len(),
            resolution.conflicting_fields().len(),
            resolution.missing_fields.len()
        );
        eprintln!(
            "   Overall confidence: {:.0}%",
            analysis.confidence_score * 100.0
        );
        eprintln!("   Duration: {:.1}s", metadata.duration_seconds);
        if let Some(path) = output_path {
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
    }

    if let Some(min) = args.min_confidence {
        if analysis.confidence_score < min {
            eprintln!(
                "\n⛔ Confidence {:.2} is below --min-confidence {:.2} (exit code 2).",
                analysis.confidence_score, min
            );
            return Ok(2);
        }
    }

    Ok(0)
}

async fn handle_health(orchestrator: &AnalysisOrchestrator, args: &Args) -> Result<i32> {
    let health = orchestrator.service().health().await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&health)?),
        OutputFormat::Markdown => println!(
            "status: {} (narrative generator {})",
            health.status,
            if health.dependency_available {
                "available"
            } else {
                "unavailable"
            }
        ),
    }

    Ok(0)
}

fn spinner(quiet: bool, message: String) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message);
    Some(pb)
}

const SESSION_HELP: &str = "commands: search <query> | select <id or #> | reanalyze | status | quit";

/// Line-oriented session over stdin; prints every state change.
async fn run_session(orchestrator: &AnalysisOrchestrator) -> Result<i32> {
    println!("{}", SESSION_HELP);

    let mut changes = orchestrator.subscribe();
    let watcher = tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let line = describe_state(&changes.borrow_and_update());
            println!("{}", line);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_results: Vec<PropertySearchResult> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => continue,
            "quit" | "exit" => break,
            "help" => println!("{}", SESSION_HELP),
            "search" => match orchestrator.search(rest).await {
                Ok(results) => {
                    print_results(&results);
                    last_results = results;
                }
                Err(e) => println!("search failed: {}", e),
            },
            "select" => {
                let property_id = match rest.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= last_results.len() => last_results[n - 1].id.clone(),
                    _ => rest.to_string(),
                };
                if property_id.is_empty() {
                    println!("usage: select <id or #>");
                } else if let Err(e) = orchestrator.select(&property_id) {
                    println!("{}", e);
                }
            }
            "reanalyze" => {
                if let Err(e) = orchestrator.reanalyze() {
                    println!("{}", e);
                }
            }
            "status" => {
                println!("{}", describe_state(&orchestrator.snapshot()));
                if let Some(request) = orchestrator.current_request() {
                    println!(
                        "current request: {} ({}, generation {})",
                        request.property_id, request.phase, request.generation
                    );
                }
            }
            other => println!("unknown command '{}'; {}", other, SESSION_HELP),
        }
    }

    watcher.abort();
    Ok(0)
}

fn describe_state(state: &AnalysisState) -> String {
    match state {
        AnalysisState::Idle => "idle".to_string(),
        AnalysisState::Searching {
            query,
            results,
            generation,
        } => format!(
            "[gen {}] searching '{}': {} result(s)",
            generation,
            query,
            results.len()
        ),
        AnalysisState::Analyzing {
            property_id,
            generation,
        } => format!("[gen {}] analyzing {}...", generation, property_id),
        AnalysisState::Complete {
            property_id,
            generation,
            analysis,
        } => {
            let summary = &analysis.property_summary;
            format!(
                "[gen {}] complete {}: {} | confidence {:.0}% | {}{}",
                generation,
                property_id,
                analysis.address,
                analysis.confidence_score * 100.0,
                analysis.conflict_resolution.conflict_summary,
                if summary.concerns.is_empty() {
                    String::new()
                } else {
                    format!(" | concerns: {}", summary.concerns.join("; "))
                }
            )
        }
        AnalysisState::Failed {
            property_id,
            generation,
            error,
        } => match error.partial() {
            Some(partial) => format!(
                "[gen {}] {} {}: confidence {:.0}%, {}",
                generation,
                error.kind().label(),
                property_id,
                partial.confidence_score * 100.0,
                narrative_reason(error)
            ),
            None => format!(
                "[gen {}] {} {}: {}",
                generation,
                error.kind().label(),
                property_id,
                error
            ),
        },
    }
}
