//! Ollama-backed narrative generator.
//!
//! Two chat requests per analysis: one for the written analysis, one for
//! a JSON array of insights. A failed insight request falls back to a
//! fixed set of generic recommendations.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Narrative, NarrativeContext, NarrativeGenerator};
use crate::config::ModelConfig;
use crate::error::NarrativeError;
use crate::models::{group_thousands, Field, FieldValue, SourceRecord};

const HEALTH_TIMEOUT_SECONDS: u64 = 5;
const INSIGHTS_TEMPERATURE: f32 = 0.5;
const MAX_INSIGHTS: usize = 6;

const FALLBACK_INSIGHTS: &[&str] = &[
    "Verify conflicting data points with additional sources",
    "Obtain missing critical information before making decisions",
    "Schedule professional property inspection",
];

const ANALYST_SYSTEM_PROMPT: &str = r#"You are a real estate analyst specializing in data quality and property evaluation.
Focus on:
- Assessing data reliability and conflicts
- Property value and market positioning
- Critical missing information
- Recommendations for further investigation
- Overall property assessment

Be transparent about data quality issues."#;

/// Chat message for the Ollama API.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

/// Narrative generator talking to a local Ollama server.
pub struct OllamaNarrator {
    http_client: reqwest::Client,
    ollama_url: String,
    model_name: String,
    temperature: f32,
    timeout_seconds: u64,
}

impl OllamaNarrator {
    pub fn new(config: &ModelConfig) -> Result<Self, NarrativeError> {
        info!(
            "Initializing narrator with model {} at {}",
            config.name, config.ollama_url
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| NarrativeError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            ollama_url: config.ollama_url.trim_end_matches('/').to_string(),
            model_name: config.name.clone(),
            temperature: config.temperature,
            timeout_seconds: config.timeout_seconds,
        })
    }

    async fn chat(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        temperature: f32,
    ) -> Result<String, NarrativeError> {
        let url = format!("{}/api/chat", self.ollama_url);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", prompt));

        let request = OllamaChatRequest {
            model: self.model_name.clone(),
            messages,
            stream: false,
            options: OllamaOptions { temperature },
        };

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NarrativeError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| NarrativeError::Parse(e.to_string()))?;

        Ok(chat_response.message.content)
    }

    fn map_request_error(&self, e: reqwest::Error) -> NarrativeError {
        if e.is_timeout() {
            NarrativeError::Timeout {
                seconds: self.timeout_seconds,
            }
        } else if e.is_connect() {
            NarrativeError::Connect {
                url: self.ollama_url.clone(),
            }
        } else {
            NarrativeError::Api {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                body: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl NarrativeGenerator for OllamaNarrator {
    async fn generate(&self, context: &NarrativeContext<'_>) -> Result<Narrative, NarrativeError> {
        debug!("Requesting analysis for {}", context.address);
        let analysis = self
            .chat(
                Some(ANALYST_SYSTEM_PROMPT),
                &analysis_prompt(context),
                self.temperature,
            )
            .await?;

        let insights = match self
            .chat(None, &insights_prompt(context, &analysis), INSIGHTS_TEMPERATURE)
            .await
        {
            Ok(response) => parse_insights(&response),
            Err(e) => {
                warn!("Insight generation failed, using defaults: {}", e);
                Vec::new()
            }
        };

        let insights = if insights.is_empty() {
            FALLBACK_INSIGHTS.iter().map(|s| s.to_string()).collect()
        } else {
            insights
        };

        Ok(Narrative {
            analysis: analysis.trim().to_string(),
            insights,
        })
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.ollama_url);
        match self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECONDS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama health check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

fn or_missing(value: Option<String>) -> String {
    value.unwrap_or_else(|| "[MISSING]".to_string())
}

/// One block per source, with every tracked field and `[MISSING]` gaps.
fn format_sources(sources: &[SourceRecord]) -> String {
    let mut text = String::new();

    for record in sources {
        text.push_str(&format!("SOURCE: {}\n", record.source));
        text.push_str(&format!(
            "  Price: {}\n",
            or_missing(record.price.map(|p| format!("${}", group_thousands(p))))
        ));
        text.push_str(&format!(
            "  Bedrooms: {}\n",
            or_missing(record.bedrooms.map(|b| b.to_string()))
        ));
        text.push_str(&format!(
            "  Bathrooms: {}\n",
            or_missing(
                record
                    .bathrooms
                    .map(|b| Field::Bathrooms.format_value(&FieldValue::Numeric(b)))
            )
        ));
        text.push_str(&format!(
            "  Square Feet: {}\n",
            or_missing(record.square_feet.map(group_thousands))
        ));
        text.push_str(&format!(
            "  Year Built: {}\n",
            or_missing(record.year_built.map(|y| y.to_string()))
        ));
        text.push_str(&format!(
            "  Lot Size: {}\n",
            or_missing(record.lot_size.map(group_thousands))
        ));
        text.push_str(&format!(
            "  Type: {}\n",
            or_missing(record.property_type.clone())
        ));
        text.push_str(&format!(
            "  Last Updated: {}\n",
            or_missing(record.last_updated.map(|d| d.to_string()))
        ));
    }

    text
}

/// Prompt for the written analysis.
fn analysis_prompt(context: &NarrativeContext<'_>) -> String {
    let summary = context.summary;
    let resolution = context.resolution;

    let missing = if resolution.missing_fields.is_empty() {
        "None".to_string()
    } else {
        resolution
            .missing_fields
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Provide a comprehensive analysis for this property: {}\n\n",
        context.address
    ));

    prompt.push_str("UNIFIED PROPERTY DATA:\n");
    prompt.push_str(&format!(
        "- Price: {}\n",
        or_missing(summary.price.map(|p| format!("${}", group_thousands(p))))
    ));
    prompt.push_str(&format!(
        "- Bedrooms: {}\n",
        or_missing(summary.bedrooms.map(|b| b.to_string()))
    ));
    prompt.push_str(&format!(
        "- Bathrooms: {}\n",
        or_missing(
            summary
                .bathrooms
                .map(|b| Field::Bathrooms.format_value(&FieldValue::Numeric(b)))
        )
    ));
    prompt.push_str(&format!(
        "- Square Feet: {}\n",
        or_missing(summary.square_feet.map(group_thousands))
    ));
    prompt.push_str(&format!(
        "- Year Built: {}\n",
        or_missing(summary.year_built.map(|y| y.to_string()))
    ));
    prompt.push_str(&format!(
        "- Lot Size: {}\n",
        or_missing(summary.lot_size.map(group_thousands))
    ));
    prompt.push_str(&format!(
        "- Type: {}\n\n",
        or_missing(summary.property_type.clone())
    ));

    prompt.push_str("DATA FROM SOURCES:\n");
    prompt.push_str(&format_sources(context.sources));
    prompt.push('\n');

    prompt.push_str("DATA QUALITY:\n");
    prompt.push_str(&format!("- Sources: {}\n", context.sources.len()));
    prompt.push_str(&format!(
        "- Overall Confidence: {:.0}%\n",
        resolution.overall_confidence * 100.0
    ));
    prompt.push_str(&format!(
        "- Conflicts Found: {}\n",
        resolution.conflicting_fields().len()
    ));
    prompt.push_str(&format!("- Missing Fields: {}\n", missing));
    prompt.push_str(&format!(
        "- Conflict Summary: {}\n\n",
        resolution.conflict_summary
    ));

    for fa in resolution.field_analyses.iter().filter(|fa| fa.conflicts) {
        prompt.push_str(&format!("- {}: {}\n", fa.field_name.label(), fa.reasoning));
    }

    prompt.push_str(
        "\nYour analysis should:\n\
         1. Assess the reliability of the available data\n\
         2. Evaluate the property based on confirmed information\n\
         3. Highlight what's missing and why it matters\n\
         4. Provide actionable recommendations\n\
         5. Give an honest assessment of whether there's enough good data to make a decision\n\n\
         Write 3-4 clear paragraphs.",
    );

    prompt
}

/// Prompt for the insight list.
fn insights_prompt(context: &NarrativeContext<'_>, analysis: &str) -> String {
    let summary = context.summary;

    format!(
        "Based on this property analysis, provide 4-6 key actionable insights.\n\n\
         PROPERTY SUMMARY:\n\
         Price: {}\n\
         Type: {}\n\
         Confidence: {:.0}%\n\n\
         ANALYSIS:\n{}\n\n\
         Provide ONLY a JSON array of insights:\n\
         [\"insight 1\", \"insight 2\", \"insight 3\", ...]\n\n\
         Focus on:\n\
         - Data verification steps needed\n\
         - Critical missing information to obtain\n\
         - Property evaluation recommendations\n\
         - Risk factors to investigate",
        or_missing(summary.price.map(|p| format!("${}", group_thousands(p)))),
        or_missing(summary.property_type.clone()),
        context.resolution.overall_confidence * 100.0,
        analysis
    )
}

/// Extract insights from a model response.
///
/// Prefers the outermost `[...]` JSON array; otherwise takes non-empty
/// lines with bullet or numbering stripped. At most six are kept.
pub fn parse_insights(response: &str) -> Vec<String> {
    if let (Some(start), Some(end)) = (response.find('['), response.rfind(']')) {
        if end > start {
            if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&response[start..=end]) {
                return items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s.trim().to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .take(MAX_INSIGHTS)
                    .collect();
            }
        }
    }

    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || matches!(c, '•' | '-' | '*' | '.' | ')' | ' ')
                })
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_INSIGHTS)
        .collect()
}
