use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::feed::Article;
use crate::settings::ScorerSettings;

pub mod providers;

use providers::{build_provider, resolve_key, resolve_provider_selection, Provider, ToolSpec};

const TOOL_NAME: &str = "deliver_scorecard";
const SYSTEM_PROMPT: &str = include_str!("prompts/system_prompt.tera");

#[derive(Debug, Clone, Default)]
pub struct ScoreOptions {
    pub model: Option<String>,
    pub key: Option<String>,
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct ScoreReport {
    pub generated_at: String,
    pub model: String,
    pub entries: Vec<ScoreEntry>,
}

#[derive(Debug, Serialize)]
pub struct ScoreEntry {
    pub title: String,
    pub score: Option<u8>,
    pub caption: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn tool_spec() -> ToolSpec {
    ToolSpec {
        name: TOOL_NAME.to_string(),
        description: "Deliver the virality verdict for one article".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "score": {
                    "type": "number",
                    "description": "Virality score from 0 to 100"
                },
                "caption": {
                    "type": "string",
                    "description": "Suggested post caption"
                }
            },
            "required": ["score", "caption"]
        }),
    }
}

fn render_system_prompt(settings: &ScorerSettings, tool_name: &str) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("page_name", &settings.page_name);
    context.insert("language", &settings.language);
    context.insert("tool_name", tool_name);
    tera::Tera::one_off(SYSTEM_PROMPT, &context, false)
        .with_context(|| "failed to render scorer system prompt")
}

fn article_prompt(article: &Article) -> String {
    json!({
        "title": article.title(),
        "category": article.category(),
        "source": article.source(),
        "published_date": article.date(),
    })
    .to_string()
}

/// Tool arguments arrive in whatever shape the model felt like. Accept a
/// numeric score or a numeric string, clamp into 0..=100, and tolerate a
/// missing caption.
fn parse_tool_args(args: &Value) -> (Option<u8>, String) {
    let score = match args.get("score") {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
    .map(|raw| raw.round().clamp(0.0, 100.0) as u8);

    let caption = args
        .get("caption")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    (score, caption)
}

pub async fn score_articles(
    settings: &ScorerSettings,
    articles: &[Article],
    options: &ScoreOptions,
) -> Result<ScoreReport> {
    let selection =
        resolve_provider_selection(options.model.as_deref(), options.key.as_deref())?;
    let key = resolve_key(selection.provider, options.key.as_deref())?;
    let model = selection
        .requested_model
        .unwrap_or_else(|| selection.provider.default_model().to_string());
    info!("scoring with {} ({})", selection.provider.as_str(), model);

    let system_prompt = render_system_prompt(settings, TOOL_NAME)?;
    let base = build_provider(selection.provider, key, model.clone())
        .append_system_input(system_prompt)
        .register_tool(tool_spec());

    let limit = if options.limit == 0 {
        articles.len()
    } else {
        options.limit.min(articles.len())
    };

    let mut entries = Vec::with_capacity(limit);
    for article in &articles[..limit] {
        let title = article.title().to_string();
        let result = base
            .clone()
            .append_user_input(article_prompt(article))
            .call_tool(TOOL_NAME)
            .await;
        let entry = match result {
            Ok(args) => {
                let (score, caption) = parse_tool_args(&args);
                ScoreEntry {
                    title,
                    score,
                    caption,
                    error: None,
                }
            }
            Err(err) => {
                warn!("scoring failed for '{}': {:#}", title, err);
                ScoreEntry {
                    title,
                    score: None,
                    caption: String::new(),
                    error: Some(format!("{:#}", err)),
                }
            }
        };
        entries.push(entry);
    }

    Ok(ScoreReport {
        generated_at: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .with_context(|| "failed to format timestamp")?,
        model,
        entries,
    })
}

pub fn write_report(report: &ScoreReport, out: Option<&Path>) -> Result<()> {
    let body =
        serde_json::to_string_pretty(report).with_context(|| "failed to serialize score report")?;
    match out {
        Some(path) => {
            std::fs::write(path, &body)
                .with_context(|| format!("failed to write report: {}", path.display()))?;
            info!("score report -> {}", path.display());
        }
        None => println!("{}", body),
    }
    Ok(())
}
