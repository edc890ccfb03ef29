//! Language-model collaborators: the batch evaluator and the query refiner,
//! both speaking to an OpenAI-compatible chat endpoint through [`ChatModel`].

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, TimeZone, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{EvaluationRequest, Evaluator, Judgment, QueryRefiner};
use crate::config::LlmConfig;
use crate::model::{Rejection, SubScores};
use crate::security::SecretValue;
use crate::ScoutError;

const PROVIDER: &str = "llm";
const SNIPPET_CHARS: usize = 300;
const RECENCY_WINDOW_DAYS: i64 = 4;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n?(.*?)\n?\s*```\s*$")
        .expect("invalid code fence regex")
});

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fence(reply: &str) -> &str {
    CODE_FENCE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|inner| inner.as_str().trim())
        .unwrap_or_else(|| reply.trim())
}

/// Minimal chat-completion seam so prompt building and parsing can be tested
/// without a network.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ScoutError>;
}

/// OpenAI-compatible `/chat/completions` client.
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: SecretValue,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig, api_key: SecretValue) -> Result<Self, ScoutError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ScoutError::provider(PROVIDER, err))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ScoutError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|err| ScoutError::provider(PROVIDER, err))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScoutError::provider(
                PROVIDER,
                format!("status {status}: {}", self.api_key.scrub(&body)),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| ScoutError::malformed(PROVIDER, err))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ScoutError::malformed(PROVIDER, "empty completion"))
    }
}

const EVALUATOR_SYSTEM: &str =
    "You score candidate news articles for an AI Product Manager briefing. Reply with JSON only.";

/// Batch evaluator that asks a chat model for per-article criterion scores.
pub struct LlmEvaluator {
    model: Arc<dyn ChatModel>,
}

impl LlmEvaluator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    #[instrument(
        name = "llm.evaluate",
        skip(self, request),
        fields(category = %request.category, batch = request.candidates.len())
    )]
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Vec<Judgment>, ScoutError> {
        let prompt = build_evaluation_prompt(&request);
        let reply = self.model.complete(EVALUATOR_SYSTEM, &prompt).await?;
        let judgments = parse_judgments(&reply)?;
        debug!(judgments = judgments.len(), "parsed evaluator reply");
        Ok(judgments)
    }
}

/// Render the scoring prompt for one batch. Weekday and dates follow the
/// local calendar, since a briefing goes out on a local day.
pub fn build_evaluation_prompt(request: &EvaluationRequest<'_>) -> String {
    evaluation_prompt_in(request, &Local)
}

fn evaluation_prompt_in<Tz: TimeZone>(request: &EvaluationRequest<'_>, zone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let now = request.now.with_timezone(zone);
    let cutoff = now.clone() - Duration::days(RECENCY_WINDOW_DAYS);
    let is_monday = now.weekday() == Weekday::Mon;
    let strict_hours = if is_monday { 72 } else { 48 };
    let day_context = if is_monday {
        "Monday, weekend gap allowed"
    } else {
        "Tuesday-Sunday, daily flow"
    };

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Evaluate these candidates for the \"{}\" section of an AI PM briefing.",
        request.category.label()
    );
    if !request.query.trim().is_empty() {
        let _ = writeln!(prompt, "\nSearch query:\n{}", request.query.trim());
    }
    let _ = writeln!(
        prompt,
        "\nToday is {} ({day_context}). Only articles from {} or later are in scope; \
         anything older than {strict_hours} hours scores 1 on recency.",
        now.format("%B %d, %Y"),
        cutoff.format("%B %d, %Y"),
    );
    prompt.push_str(
        "\nScore each article 1-5 on:\n\
         1. relevance: how directly it addresses the search query.\n\
         2. actionability: whether a PM can act on it quickly (clear, concrete, detailed).\n\
         3. source_quality: 5 = product launch or official announcement, 3 = general analysis, \
         1 = vague post without substance.\n\
         4. recency_impact: freshness and significance; republished old news scores 1.\n",
    );
    let _ = writeln!(
        prompt,
        "\nAn average of at least {:.1} means keep, otherwise discard.",
        request.threshold
    );

    let _ = writeln!(prompt, "\nArticles ({} total):", request.candidates.len());
    for (idx, candidate) in request.candidates.iter().enumerate() {
        let _ = writeln!(prompt, "\n{}. {}", idx + 1, candidate.title);
        let _ = writeln!(prompt, "   URL: {}", candidate.url);
        let _ = writeln!(
            prompt,
            "   Source: {}",
            candidate.source.as_deref().unwrap_or("Unknown")
        );
        let published = candidate
            .published_at
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let _ = writeln!(prompt, "   Published: {published}");
        if !candidate.summary.is_empty() {
            let snippet: String = candidate.summary.chars().take(SNIPPET_CHARS).collect();
            let _ = writeln!(prompt, "   Summary: {snippet}");
        }
    }

    prompt.push_str(
        "\nReturn a JSON array with one object per article, in order:\n\
         [{\"url\": \"...\", \"relevance\": 4, \"actionability\": 4, \"source_quality\": 5, \
         \"recency_impact\": 4, \"reasoning\": \"one sentence\"}]\n\
         Respond ONLY with the JSON array.",
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    #[serde(default)]
    url: Option<String>,
    #[serde(alias = "relevance_score")]
    relevance: f64,
    #[serde(alias = "actionability_score", alias = "summary_clarity_score")]
    actionability: f64,
    #[serde(alias = "source_quality_score")]
    source_quality: f64,
    #[serde(alias = "recency_score", alias = "recency")]
    recency_impact: f64,
    #[serde(default, alias = "rationale")]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JudgmentPayload {
    List(Vec<RawJudgment>),
    Wrapped { evaluations: Vec<RawJudgment> },
}

/// Parse an evaluator reply. Any structural problem is a malformed response.
pub fn parse_judgments(reply: &str) -> Result<Vec<Judgment>, ScoutError> {
    let body = strip_code_fence(reply);
    let payload: JudgmentPayload =
        serde_json::from_str(body).map_err(|err| ScoutError::malformed(PROVIDER, err))?;
    let raw = match payload {
        JudgmentPayload::List(items) => items,
        JudgmentPayload::Wrapped { evaluations } => evaluations,
    };

    Ok(raw
        .into_iter()
        .map(|item| Judgment {
            url: item.url.filter(|url| !url.trim().is_empty()),
            scores: SubScores::from_raw(
                item.relevance,
                item.actionability,
                item.source_quality,
                item.recency_impact,
            ),
            rationale: item.reasoning.trim().to_string(),
        })
        .collect())
}

const REFINER_SYSTEM: &str =
    "You refine semantic search queries for an AI news briefing. Reply with the query text only.";

/// Query refiner that rewrites the base query away from recent rejects.
pub struct LlmQueryRefiner {
    model: Arc<dyn ChatModel>,
}

impl LlmQueryRefiner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryRefiner for LlmQueryRefiner {
    #[instrument(name = "llm.refine", skip_all, fields(discarded = discarded.len()))]
    async fn refine(
        &self,
        base_query: &str,
        discarded: &[Rejection],
    ) -> Result<String, ScoutError> {
        let prompt = build_refinement_prompt(base_query, discarded);
        let reply = self.model.complete(REFINER_SYSTEM, &prompt).await?;
        parse_refined_query(&reply)
    }
}

pub fn build_refinement_prompt(base_query: &str, discarded: &[Rejection]) -> String {
    let context = if discarded.is_empty() {
        "None".to_string()
    } else {
        discarded
            .iter()
            .map(|rejection| match rejection.overall_score {
                Some(score) => format!(
                    "- {} (Score: {score:.1}) - {}",
                    rejection.url, rejection.reason
                ),
                None => format!("- {} - {}", rejection.url, rejection.reason),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Refine this search query to find better articles.\n\n\
         ORIGINAL QUERY:\n{}\n\n\
         RECENT DISCARDED RESULTS (to avoid):\n{context}\n\n\
         RULES:\n\
         1. Remove terms that led to poor results.\n\
         2. Emphasize product announcements, API releases and launches.\n\
         3. Explicitly avoid tutorials and getting started guides.\n\
         4. Keep the query concise (2-3 sentences).\n\n\
         Return ONLY the refined query text.",
        base_query.trim()
    )
}

pub fn parse_refined_query(reply: &str) -> Result<String, ScoutError> {
    let refined = strip_code_fence(reply).trim_matches('"').trim();
    if refined.is_empty() {
        return Err(ScoutError::malformed(PROVIDER, "empty refined query"));
    }
    Ok(refined.to_string())
}
