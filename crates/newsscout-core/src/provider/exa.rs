use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{SearchProvider, SearchRequest};
use crate::config::ExaConfig;
use crate::model::Candidate;
use crate::security::SecretValue;
use crate::{Category, ScoutError};

const PROVIDER: &str = "exa";

/// Exa neural search client using the combined search-and-contents endpoint.
pub struct ExaSearchProvider {
    api_key: SecretValue,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaRequest<'a> {
    query: &'a str,
    num_results: usize,
    #[serde(rename = "type")]
    search_type: &'a str,
    contents: ExaContents<'a>,
    start_published_date: String,
    end_published_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_location: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaContents<'a> {
    text: ExaText,
    summary: ExaSummary<'a>,
    livecrawl: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaText {
    max_characters: usize,
}

#[derive(Debug, Serialize)]
struct ExaSummary<'a> {
    query: &'a str,
}

#[derive(Debug, Deserialize)]
struct ExaResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExaResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    published_date: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl ExaSearchProvider {
    pub fn new(config: &ExaConfig, api_key: SecretValue) -> Result<Self, ScoutError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| ScoutError::provider(PROVIDER, err))?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for ExaSearchProvider {
    #[instrument(
        name = "exa.search",
        skip(self, request),
        fields(category = %request.query.category)
    )]
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ScoutError> {
        let body = request_body(request);

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| ScoutError::provider(PROVIDER, err))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ScoutError::provider(
                PROVIDER,
                format!("status {status}: {}", self.api_key.scrub(&text)),
            ));
        }

        let parsed: ExaResponse = response
            .json()
            .await
            .map_err(|err| ScoutError::malformed(PROVIDER, err))?;

        debug!(results = parsed.results.len(), "exa returned results");
        Ok(parsed
            .results
            .into_iter()
            .map(|result| to_candidate(result, request.query.category, request.max_summary_chars))
            .collect())
    }
}

fn request_body(request: &SearchRequest) -> ExaRequest<'_> {
    ExaRequest {
        query: &request.query.text,
        num_results: request.max_results,
        search_type: request.mode.as_str(),
        contents: ExaContents {
            text: ExaText {
                max_characters: request.max_summary_chars,
            },
            summary: ExaSummary {
                query: &request.summary_prompt,
            },
            livecrawl: request.live_crawl.as_str(),
        },
        start_published_date: request.min_published.format("%Y-%m-%d").to_string(),
        end_published_date: request.max_published.format("%Y-%m-%d").to_string(),
        user_location: request.user_location.as_deref(),
    }
}

fn to_candidate(result: ExaResult, category: Category, budget: usize) -> Candidate {
    let summary = result
        .summary
        .filter(|summary| !summary.trim().is_empty())
        .or(result.text)
        .map(|text| truncate_chars(text.trim(), budget))
        .unwrap_or_default();

    Candidate {
        title: result
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        url: result.url,
        summary,
        published_at: result.published_date.as_deref().and_then(parse_published),
        category,
        provider_score: result.score,
        source: result.author,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Accepts full RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
pub(crate) fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
