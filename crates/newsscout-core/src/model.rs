//! Data carried through one specialist run: queries, candidates, judgments and
//! admitted articles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Category, ScoutError};

/// Lowest and highest value a criterion score may take.
pub const SCORE_MIN: u8 = 1;
pub const SCORE_MAX: u8 = 5;

/// Active query of one agent. Replaced wholesale on refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub category: Category,
    pub text: String,
}

impl SearchQuery {
    pub fn base(category: Category) -> Self {
        Self {
            category,
            text: category.base_query().to_string(),
        }
    }

    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            category: self.category,
            text: text.into(),
        }
    }
}

/// One document returned by the search provider, not yet vetted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub category: Category,
    /// Provider-assigned relevance, informational only.
    pub provider_score: Option<f64>,
    pub source: Option<String>,
}

/// The four criteria the evaluator scores, each in `SCORE_MIN..=SCORE_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubScores {
    pub relevance: u8,
    pub actionability: u8,
    pub source_quality: u8,
    pub recency_impact: u8,
}

impl SubScores {
    /// Builds scores from raw provider numbers, rounding and clamping each into range.
    pub fn from_raw(relevance: f64, actionability: f64, source_quality: f64, recency: f64) -> Self {
        Self {
            relevance: clamp_score(relevance),
            actionability: clamp_score(actionability),
            source_quality: clamp_score(source_quality),
            recency_impact: clamp_score(recency),
        }
    }

    pub fn mean(&self) -> f64 {
        let sum = u32::from(self.relevance)
            + u32::from(self.actionability)
            + u32::from(self.source_quality)
            + u32::from(self.recency_impact);
        f64::from(sum) / 4.0
    }
}

fn clamp_score(raw: f64) -> u8 {
    if !raw.is_finite() {
        return SCORE_MIN;
    }
    raw.round().clamp(f64::from(SCORE_MIN), f64::from(SCORE_MAX)) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Keep,
    Discard,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Keep => "keep",
            Decision::Discard => "discard",
        }
    }
}

/// Scored judgment of one candidate. `overall_score` and `decision` are always
/// derived locally from the sub-scores and the active threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub url: String,
    pub scores: SubScores,
    pub overall_score: f64,
    pub threshold: f64,
    pub decision: Decision,
    pub rationale: String,
}

impl Evaluation {
    pub fn judge(
        url: impl Into<String>,
        scores: SubScores,
        threshold: f64,
        rationale: impl Into<String>,
    ) -> Self {
        let overall_score = scores.mean();
        let decision = if overall_score >= threshold {
            Decision::Keep
        } else {
            Decision::Discard
        };
        Self {
            url: url.into(),
            scores,
            overall_score,
            threshold,
            decision,
            rationale: rationale.into(),
        }
    }

    pub fn is_keep(&self) -> bool {
        self.decision == Decision::Keep
    }
}

/// Whether the run was started by hand or by the daily schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunSource {
    #[default]
    Manual,
    Scheduled,
}

impl RunSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSource::Manual => "manual",
            RunSource::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for RunSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunSource {
    type Err = ScoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(RunSource::Manual),
            "scheduled" | "automated" => Ok(RunSource::Scheduled),
            other => Err(ScoutError::InvalidConfiguration(format!(
                "unknown run source: {other}"
            ))),
        }
    }
}

/// Store-side source type for everything this crate admits.
pub const AGENT_SOURCE_TYPE: &str = "agent_search";

/// Provenance tag recorded with every admitted article.
pub fn provenance(category: Category, run_source: RunSource) -> String {
    format!("{}|{}", category.slug(), run_source.as_str())
}

/// A candidate that passed evaluation and deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmittedArticle {
    pub category: Category,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
    pub provenance: String,
    pub overall_score: f64,
    pub rationale: String,
}

impl AdmittedArticle {
    pub fn admit(candidate: Candidate, evaluation: &Evaluation, provenance: &str) -> Self {
        Self {
            category: candidate.category,
            url: candidate.url,
            title: candidate.title,
            summary: candidate.summary,
            published_at: candidate.published_at,
            provenance: provenance.to_string(),
            overall_score: evaluation.overall_score,
            rationale: evaluation.rationale.clone(),
        }
    }
}

/// A rejected candidate kept as context for query refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub url: String,
    pub title: String,
    pub overall_score: Option<f64>,
    pub reason: String,
}
