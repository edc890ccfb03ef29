//! Collaborator seams consumed by the specialist agent: semantic search,
//! batch evaluation and query refinement.

pub mod exa;
pub mod llm;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Candidate, Rejection, SearchQuery, SubScores};
use crate::{Category, ScoutError};

pub use exa::ExaSearchProvider;
pub use llm::{ChatModel, LlmEvaluator, LlmQueryRefiner, OpenAiChat};

/// Search strategy requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Auto,
    Neural,
    Keyword,
    #[default]
    Deep,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Auto => "auto",
            SearchMode::Neural => "neural",
            SearchMode::Keyword => "keyword",
            SearchMode::Deep => "deep",
        }
    }
}

/// Whether the provider fetches live page content. `Never` is the cheap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LiveCrawl {
    #[default]
    Always,
    Preferred,
    Never,
}

impl LiveCrawl {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveCrawl::Always => "always",
            LiveCrawl::Preferred => "preferred",
            LiveCrawl::Never => "never",
        }
    }
}

/// Parameters for a single search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: SearchQuery,
    pub max_results: usize,
    pub max_summary_chars: usize,
    pub summary_prompt: String,
    pub mode: SearchMode,
    pub live_crawl: LiveCrawl,
    pub min_published: DateTime<Utc>,
    pub max_published: DateTime<Utc>,
    pub user_location: Option<String>,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ScoutError>;
}

/// Raw per-document judgment as returned by an evaluator, before the
/// threshold is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    /// URL echoed by the evaluator; `None` when it only answered positionally.
    pub url: Option<String>,
    pub scores: SubScores,
    pub rationale: String,
}

/// Everything the evaluator needs to score one batch.
#[derive(Debug, Clone)]
pub struct EvaluationRequest<'a> {
    pub candidates: &'a [Candidate],
    pub category: Category,
    pub query: &'a str,
    pub threshold: f64,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Vec<Judgment>, ScoutError>;
}

#[async_trait]
pub trait QueryRefiner: Send + Sync {
    async fn refine(&self, base_query: &str, discarded: &[Rejection]) -> Result<String, ScoutError>;
}

pub type DynSearchProvider = Arc<dyn SearchProvider>;
pub type DynEvaluator = Arc<dyn Evaluator>;
pub type DynQueryRefiner = Arc<dyn QueryRefiner>;
