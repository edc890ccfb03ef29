//! Daily AI-news curation core.
//!
//! Specialist agents search, deduplicate against recently stored content,
//! score candidates with a language model and refine their query until a
//! per-category target is met. The orchestrator runs them side by side and
//! merges the results into a single report.

pub mod agent;
pub mod cache;
mod category;
pub mod config;
pub mod dedup;
mod error;
pub mod evaluation;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod provider;
mod security;
pub mod store;
pub mod telemetry;
pub mod trace;

pub use agent::{AgentRun, Collaborators, SpecialistAgent};
pub use cache::ResultCache;
pub use category::Category;
pub use config::{Config, ConfigLoader, Profile, RunSettings};
pub use error::{AgentFailure, ScoutError};
pub use model::{AdmittedArticle, Candidate, Evaluation, RunSource, SearchQuery, SubScores};
pub use orchestrator::{AgentSpec, SearchOrchestrator, SearchReport};
pub use provider::{
    ChatModel, EvaluationRequest, Evaluator, ExaSearchProvider, Judgment, LlmEvaluator,
    LlmQueryRefiner, OpenAiChat, QueryRefiner, SearchProvider, SearchRequest,
};
pub use security::{ProviderKeys, SecretValue, require_env};
pub use store::{ContentStore, InMemoryContentStore, InsertOutcome, NewContentItem, StoredItem};
#[cfg(feature = "postgres-store")]
pub use store::PgContentStore;
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent, TraceKind, TraceSummary, persist_trace};
