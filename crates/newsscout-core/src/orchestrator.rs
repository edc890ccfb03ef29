//! Search orchestrator: runs specialist agents concurrently and merges their
//! results into one category-partitioned report.
//!
//! Every agent runs in its own task. A failing or panicking agent contributes
//! an empty list plus an `AgentFailure`; its siblings are never cancelled.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::{Instrument, error, info, instrument};
use uuid::Uuid;

use crate::agent::{AgentRun, Collaborators, SpecialistAgent};
use crate::cache::ResultCache;
use crate::config::RunSettings;
use crate::error::AgentFailure;
use crate::model::{AdmittedArticle, RunSource};
use crate::trace::{TraceEvent, TraceSummary};
use crate::{Category, ScoutError};

/// One agent to launch: its category, base query template and target count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub category: Category,
    pub base_query: String,
    pub target: usize,
}

impl AgentSpec {
    pub fn new(category: Category, base_query: impl Into<String>, target: usize) -> Self {
        Self {
            category,
            base_query: base_query.into(),
            target,
        }
    }

    /// Category defaults with targets taken from the resolved settings.
    pub fn for_category(category: Category, settings: &RunSettings) -> Self {
        Self::new(category, category.base_query(), settings.target_for(category))
    }

    /// One spec per known category.
    pub fn standard(settings: &RunSettings) -> Vec<Self> {
        Category::ALL
            .iter()
            .map(|category| Self::for_category(*category, settings))
            .collect()
    }
}

/// Aggregate output of one orchestrated run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchReport {
    pub run_id: String,
    pub run_source: RunSource,
    pub articles: BTreeMap<Category, Vec<AdmittedArticle>>,
    pub total: usize,
    pub by_category_count: BTreeMap<Category, usize>,
    pub iterations: BTreeMap<Category, u32>,
    pub failures: Vec<AgentFailure>,
    pub traces: BTreeMap<Category, Vec<TraceEvent>>,
    pub duration_ms: u64,
}

impl SearchReport {
    fn new(run_id: String, run_source: RunSource) -> Self {
        Self {
            run_id,
            run_source,
            ..Self::default()
        }
    }

    fn absorb_run(&mut self, run: AgentRun) {
        self.articles
            .entry(run.category)
            .or_default()
            .extend(run.articles);
        let iterations = self.iterations.entry(run.category).or_default();
        *iterations = (*iterations).max(run.iterations);
        self.traces.entry(run.category).or_default().extend(run.trace);
    }

    fn absorb_failure(&mut self, failure: AgentFailure) {
        self.articles.entry(failure.category).or_default();
        self.failures.push(failure);
    }

    fn finalize(&mut self) {
        self.by_category_count = self
            .articles
            .iter()
            .map(|(category, articles)| (*category, articles.len()))
            .collect();
        self.total = self.by_category_count.values().sum();
    }

    /// Every admitted article in category order.
    pub fn flatten(&self) -> Vec<AdmittedArticle> {
        self.articles.values().flatten().cloned().collect()
    }

    pub fn is_failed(&self, category: Category) -> bool {
        self.failures.iter().any(|failure| failure.category == category)
    }

    pub fn trace_summary(&self) -> TraceSummary {
        let events: Vec<TraceEvent> = self.traces.values().flatten().cloned().collect();
        TraceSummary::from_events(&events)
    }

    pub fn render_markdown(&self) -> String {
        let mut output = format!(
            "## Agent search results ({} run {})\n\n",
            self.run_source, self.run_id
        );
        for (category, articles) in &self.articles {
            let _ = writeln!(
                output,
                "### {} ({} article(s))",
                category.label(),
                articles.len()
            );
            for article in articles {
                let _ = writeln!(
                    output,
                    "- [{}]({}) score {:.2}",
                    article.title, article.url, article.overall_score
                );
            }
            output.push('\n');
        }
        if !self.failures.is_empty() {
            output.push_str("### Failed agents\n");
            for failure in &self.failures {
                let _ = writeln!(output, "- {failure}");
            }
            output.push('\n');
        }
        let _ = writeln!(output, "Total: {}", self.total);
        output
    }
}

pub struct SearchOrchestrator {
    settings: Arc<RunSettings>,
    collaborators: Collaborators,
    cache: Option<ResultCache>,
}

impl SearchOrchestrator {
    pub fn new(settings: Arc<RunSettings>, collaborators: Collaborators) -> Self {
        let cache = settings
            .cache_enabled
            .then(|| ResultCache::new(settings.cache_dir.clone()));
        Self {
            settings,
            collaborators,
            cache,
        }
    }

    /// Override the cache derived from settings; `None` disables it.
    pub fn with_cache(mut self, cache: Option<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Launch one agent per spec and wait for all of them.
    #[instrument(
        name = "orchestrator.run_all",
        skip(self, specs, run_source),
        fields(agents = specs.len(), run_source = %run_source)
    )]
    pub async fn run_all(
        &self,
        specs: Vec<AgentSpec>,
        max_iterations: u32,
        run_source: RunSource,
    ) -> SearchReport {
        let started = Instant::now();
        let mut report = SearchReport::new(Uuid::new_v4().to_string(), run_source);
        info!(run_id = %report.run_id, "starting agent run");

        let mut categories = Vec::with_capacity(specs.len());
        let mut handles = Vec::with_capacity(specs.len());
        for spec in specs {
            let agent = SpecialistAgent::new(
                spec.category,
                Arc::clone(&self.settings),
                self.collaborators.clone(),
                run_source,
            )
            .with_base_query(spec.base_query)
            .with_cache(self.cache.clone());
            let target = spec.target;

            categories.push(spec.category);
            handles.push(tokio::spawn(
                async move { agent.search(max_iterations, target).await }.in_current_span(),
            ));
        }

        for (category, joined) in categories.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(Ok(run)) => report.absorb_run(run),
                Ok(Err(err)) => {
                    error!(%category, error = %err, "agent failed");
                    report.absorb_failure(agent_error(category, &err));
                }
                Err(join_err) => {
                    error!(%category, error = %join_err, "agent task aborted");
                    report.absorb_failure(join_failure(category, join_err));
                }
            }
        }

        report.finalize();
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            total = report.total,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "agent run complete"
        );
        report
    }
}

fn agent_error(category: Category, err: &ScoutError) -> AgentFailure {
    AgentFailure::new(category, err.to_string(), false)
}

fn join_failure(category: Category, err: JoinError) -> AgentFailure {
    if !err.is_panic() {
        return AgentFailure::new(category, err.to_string(), false);
    }
    let payload = err.into_panic();
    let reason = payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "agent panicked".to_string());
    AgentFailure::new(category, reason, true)
}
