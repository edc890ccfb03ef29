//! Specialist search agent: one category's bounded
//! plan/search/evaluate/decide/refine loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResultCache;
use crate::config::RunSettings;
use crate::dedup::{self, canonical_url, collapse_repeats, host_of};
use crate::evaluation::{Verdict, reconcile};
use crate::metrics;
use crate::model::{
    AGENT_SOURCE_TYPE, AdmittedArticle, Candidate, Evaluation, Rejection, RunSource, SearchQuery,
    provenance,
};
use crate::provider::{
    DynEvaluator, DynQueryRefiner, DynSearchProvider, EvaluationRequest, SearchRequest,
};
use crate::store::{DynContentStore, InsertOutcome, NewContentItem, lookback_cutoff};
use crate::trace::{TraceCollector, TraceEvent, TraceKind};
use crate::{Category, ScoutError};

/// External services an agent talks to. Cloned into every agent of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub search: DynSearchProvider,
    pub evaluator: DynEvaluator,
    pub refiner: DynQueryRefiner,
    pub store: DynContentStore,
}

/// Result of one `SpecialistAgent::search` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub category: Category,
    pub articles: Vec<AdmittedArticle>,
    /// Value of the iteration counter at termination; 0 for a cache hit.
    pub iterations: u32,
    /// Query text used by each iteration, in order.
    pub queries: Vec<String>,
    pub from_cache: bool,
    pub trace: Vec<TraceEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentPhase {
    Plan,
    Search,
    Evaluate,
    Decide,
    Refine,
    Done,
}

/// Mutable state of a single run. Lives exactly as long as one `search` call.
#[derive(Debug)]
struct AgentState {
    iteration: u32,
    active_query: SearchQuery,
    admitted: Vec<AdmittedArticle>,
    /// Canonical URLs seen and rejected so far. Never shrinks.
    discarded_urls: HashSet<String>,
    rejections: Vec<Rejection>,
    pending: Vec<Candidate>,
    queries: Vec<String>,
    /// Earliest publication date requested from search, fixed at run start.
    published_after: DateTime<Utc>,
    /// A collaborator failed or dedup was skipped; the result is not cached.
    degraded: bool,
}

impl AgentState {
    fn new(category: Category, base_query: &str, published_after: DateTime<Utc>) -> Self {
        Self {
            iteration: 0,
            active_query: SearchQuery::base(category).with_text(base_query),
            admitted: Vec::new(),
            discarded_urls: HashSet::new(),
            rejections: Vec::new(),
            pending: Vec::new(),
            queries: Vec::new(),
            published_after,
            degraded: false,
        }
    }

    fn is_admitted(&self, canonical: &str) -> bool {
        self.admitted
            .iter()
            .any(|article| canonical_url(&article.url) == canonical)
    }

    fn discard(
        &mut self,
        candidate: &Candidate,
        overall_score: Option<f64>,
        reason: impl Into<String>,
    ) {
        self.discarded_urls.insert(canonical_url(&candidate.url));
        self.rejections.push(Rejection {
            url: candidate.url.clone(),
            title: candidate.title.clone(),
            overall_score,
            reason: reason.into(),
        });
    }

    fn recent_rejections(&self, window: usize) -> &[Rejection] {
        let start = self.rejections.len().saturating_sub(window);
        &self.rejections[start..]
    }
}

pub struct SpecialistAgent {
    category: Category,
    base_query: String,
    settings: Arc<RunSettings>,
    collaborators: Collaborators,
    run_source: RunSource,
    cache: Option<ResultCache>,
}

impl SpecialistAgent {
    pub fn new(
        category: Category,
        settings: Arc<RunSettings>,
        collaborators: Collaborators,
        run_source: RunSource,
    ) -> Self {
        Self {
            category,
            base_query: category.base_query().to_string(),
            settings,
            collaborators,
            run_source,
            cache: None,
        }
    }

    pub fn with_base_query(mut self, base_query: impl Into<String>) -> Self {
        self.base_query = base_query.into();
        self
    }

    pub fn with_cache(mut self, cache: Option<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Run the loop until `target_count` articles are admitted or
    /// `max_iterations` rounds have been spent. Collaborator failures are
    /// absorbed; a short list is a valid result.
    #[instrument(
        name = "agent.search",
        skip(self),
        fields(category = %self.category, run_source = %self.run_source)
    )]
    pub async fn search(
        &self,
        max_iterations: u32,
        target_count: usize,
    ) -> Result<AgentRun, ScoutError> {
        if max_iterations == 0 {
            return Err(ScoutError::InvalidConfiguration(
                "max_iterations must be at least 1".into(),
            ));
        }

        if self.settings.publish_window_days < 1 {
            return Err(ScoutError::InvalidConfiguration(format!(
                "publish window must be at least 1 day, got {}",
                self.settings.publish_window_days
            )));
        }
        let published_after = lookback_cutoff(Utc::now(), self.settings.publish_window_days)?;

        let started = Instant::now();
        let mut trace = TraceCollector::new();

        if let Some(articles) = self.cached_articles(target_count).await {
            trace.record(
                self.category,
                0,
                TraceKind::CacheHit,
                format!("{} cached article(s) for today", articles.len()),
            );
            return Ok(AgentRun {
                category: self.category,
                articles,
                iterations: 0,
                queries: Vec::new(),
                from_cache: true,
                trace: trace.into_events(),
            });
        }

        let mut state = AgentState::new(self.category, &self.base_query, published_after);
        let mut phase = AgentPhase::Plan;

        loop {
            phase = match phase {
                AgentPhase::Plan => {
                    state.iteration = 1;
                    trace.record(
                        self.category,
                        state.iteration,
                        TraceKind::Plan,
                        format!("target {target_count}, query: {}", state.active_query.text),
                    );
                    if target_count == 0 {
                        AgentPhase::Done
                    } else {
                        AgentPhase::Search
                    }
                }
                AgentPhase::Search => {
                    state.queries.push(state.active_query.text.clone());
                    let fresh = self.search_step(&mut state, &mut trace).await;
                    state.pending = fresh;
                    AgentPhase::Evaluate
                }
                AgentPhase::Evaluate => {
                    self.evaluate_step(&mut state, target_count, &mut trace).await;
                    AgentPhase::Decide
                }
                AgentPhase::Decide => {
                    if state.admitted.len() >= target_count {
                        AgentPhase::Done
                    } else if state.iteration >= max_iterations {
                        info!(
                            admitted = state.admitted.len(),
                            target_count,
                            iteration = state.iteration,
                            "iteration budget exhausted with a partial result"
                        );
                        AgentPhase::Done
                    } else {
                        AgentPhase::Refine
                    }
                }
                AgentPhase::Refine => {
                    self.refine_step(&mut state, &mut trace).await;
                    state.iteration += 1;
                    AgentPhase::Search
                }
                AgentPhase::Done => break,
            };
        }

        self.persist(&state.admitted).await;
        if state.degraded {
            info!(
                admitted = state.admitted.len(),
                "run hit collaborator failures; not caching today's result"
            );
        } else {
            self.write_cache(&state.admitted).await;
        }

        trace.record(
            self.category,
            state.iteration,
            TraceKind::Done,
            format!(
                "{} of {target_count} admitted after {} iteration(s)",
                state.admitted.len(),
                state.iteration
            ),
        );
        metrics::record_run_duration(
            self.category,
            started.elapsed().as_millis() as u64,
            state.admitted.len(),
        );
        info!(
            admitted = state.admitted.len(),
            iterations = state.iteration,
            discarded = state.discarded_urls.len(),
            "agent finished"
        );

        Ok(AgentRun {
            category: self.category,
            articles: state.admitted,
            iterations: state.iteration,
            queries: state.queries,
            from_cache: false,
            trace: trace.into_events(),
        })
    }

    async fn search_step(
        &self,
        state: &mut AgentState,
        trace: &mut TraceCollector,
    ) -> Vec<Candidate> {
        let iteration = state.iteration;
        let request = SearchRequest {
            query: state.active_query.clone(),
            max_results: self.settings.search_limit_for(iteration),
            max_summary_chars: self.settings.summary_budget_for(self.category),
            summary_prompt: self.settings.summary_prompt.clone(),
            mode: self.settings.search_mode,
            live_crawl: self.settings.live_crawl,
            min_published: state.published_after,
            max_published: Utc::now(),
            user_location: self.settings.user_location.clone(),
        };

        let raw = match self.collaborators.search.search(&request).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(iteration, error = %err, "search failed; treating as zero results");
                metrics::record_provider_failure(self.category, "search");
                state.degraded = true;
                trace.record(
                    self.category,
                    iteration,
                    TraceKind::ProviderFailure,
                    format!("search: {err}"),
                );
                return Vec::new();
            }
        };
        let returned = raw.len();

        let mut fresh = Vec::new();
        for candidate in collapse_repeats(raw) {
            let canonical = canonical_url(&candidate.url);
            if state.discarded_urls.contains(&canonical) || state.is_admitted(&canonical) {
                debug!(url = %candidate.url, "already seen in this run");
                continue;
            }
            if host_of(&candidate.url).is_some_and(|host| self.settings.is_blocked_host(&host)) {
                debug!(url = %candidate.url, "dropping low-quality domain");
                trace.record(
                    self.category,
                    iteration,
                    TraceKind::Blocked,
                    candidate.url.clone(),
                );
                state.discard(&candidate, None, "low-quality domain");
                continue;
            }
            fresh.push(candidate);
        }

        let outcome = dedup::filter_duplicates(
            self.collaborators.store.as_ref(),
            fresh,
            self.settings.lookback_days,
        )
        .await;
        if outcome.skipped {
            state.degraded = true;
            trace.record(
                self.category,
                iteration,
                TraceKind::DedupSkipped,
                format!(
                    "store unreachable; {} candidate(s) not checked against the last {} day(s)",
                    outcome.fresh.len(),
                    self.settings.lookback_days
                ),
            );
        }
        for duplicate in &outcome.duplicates {
            trace.record(
                self.category,
                iteration,
                TraceKind::Duplicate,
                format!(
                    "{} matches {} ({}) from {}",
                    duplicate.candidate.url,
                    duplicate.matched.source_type,
                    duplicate.matched.source_name,
                    duplicate.matched.created_at.format("%Y-%m-%d")
                ),
            );
            state.discard(&duplicate.candidate, None, "already covered recently");
        }

        trace.record(
            self.category,
            iteration,
            TraceKind::Search,
            format!(
                "{returned} returned, {} new for query: {}",
                outcome.fresh.len(),
                state.active_query.text
            ),
        );
        info!(
            iteration,
            returned,
            fresh = outcome.fresh.len(),
            duplicates = outcome.duplicates.len(),
            "search step complete"
        );
        outcome.fresh
    }

    async fn evaluate_step(
        &self,
        state: &mut AgentState,
        target_count: usize,
        trace: &mut TraceCollector,
    ) {
        let candidates = std::mem::take(&mut state.pending);
        if candidates.is_empty() {
            return;
        }

        let iteration = state.iteration;
        let threshold = self.settings.threshold_for(iteration);
        let request = EvaluationRequest {
            candidates: &candidates,
            category: self.category,
            query: &state.active_query.text,
            threshold,
            now: Utc::now(),
        };

        let judgments = match self.collaborators.evaluator.evaluate(request).await {
            Ok(judgments) => judgments,
            Err(err) => {
                warn!(
                    iteration,
                    candidates = candidates.len(),
                    error = %err,
                    "evaluation failed; discarding the batch"
                );
                metrics::record_provider_failure(self.category, "evaluate");
                state.degraded = true;
                trace.record(
                    self.category,
                    iteration,
                    TraceKind::ProviderFailure,
                    format!("evaluate: {err}"),
                );
                for candidate in &candidates {
                    state.discard(candidate, None, "evaluation failed");
                }
                return;
            }
        };

        metrics::record_evaluated(self.category, candidates.len());
        let mut keeps: Vec<(Candidate, Evaluation)> = Vec::new();
        for reconciled in reconcile(candidates, judgments, threshold) {
            let candidate = reconciled.candidate;
            match reconciled.verdict {
                Verdict::Judged(evaluation) => {
                    info!(
                        iteration,
                        url = %candidate.url,
                        title = %candidate.title,
                        relevance = evaluation.scores.relevance,
                        actionability = evaluation.scores.actionability,
                        source_quality = evaluation.scores.source_quality,
                        recency_impact = evaluation.scores.recency_impact,
                        score = evaluation.overall_score,
                        threshold,
                        decision = evaluation.decision.as_str(),
                        rationale = %evaluation.rationale,
                        "candidate evaluated"
                    );
                    trace.record(
                        self.category,
                        iteration,
                        TraceKind::Evaluated,
                        format!(
                            "{} {:.2} {}",
                            evaluation.decision.as_str(),
                            evaluation.overall_score,
                            candidate.url
                        ),
                    );
                    if evaluation.is_keep() {
                        keeps.push((candidate, evaluation));
                    } else {
                        state.discard(
                            &candidate,
                            Some(evaluation.overall_score),
                            evaluation.rationale.clone(),
                        );
                    }
                }
                Verdict::Missing => {
                    info!(iteration, url = %candidate.url, "no judgment returned; discarding");
                    trace.record(
                        self.category,
                        iteration,
                        TraceKind::Evaluated,
                        format!("discard (missing) {}", candidate.url),
                    );
                    state.discard(&candidate, None, "missing evaluation");
                }
            }
        }

        let capacity = target_count.saturating_sub(state.admitted.len());
        let (admit, surplus) = split_by_capacity(keeps, capacity);
        for (candidate, evaluation) in surplus {
            debug!(url = %candidate.url, score = evaluation.overall_score, "keep over target");
            state.discard(&candidate, Some(evaluation.overall_score), "over target");
        }

        let tag = provenance(self.category, self.run_source);
        metrics::record_admitted(self.category, admit.len());
        state.admitted.extend(admit.into_iter().map(|(candidate, evaluation)| {
            AdmittedArticle::admit(candidate, &evaluation, &tag)
        }));
    }

    async fn refine_step(&self, state: &mut AgentState, trace: &mut TraceCollector) {
        let iteration = state.iteration;
        let sample = state.recent_rejections(self.settings.refinement_window);
        match self.collaborators.refiner.refine(&self.base_query, sample).await {
            Ok(refined) => {
                info!(iteration, from = %state.active_query.text, to = %refined, "query refined");
                trace.record(self.category, iteration, TraceKind::Refined, refined.clone());
                state.active_query = state.active_query.with_text(refined);
            }
            Err(err) => {
                warn!(iteration, error = %err, "refinement failed; keeping the current query");
                metrics::record_provider_failure(self.category, "refine");
                state.degraded = true;
                trace.record(
                    self.category,
                    iteration,
                    TraceKind::RefineFailed,
                    err.to_string(),
                );
            }
        }
    }

    async fn persist(&self, admitted: &[AdmittedArticle]) {
        for article in admitted {
            let item = NewContentItem {
                url: canonical_url(&article.url),
                source_type: AGENT_SOURCE_TYPE.to_string(),
                source_name: article.provenance.clone(),
                title: article.title.clone(),
                summary: article.summary.clone(),
                published_at: article.published_at,
            };
            match self.collaborators.store.insert(item).await {
                Ok(InsertOutcome::Inserted) => debug!(url = %article.url, "persisted"),
                Ok(InsertOutcome::AlreadyPresent) => {
                    debug!(url = %article.url, "already persisted by another writer")
                }
                Err(err) => {
                    warn!(url = %article.url, error = %err, "failed to persist article");
                    metrics::record_provider_failure(self.category, "persist");
                }
            }
        }
    }

    async fn cached_articles(&self, target_count: usize) -> Option<Vec<AdmittedArticle>> {
        let cache = self.cache.as_ref()?;
        match cache.load(self.category, Utc::now().date_naive()).await {
            Ok(Some(mut articles)) => {
                articles.truncate(target_count);
                info!(count = articles.len(), "using today's cached results");
                Some(articles)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "ignoring unreadable result cache");
                None
            }
        }
    }

    async fn write_cache(&self, admitted: &[AdmittedArticle]) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache
            .store(self.category, Utc::now().date_naive(), admitted)
            .await
        {
            warn!(error = %err, "failed to write result cache");
        }
    }
}

/// Highest scores first; ties keep evaluator order.
fn split_by_capacity(
    mut keeps: Vec<(Candidate, Evaluation)>,
    capacity: usize,
) -> (Vec<(Candidate, Evaluation)>, Vec<(Candidate, Evaluation)>) {
    keeps.sort_by(|a, b| b.1.overall_score.total_cmp(&a.1.overall_score));
    let surplus = keeps.split_off(capacity.min(keeps.len()));
    (keeps, surplus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubScores;

    fn keep(url: &str, score: f64) -> (Candidate, Evaluation) {
        let candidate = Candidate {
            url: url.to_string(),
            title: url.to_string(),
            summary: String::new(),
            published_at: None,
            category: Category::GeneralAi,
            provider_score: None,
            source: None,
        };
        let raw = score;
        let scores = SubScores::from_raw(raw, raw, raw, raw);
        let evaluation = Evaluation::judge(url, scores, 1.0, "ok");
        (candidate, evaluation)
    }

    #[test]
    fn capacity_split_prefers_highest_scores() {
        let keeps = vec![
            keep("https://a/1", 4.0),
            keep("https://a/2", 5.0),
            keep("https://a/3", 4.0),
        ];
        let (admit, surplus) = split_by_capacity(keeps, 2);
        let admitted: Vec<_> = admit.iter().map(|(c, _)| c.url.as_str()).collect();
        assert_eq!(admitted, vec!["https://a/2", "https://a/1"]);
        assert_eq!(surplus.len(), 1);
        assert_eq!(surplus[0].0.url, "https://a/3");
    }

    #[test]
    fn capacity_larger_than_keeps_admits_everything() {
        let (admit, surplus) = split_by_capacity(vec![keep("https://a/1", 4.0)], 3);
        assert_eq!(admit.len(), 1);
        assert!(surplus.is_empty());
    }

    #[test]
    fn rejection_window_is_bounded() {
        let mut state = AgentState::new(Category::GeneralAi, "q", Utc::now());
        for idx in 0..15 {
            let (candidate, _) = keep(&format!("https://a/{idx}"), 1.0);
            state.discard(&candidate, Some(1.0), "weak");
        }
        let window = state.recent_rejections(10);
        assert_eq!(window.len(), 10);
        assert_eq!(window[0].url, "https://a/5");
        assert_eq!(state.discarded_urls.len(), 15);
    }
}
