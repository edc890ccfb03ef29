#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use newsscout_core::model::Rejection;
use newsscout_core::store::ContentStore;
use newsscout_core::{
    Candidate, Category, Collaborators, EvaluationRequest, Evaluator, InMemoryContentStore,
    InsertOutcome, Judgment, NewContentItem, QueryRefiner, RunSettings, ScoutError,
    SearchProvider, SearchRequest, StoredItem, SubScores,
};

pub fn settings() -> RunSettings {
    RunSettings {
        cache_enabled: false,
        ..RunSettings::default()
    }
}

pub fn candidate(category: Category, url: &str) -> Candidate {
    Candidate {
        url: url.to_string(),
        title: format!("Story at {url}"),
        summary: "A concrete announcement with details.".to_string(),
        published_at: None,
        category,
        provider_score: Some(0.8),
        source: None,
    }
}

/// Replays one scripted response per call; empty once the script runs out.
#[derive(Default)]
pub struct ScriptedSearch {
    responses: Mutex<VecDeque<Result<Vec<Candidate>, ScoutError>>>,
    pub requests: Mutex<Vec<SearchRequest>>,
}

impl ScriptedSearch {
    pub fn new(responses: Vec<Result<Vec<Candidate>, ScoutError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn query_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.query.text.clone())
            .collect()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ScoutError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Serves a fixed candidate list per category and panics for one category.
#[derive(Default)]
pub struct CategorySearch {
    pub results: HashMap<Category, Vec<Candidate>>,
    pub panic_on: Option<Category>,
}

#[async_trait]
impl SearchProvider for CategorySearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Candidate>, ScoutError> {
        let category = request.query.category;
        if self.panic_on == Some(category) {
            panic!("search backend crashed for {category}");
        }
        Ok(self.results.get(&category).cloned().unwrap_or_default())
    }
}

/// Gives every URL the same score on all four criteria.
#[derive(Default)]
pub struct ScoreByUrl {
    pub scores: HashMap<String, f64>,
    pub default_score: f64,
    pub fail: bool,
    /// URLs it should silently leave out of its answer.
    pub omit: Vec<String>,
    pub seen_urls: Mutex<Vec<String>>,
    pub thresholds: Mutex<Vec<f64>>,
    pub calls: AtomicUsize,
}

impl ScoreByUrl {
    pub fn uniform(score: f64) -> Self {
        Self {
            default_score: score,
            ..Self::default()
        }
    }

    pub fn with(mut self, url: &str, score: f64) -> Self {
        self.scores.insert(url.to_string(), score);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScoreByUrl {
    async fn evaluate(&self, request: EvaluationRequest<'_>) -> Result<Vec<Judgment>, ScoutError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.thresholds.lock().unwrap().push(request.threshold);
        self.seen_urls
            .lock()
            .unwrap()
            .extend(request.candidates.iter().map(|c| c.url.clone()));
        if self.fail {
            return Err(ScoutError::provider("fake-llm", "rate limited"));
        }
        Ok(request
            .candidates
            .iter()
            .filter(|c| !self.omit.contains(&c.url))
            .map(|c| {
                let score = self.scores.get(&c.url).copied().unwrap_or(self.default_score);
                Judgment {
                    url: Some(c.url.clone()),
                    scores: SubScores::from_raw(score, score, score, score),
                    rationale: format!("scored {score}"),
                }
            })
            .collect())
    }
}

/// Returns numbered refinements, or fails every call.
#[derive(Default)]
pub struct ScriptedRefiner {
    pub fail: bool,
    pub calls: AtomicUsize,
    pub base_queries: Mutex<Vec<String>>,
    pub sample_sizes: Mutex<Vec<usize>>,
}

impl ScriptedRefiner {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRefiner for ScriptedRefiner {
    async fn refine(
        &self,
        base_query: &str,
        discarded: &[Rejection],
    ) -> Result<String, ScoutError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.base_queries.lock().unwrap().push(base_query.to_string());
        self.sample_sizes.lock().unwrap().push(discarded.len());
        if self.fail {
            return Err(ScoutError::provider("fake-llm", "timeout"));
        }
        Ok(format!("refined query {call}"))
    }
}

/// A store whose reads always fail; writes are delegated.
#[derive(Default)]
pub struct UnreachableStore {
    pub inner: InMemoryContentStore,
}

#[async_trait]
impl ContentStore for UnreachableStore {
    async fn recent_items(&self, _since_days: i64) -> Result<Vec<StoredItem>, ScoutError> {
        Err(ScoutError::Store("connection refused".into()))
    }

    async fn insert(&self, item: NewContentItem) -> Result<InsertOutcome, ScoutError> {
        self.inner.insert(item).await
    }
}

pub struct Fakes {
    pub search: Arc<ScriptedSearch>,
    pub evaluator: Arc<ScoreByUrl>,
    pub refiner: Arc<ScriptedRefiner>,
    pub store: Arc<InMemoryContentStore>,
}

impl Fakes {
    pub fn new(search: ScriptedSearch, evaluator: ScoreByUrl, refiner: ScriptedRefiner) -> Self {
        Self {
            search: Arc::new(search),
            evaluator: Arc::new(evaluator),
            refiner: Arc::new(refiner),
            store: Arc::new(InMemoryContentStore::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            search: self.search.clone(),
            evaluator: self.evaluator.clone(),
            refiner: self.refiner.clone(),
            store: self.store.clone(),
        }
    }
}
