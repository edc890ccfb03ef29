//! URL-identity deduplication against the content store's recent window.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};
use url::Url;

use crate::metrics;
use crate::model::Candidate;
use crate::store::{ContentStore, StoredItem};

/// Query parameters that never identify content.
const TRACKING_PARAMS: &[&str] = &[
    "ref", "ref_src", "fbclid", "gclid", "mc_cid", "mc_eid", "igshid", "si", "source",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Identity key for a URL: https scheme, no fragment, no tracking parameters
/// and no trailing slash. Anything else that differs is distinct content.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.trim_end_matches('/').to_string();
    };

    if url.scheme() == "http" {
        // http -> https is always permitted between special schemes.
        let _ = url.set_scheme("https");
    }
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut canonical = url.to_string();
    if url.query().is_none() && canonical.ends_with('/') {
        canonical.pop();
    }
    canonical
}

/// Lower-cased host of a URL, if it has one.
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

/// A candidate dropped because the store already holds its URL.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    pub candidate: Candidate,
    pub matched: StoredItem,
}

#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub fresh: Vec<Candidate>,
    pub duplicates: Vec<DuplicateMatch>,
    /// The store could not be read and nothing was filtered.
    pub skipped: bool,
}

/// Drop candidates whose canonical URL matches an item created within the
/// last `lookback_days`. The window is read fresh on every call. An
/// unreachable store skips the check with a warning.
pub async fn filter_duplicates(
    store: &dyn ContentStore,
    candidates: Vec<Candidate>,
    lookback_days: i64,
) -> DedupOutcome {
    if candidates.is_empty() {
        return DedupOutcome::default();
    }

    let recent = match store.recent_items(lookback_days).await {
        Ok(items) => items,
        Err(err) => {
            warn!(
                error = %err,
                candidates = candidates.len(),
                "content store unreachable; continuing without cross-run deduplication"
            );
            return DedupOutcome {
                fresh: candidates,
                duplicates: Vec::new(),
                skipped: true,
            };
        }
    };

    let seen: HashMap<String, StoredItem> = recent
        .into_iter()
        .map(|item| (canonical_url(&item.url), item))
        .collect();

    let mut outcome = DedupOutcome::default();
    for candidate in candidates {
        match seen.get(&canonical_url(&candidate.url)) {
            Some(matched) => {
                info!(
                    category = %candidate.category,
                    url = %candidate.url,
                    title = %candidate.title,
                    matched_source_type = %matched.source_type,
                    matched_source_name = %matched.source_name,
                    matched_created = %matched.created_at.format("%Y-%m-%d"),
                    "duplicate of recently stored content"
                );
                outcome.duplicates.push(DuplicateMatch {
                    candidate,
                    matched: matched.clone(),
                });
            }
            None => outcome.fresh.push(candidate),
        }
    }

    if !outcome.duplicates.is_empty() {
        metrics::record_duplicates(outcome.duplicates.len());
        info!(
            duplicates = outcome.duplicates.len(),
            lookback_days, "filtered cross-run duplicates"
        );
    }
    outcome
}

/// Collapse repeated URLs within one response, keeping the first occurrence.
pub fn collapse_repeats(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(canonical_url(&candidate.url)))
        .collect()
}
