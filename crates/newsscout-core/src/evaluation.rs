//! Reconciles raw evaluator judgments with the candidates that were sent,
//! recomputing every score and decision locally.

use std::collections::HashMap;

use crate::dedup::canonical_url;
use crate::model::{Candidate, Evaluation};
use crate::provider::Judgment;

/// Outcome for one candidate of an evaluated batch.
#[derive(Debug, Clone)]
pub enum Verdict {
    Judged(Evaluation),
    /// The evaluator returned nothing usable for this candidate.
    Missing,
}

#[derive(Debug, Clone)]
pub struct Reconciled {
    pub candidate: Candidate,
    pub verdict: Verdict,
}

/// Pair judgments with candidates, preserving candidate order.
///
/// A judgment matches by canonical URL first. A judgment that carries no URL
/// matches the candidate at the same position. Anything left unmatched is
/// `Verdict::Missing`.
pub fn reconcile(
    candidates: Vec<Candidate>,
    judgments: Vec<Judgment>,
    threshold: f64,
) -> Vec<Reconciled> {
    let mut by_url: HashMap<String, Judgment> = HashMap::new();
    let mut positional: Vec<Option<Judgment>> = Vec::with_capacity(judgments.len());
    for judgment in judgments {
        match &judgment.url {
            Some(url) => {
                by_url.entry(canonical_url(url)).or_insert(judgment);
                positional.push(None);
            }
            None => positional.push(Some(judgment)),
        }
    }

    candidates
        .into_iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let judgment = by_url
                .remove(&canonical_url(&candidate.url))
                .or_else(|| positional.get_mut(idx).and_then(Option::take));
            let verdict = match judgment {
                Some(judgment) => Verdict::Judged(Evaluation::judge(
                    candidate.url.clone(),
                    judgment.scores,
                    threshold,
                    judgment.rationale,
                )),
                None => Verdict::Missing,
            };
            Reconciled { candidate, verdict }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Category;
    use crate::model::{Decision, SubScores};

    fn candidate(url: &str) -> Candidate {
        Candidate {
            url: url.to_string(),
            title: String::new(),
            summary: String::new(),
            published_at: None,
            category: Category::ResearchOpinion,
            provider_score: None,
            source: None,
        }
    }

    fn judgment(url: Option<&str>, score: f64) -> Judgment {
        Judgment {
            url: url.map(String::from),
            scores: SubScores::from_raw(score, score, score, score),
            rationale: format!("scored {score}"),
        }
    }

    #[test]
    fn matches_by_url_regardless_of_order() {
        let reconciled = reconcile(
            vec![candidate("https://a.dev/1"), candidate("https://b.dev/2")],
            vec![
                judgment(Some("https://b.dev/2/"), 2.0),
                judgment(Some("https://a.dev/1"), 5.0),
            ],
            4.0,
        );
        let decisions: Vec<_> = reconciled
            .iter()
            .map(|r| match &r.verdict {
                Verdict::Judged(evaluation) => Some(evaluation.decision),
                Verdict::Missing => None,
            })
            .collect();
        assert_eq!(decisions, vec![Some(Decision::Keep), Some(Decision::Discard)]);
    }

    #[test]
    fn falls_back_to_position_without_urls() {
        let reconciled = reconcile(
            vec![candidate("https://a.dev/1"), candidate("https://b.dev/2")],
            vec![judgment(None, 4.0)],
            4.0,
        );
        assert!(matches!(reconciled[0].verdict, Verdict::Judged(_)));
        assert!(matches!(reconciled[1].verdict, Verdict::Missing));
    }

    #[test]
    fn unknown_urls_leave_candidates_unjudged() {
        let reconciled = reconcile(
            vec![candidate("https://a.dev/1")],
            vec![judgment(Some("https://elsewhere.dev/x"), 5.0)],
            4.0,
        );
        assert!(matches!(reconciled[0].verdict, Verdict::Missing));
    }

    #[test]
    fn evaluation_url_is_the_candidate_url() {
        let reconciled = reconcile(
            vec![candidate("https://a.dev/1?utm_source=feed")],
            vec![judgment(Some("https://a.dev/1"), 4.0)],
            3.8,
        );
        match &reconciled[0].verdict {
            Verdict::Judged(evaluation) => {
                assert_eq!(evaluation.url, "https://a.dev/1?utm_source=feed");
                assert_eq!(evaluation.threshold, 3.8);
            }
            Verdict::Missing => panic!("expected a judgment"),
        }
    }
}
