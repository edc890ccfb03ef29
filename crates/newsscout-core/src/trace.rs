use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::Category;

/// What happened at one step of an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Plan,
    Search,
    Blocked,
    Duplicate,
    DedupSkipped,
    Evaluated,
    Refined,
    RefineFailed,
    ProviderFailure,
    CacheHit,
    Done,
}

impl TraceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceKind::Plan => "plan",
            TraceKind::Search => "search",
            TraceKind::Blocked => "blocked",
            TraceKind::Duplicate => "duplicate",
            TraceKind::DedupSkipped => "dedup_skipped",
            TraceKind::Evaluated => "evaluated",
            TraceKind::Refined => "refined",
            TraceKind::RefineFailed => "refine_failed",
            TraceKind::ProviderFailure => "provider_failure",
            TraceKind::CacheHit => "cache_hit",
            TraceKind::Done => "done",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub category: Category,
    pub iteration: u32,
    pub kind: TraceKind,
    pub message: String,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(
        category: Category,
        iteration: u32,
        kind: TraceKind,
        message: impl Into<String>,
    ) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            category,
            iteration,
            kind,
            message: message.into(),
            timestamp_ms,
        }
    }
}

/// Ordered audit trail of one specialist run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(
        &mut self,
        category: Category,
        iteration: u32,
        kind: TraceKind,
        message: impl Into<String>,
    ) {
        self.events
            .push(TraceEvent::new(category, iteration, kind, message));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn count(&self, kind: TraceKind) -> usize {
        self.events.iter().filter(|event| event.kind == kind).count()
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary::from_events(&self.events)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceStep {
    pub index: usize,
    pub category: Category,
    pub iteration: u32,
    pub kind: TraceKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceSummary {
    pub steps: Vec<TraceStep>,
}

impl TraceSummary {
    pub fn from_events(events: &[TraceEvent]) -> Self {
        let steps = events
            .iter()
            .enumerate()
            .map(|(idx, event)| TraceStep {
                index: idx + 1,
                category: event.category,
                iteration: event.iteration,
                kind: event.kind,
                message: event.message.clone(),
            })
            .collect();
        Self { steps }
    }

    pub fn render_markdown(&self) -> String {
        if self.steps.is_empty() {
            return "No trace events recorded.".to_string();
        }
        let mut output = String::from("### Trace Summary\n");
        for step in &self.steps {
            let _ = writeln!(
                output,
                "{}. [{} #{}] {}: {}",
                step.index,
                step.category,
                step.iteration,
                step.kind.as_str(),
                step.message
            );
        }
        output
    }
}

/// Write any serializable trace payload as pretty JSON to `<dir>/<run_id>.json`.
pub fn persist_trace<P: AsRef<Path>, T: Serialize + ?Sized>(
    dir: P,
    run_id: &str,
    payload: &T,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = dir.join(format!("{run_id}.json"));
    let bytes = serde_json::to_vec_pretty(payload)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&bytes)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}
