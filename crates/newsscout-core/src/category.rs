//! The fixed set of specialist topics and their base query templates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ScoutError;

const CONVERSATIONAL_AI_QUERY: &str = "\
Recent voice AI and conversational agent updates for AI Product Managers (past 24-96 hours).

Areas of interest: real-time voice platforms, streaming speech APIs, agent frameworks, \
multi-agent orchestration, speech-to-text and text-to-speech advances, voice cloning, \
conversational UX patterns, agentic workflows, function calling and tool use.

Focus on: product announcements, API updates, new capabilities, enterprise deployments and \
technical posts from companies building in this space.

Avoid: basic tutorials, getting started guides, support pages, news aggregators and generic \
news coverage. Prefer original sources and official announcements.";

const GENERAL_AI_QUERY: &str = "\
Recent product launches and updates from AI startups and emerging companies for AI Product \
Managers (past 24-96 hours).

Areas of interest: new AI tools and platforms from startups, funding announcements with product \
details, developer tools, infrastructure startups, vertical AI solutions, open-source releases \
from smaller teams.

Focus on: company announcements, launches, technical innovations and novel applications.

Avoid: the largest AI labs and platform companies, generic explainers, tutorials, support pages \
and news aggregators. Prefer company blogs and posts from startup engineering teams.";

const RESEARCH_OPINION_QUERY: &str = "\
Recent AI research and strategic insights for AI Product Managers (past 24-96 hours).

Areas of interest: adoption trends, competitive landscape analysis, technical breakthroughs with \
business impact, novel use cases, AI safety and regulatory developments, benchmark results.

Focus on: ML research papers, data-driven analysis, case studies with results, market reports \
and technical deep-dives.

Avoid: speculative opinion pieces, trend listicles, hype without substance and news \
aggregators. Prefer original research and thoughtful analysis.";

/// Specialist topic an agent is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Voice AI, agent frameworks, real-time conversational systems
    ConversationalAi,
    /// Launches from startups and emerging AI companies
    GeneralAi,
    /// Research, analysis and strategic commentary
    ResearchOpinion,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::ConversationalAi,
        Category::GeneralAi,
        Category::ResearchOpinion,
    ];

    pub fn slug(&self) -> &'static str {
        match self {
            Category::ConversationalAi => "conversational_ai",
            Category::GeneralAi => "general_ai",
            Category::ResearchOpinion => "research_opinion",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::ConversationalAi => "Conversational AI",
            Category::GeneralAi => "General AI",
            Category::ResearchOpinion => "Research/Opinion",
        }
    }

    pub fn base_query(&self) -> &'static str {
        match self {
            Category::ConversationalAi => CONVERSATIONAL_AI_QUERY,
            Category::GeneralAi => GENERAL_AI_QUERY,
            Category::ResearchOpinion => RESEARCH_OPINION_QUERY,
        }
    }

    /// Article target in the reference deployment.
    pub fn default_target(&self) -> usize {
        match self {
            Category::ConversationalAi | Category::GeneralAi => 3,
            Category::ResearchOpinion => 2,
        }
    }

    /// Research/opinion pieces get the larger summary budget.
    pub fn uses_long_summaries(&self) -> bool {
        matches!(self, Category::ResearchOpinion)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Category {
    type Err = ScoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.slug() == value.trim())
            .ok_or_else(|| ScoutError::InvalidConfiguration(format!("unknown category: {value}")))
    }
}
