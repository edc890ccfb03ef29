use std::{
    collections::BTreeMap,
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{LiveCrawl, SearchMode};
use crate::{Category, ScoutError};

const DEFAULT_CONFIG_PATH: &str = "newsscout.toml";
const CONFIG_PATH_ENV: &str = "NEWSSCOUT_CONFIG";
const PROFILE_ENV: &str = "NEWSSCOUT_PROFILE";
/// Accepted range for day-count settings.
const DAY_RANGE: std::ops::RangeInclusive<i64> = 1..=365;

/// Cost profile selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    #[default]
    Production,
    ReducedCost,
}

impl FromStr for Profile {
    type Err = ScoutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "production" | "prod" => Ok(Profile::Production),
            "reduced_cost" | "test" => Ok(Profile::ReducedCost),
            other => Err(ScoutError::InvalidConfiguration(format!(
                "unknown profile: {other}"
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Production => f.write_str("production"),
            Profile::ReducedCost => f.write_str("reduced_cost"),
        }
    }
}

/// Top-level configuration file structure. Every section has defaults so an
/// empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub agents: AgentsConfig,
    pub search: SearchConfig,
    pub evaluation: EvaluationConfig,
    pub dedup: DedupConfig,
    pub llm: LlmConfig,
    pub exa: ExaConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Resolve the immutable settings for one run. An explicit profile wins
    /// over `NEWSSCOUT_PROFILE`, which wins over the file.
    pub fn resolve(&self, profile: Option<Profile>) -> Result<RunSettings, ScoutError> {
        let profile = match profile {
            Some(profile) => profile,
            None => profile_from_env()?.unwrap_or(self.profile),
        };

        let mut targets = BTreeMap::new();
        targets.insert(Category::ConversationalAi, self.agents.targets.conversational_ai);
        targets.insert(Category::GeneralAi, self.agents.targets.general_ai);
        targets.insert(Category::ResearchOpinion, self.agents.targets.research_opinion);

        let mut settings = RunSettings {
            profile,
            targets,
            max_iterations: self.agents.max_iterations,
            threshold_first: self.evaluation.threshold_first,
            threshold_later: self.evaluation.threshold_later,
            refinement_window: self.evaluation.refinement_window,
            search_mode: self.search.mode,
            live_crawl: self.search.live_crawl,
            limit_first: self.search.limit_first,
            limit_later: self.search.limit_later,
            publish_window_days: self.search.publish_window_days,
            user_location: self.search.user_location.clone(),
            summary_chars_default: self.search.summary_chars_default,
            summary_chars_long: self.search.summary_chars_long,
            summary_prompt: self.search.summary_prompt.clone(),
            blocked_domains: self
                .search
                .blocked_domains
                .iter()
                .map(|domain| domain.trim().trim_start_matches("www.").to_ascii_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
            lookback_days: self.dedup.lookback_days,
            cache_enabled: self.cache.enabled,
            cache_dir: self.cache.dir.clone(),
        };

        if profile == Profile::ReducedCost {
            for target in settings.targets.values_mut() {
                *target = 1;
            }
            settings.max_iterations = 1;
            settings.search_mode = SearchMode::Neural;
            settings.live_crawl = LiveCrawl::Never;
            settings.limit_first = 2;
            settings.limit_later = 2;
            settings.summary_chars_default /= 2;
            settings.summary_chars_long /= 2;
        }

        settings.validate()?;
        debug!(%profile, "resolved run settings");
        Ok(settings)
    }
}

fn profile_from_env() -> Result<Option<Profile>, ScoutError> {
    match env::var(PROFILE_ENV) {
        Ok(value) if !value.trim().is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}

/// Helper to load configuration with guard rails.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a provided path or discoverable defaults.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument.
    /// 2. `NEWSSCOUT_CONFIG` environment variable.
    /// 3. `newsscout.toml` in the current working directory, falling back to
    ///    built-in defaults when that file does not exist.
    pub fn load(path: Option<PathBuf>) -> Result<Config, ScoutError> {
        let (candidate, explicit) = resolve_path(path);
        if !explicit && !candidate.exists() {
            debug!(path = %candidate.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(&candidate)
            .map_err(|err| ScoutError::config_io(candidate.clone(), err))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Config, ScoutError> {
        let config: Config =
            toml::from_str(raw).map_err(|err| ScoutError::InvalidConfiguration(err.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &Config) -> Result<(), ScoutError> {
        if config.llm.api_key_env.trim().is_empty() {
            return Err(ScoutError::InvalidConfiguration(
                "llm.api_key_env must reference an environment variable".into(),
            ));
        }
        if config.exa.api_key_env.trim().is_empty() {
            return Err(ScoutError::InvalidConfiguration(
                "exa.api_key_env must reference an environment variable".into(),
            ));
        }
        Ok(())
    }
}

fn resolve_path(path: Option<PathBuf>) -> (PathBuf, bool) {
    if let Some(path) = path {
        return (path, true);
    }

    if let Ok(from_env) = env::var(CONFIG_PATH_ENV) {
        if !from_env.trim().is_empty() {
            return (PathBuf::from(from_env), true);
        }
    }

    (Path::new(DEFAULT_CONFIG_PATH).to_path_buf(), false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    pub max_iterations: u32,
    pub targets: TargetsConfig,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2,
            targets: TargetsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub conversational_ai: usize,
    pub general_ai: usize,
    pub research_opinion: usize,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            conversational_ai: Category::ConversationalAi.default_target(),
            general_ai: Category::GeneralAi.default_target(),
            research_opinion: Category::ResearchOpinion.default_target(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub live_crawl: LiveCrawl,
    pub limit_first: usize,
    pub limit_later: usize,
    pub publish_window_days: i64,
    pub user_location: Option<String>,
    pub summary_chars_default: usize,
    pub summary_chars_long: usize,
    pub summary_prompt: String,
    pub blocked_domains: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Deep,
            live_crawl: LiveCrawl::Always,
            limit_first: 5,
            limit_later: 5,
            publish_window_days: 4,
            user_location: Some("US".to_string()),
            summary_chars_default: 1000,
            summary_chars_long: 1500,
            summary_prompt: "Please give a concise summary".to_string(),
            blocked_domains: [
                "medium.com",
                "dev.to",
                "hackernoon.com",
                "towardsdatascience.com",
                "levelup.gitconnected.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub threshold_first: f64,
    pub threshold_later: f64,
    pub refinement_window: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threshold_first: 4.0,
            threshold_later: 3.8,
            refinement_window: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub lookback_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { lookback_days: 5 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4.1-mini".to_string(),
            temperature: 0.3,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExaConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ExaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exa.ai".to_string(),
            api_key_env: "EXA_API_KEY".to_string(),
            timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".cache/agent_results"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Immutable per-run settings shared by every agent.
#[derive(Debug, Clone, Serialize)]
pub struct RunSettings {
    pub profile: Profile,
    pub targets: BTreeMap<Category, usize>,
    pub max_iterations: u32,
    pub threshold_first: f64,
    pub threshold_later: f64,
    pub refinement_window: usize,
    pub search_mode: SearchMode,
    pub live_crawl: LiveCrawl,
    pub limit_first: usize,
    pub limit_later: usize,
    pub publish_window_days: i64,
    pub user_location: Option<String>,
    pub summary_chars_default: usize,
    pub summary_chars_long: usize,
    pub summary_prompt: String,
    pub blocked_domains: Vec<String>,
    pub lookback_days: i64,
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Config::default()
            .resolve(Some(Profile::Production))
            .expect("built-in defaults are valid")
    }
}

impl RunSettings {
    /// First iteration is strict; later ones relax to compensate for a
    /// narrowing candidate pool.
    pub fn threshold_for(&self, iteration: u32) -> f64 {
        if iteration <= 1 {
            self.threshold_first
        } else {
            self.threshold_later
        }
    }

    pub fn search_limit_for(&self, iteration: u32) -> usize {
        if iteration <= 1 {
            self.limit_first
        } else {
            self.limit_later
        }
    }

    pub fn summary_budget_for(&self, category: Category) -> usize {
        if category.uses_long_summaries() {
            self.summary_chars_long
        } else {
            self.summary_chars_default
        }
    }

    pub fn target_for(&self, category: Category) -> usize {
        self.targets
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_target())
    }

    /// Host matches a blocked domain exactly or as a subdomain.
    pub fn is_blocked_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches("www.").to_ascii_lowercase();
        self.blocked_domains.iter().any(|blocked| {
            host == *blocked
                || host
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn validate(&self) -> Result<(), ScoutError> {
        for (name, threshold) in [
            ("evaluation.threshold_first", self.threshold_first),
            ("evaluation.threshold_later", self.threshold_later),
        ] {
            if !(1.0..=5.0).contains(&threshold) {
                return Err(ScoutError::InvalidConfiguration(format!(
                    "{name} must be within 1.0..=5.0, got {threshold}"
                )));
            }
        }
        if self.max_iterations == 0 {
            return Err(ScoutError::InvalidConfiguration(
                "agents.max_iterations must be at least 1".into(),
            ));
        }
        for (name, days) in [
            ("dedup.lookback_days", self.lookback_days),
            ("search.publish_window_days", self.publish_window_days),
        ] {
            if !DAY_RANGE.contains(&days) {
                return Err(ScoutError::InvalidConfiguration(format!(
                    "{name} must be within {}..={}, got {days}",
                    DAY_RANGE.start(),
                    DAY_RANGE.end()
                )));
            }
        }
        if self.limit_first == 0 || self.limit_later == 0 {
            return Err(ScoutError::InvalidConfiguration(
                "search limits must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_resolves_to_reference_deployment() {
        let config = ConfigLoader::parse("").unwrap();
        let settings = config.resolve(Some(Profile::Production)).unwrap();
        assert_eq!(settings.target_for(Category::ConversationalAi), 3);
        assert_eq!(settings.target_for(Category::ResearchOpinion), 2);
        assert_eq!(settings.max_iterations, 2);
        assert_eq!(settings.threshold_for(1), 4.0);
        assert_eq!(settings.threshold_for(2), 3.8);
        assert_eq!(settings.threshold_for(5), 3.8);
        assert_eq!(settings.lookback_days, 5);
        assert_eq!(settings.summary_budget_for(Category::ResearchOpinion), 1500);
        assert_eq!(settings.summary_budget_for(Category::GeneralAi), 1000);
    }

    #[test]
    fn reduced_cost_changes_only_parameters() {
        let config = ConfigLoader::parse("").unwrap();
        let cheap = config.resolve(Some(Profile::ReducedCost)).unwrap();
        assert!(cheap.targets.values().all(|target| *target == 1));
        assert_eq!(cheap.max_iterations, 1);
        assert_eq!(cheap.live_crawl, LiveCrawl::Never);
        assert_eq!(cheap.search_mode, SearchMode::Neural);
        assert_eq!(cheap.summary_budget_for(Category::GeneralAi), 500);
        assert_eq!(cheap.threshold_for(1), 4.0);
        assert_eq!(cheap.lookback_days, 5);
    }

    #[test]
    fn file_values_override_defaults() {
        let raw = r#"
            profile = "production"

            [agents]
            max_iterations = 4

            [agents.targets]
            general_ai = 5

            [search]
            mode = "neural"
            live_crawl = "never"
            blocked_domains = ["www.Example.com"]

            [evaluation]
            threshold_first = 4.5
        "#;
        let settings = ConfigLoader::parse(raw)
            .unwrap()
            .resolve(Some(Profile::Production))
            .unwrap();
        assert_eq!(settings.max_iterations, 4);
        assert_eq!(settings.target_for(Category::GeneralAi), 5);
        assert_eq!(settings.target_for(Category::ConversationalAi), 3);
        assert_eq!(settings.search_mode, SearchMode::Neural);
        assert_eq!(settings.threshold_for(1), 4.5);
        assert_eq!(settings.blocked_domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn example_file_matches_defaults() {
        let config = ConfigLoader::parse(include_str!("../../../newsscout.example.toml")).unwrap();
        let from_file = config.resolve(Some(Profile::Production)).unwrap();
        let defaults = RunSettings::default();
        assert_eq!(from_file.targets, defaults.targets);
        assert_eq!(from_file.blocked_domains, defaults.blocked_domains);
        assert_eq!(from_file.search_mode, defaults.search_mode);
        assert_eq!(from_file.threshold_later, defaults.threshold_later);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let config = ConfigLoader::parse("[evaluation]\nthreshold_later = 6.0").unwrap();
        let err = config.resolve(Some(Profile::Production)).unwrap_err();
        assert!(matches!(err, ScoutError::InvalidConfiguration(_)));
    }

    #[test]
    fn lookback_days_are_bounded() {
        for raw in ["[dedup]\nlookback_days = 0", "[dedup]\nlookback_days = 100000000"] {
            let err = ConfigLoader::parse(raw)
                .unwrap()
                .resolve(Some(Profile::Production))
                .unwrap_err();
            assert!(err.to_string().contains("dedup.lookback_days"), "{raw}: {err}");
        }
        let settings = ConfigLoader::parse("[dedup]\nlookback_days = 365")
            .unwrap()
            .resolve(Some(Profile::Production))
            .unwrap();
        assert_eq!(settings.lookback_days, 365);
    }

    #[test]
    fn publish_window_days_are_bounded() {
        for raw in [
            "[search]\npublish_window_days = 0",
            "[search]\npublish_window_days = -3",
            "[search]\npublish_window_days = 366",
        ] {
            let err = ConfigLoader::parse(raw)
                .unwrap()
                .resolve(Some(Profile::Production))
                .unwrap_err();
            assert!(err.to_string().contains("search.publish_window_days"), "{raw}: {err}");
        }
    }

    #[test]
    fn blocked_hosts_match_subdomains_only_on_label_boundary() {
        let settings = RunSettings::default();
        assert!(settings.is_blocked_host("medium.com"));
        assert!(settings.is_blocked_host("www.medium.com"));
        assert!(settings.is_blocked_host("blog.medium.com"));
        assert!(!settings.is_blocked_host("notmedium.com"));
        assert!(!settings.is_blocked_host("anthropic.com"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigLoader::load(Some(dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ScoutError::ConfigIo { .. }));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("newsscout.toml");
        fs::write(&path, "[dedup]\nlookback_days = 7\n").unwrap();
        let config = ConfigLoader::load(Some(path)).unwrap();
        assert_eq!(config.dedup.lookback_days, 7);
    }
}
