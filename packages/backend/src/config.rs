// packages/backend/src/config.rs
use crate::types::SurveyDefinition;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Queue depth before publish starts waiting
pub const DEFAULT_HUB_CAPACITY: usize = 100;

pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub survey_path: PathBuf,
    pub hub_capacity: usize,
    pub reset_grace: Duration,
    pub log_filter: String,
}

impl Config {
    pub fn new() -> Self {
        Self {
            bind_addr: std::env::var("LIVEPOLL_BIND").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            survey_path: std::env::var("LIVEPOLL_SURVEY")
                .unwrap_or_else(|_| "survey.json".to_string())
                .into(),
            hub_capacity: DEFAULT_HUB_CAPACITY,
            // ✨ clients get 2s to show the shutdown notice before state is wiped
            reset_grace: Duration::from_secs(2),
            log_filter: "livepoll=info,tower_http=info".to_string(),
        }
    }

    pub fn load_survey(&self) -> anyhow::Result<SurveyDefinition> {
        load_survey(&self.survey_path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_survey(path: &Path) -> anyhow::Result<SurveyDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading survey file {}", path.display()))?;
    parse_survey(&raw).with_context(|| format!("parsing survey file {}", path.display()))
}

pub fn parse_survey(raw: &str) -> anyhow::Result<SurveyDefinition> {
    let survey: SurveyDefinition = serde_json::from_str(raw)?;
    anyhow::ensure!(!survey.token.as_str().is_empty(), "survey token must not be empty");
    anyhow::ensure!(!survey.secret.is_empty(), "admin secret must not be empty");
    Ok(survey)
}
