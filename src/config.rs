use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::vocabulary::Vocabulary;

pub const DEFAULT_COMPANIES_SOURCE: &str =
    "https://raw.githubusercontent.com/lerrua/remote-jobs-brazil/main/README.md";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Posting store; defaults to the platform data directory.
    pub store: Option<PathBuf>,
    pub crawler: CrawlerConfig,
    pub scoring: ScoringConfig,
    pub vocabulary: Vocabulary,
    pub adzuna: AdzunaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub request_delay_ms: u64,
    pub user_agent: String,
    /// Companies probed at once. 1 keeps the run strictly sequential.
    pub concurrency: usize,
    /// Headless browser sessions allowed at once.
    pub browser_pool: usize,
    pub browser_timeout_scale: u32,
    /// Re-fetch a page through the browser when static HTML yields nothing.
    pub js_fallback: bool,
    pub default_location: String,
    pub companies_source: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            request_delay_ms: 1000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            concurrency: 1,
            browser_pool: 2,
            browser_timeout_scale: 3,
            js_fallback: false,
            default_location: "Remoto - Brasil".to_string(),
            companies_source: DEFAULT_COMPANIES_SOURCE.to_string(),
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        self.timeout() * self.browser_timeout_scale.max(1)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

/// Adzuna job search API. Credentials come from here or from
/// `ADZUNA_APP_ID` / `ADZUNA_APP_KEY`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdzunaConfig {
    pub app_id: Option<String>,
    pub app_key: Option<String>,
    /// Two-letter country segment of the API path.
    pub country: String,
    #[serde(rename = "where")]
    pub location: String,
    pub max_results: usize,
    /// Joined with OR into the search query when no keywords are given.
    pub skills: Vec<String>,
}

impl Default for AdzunaConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_key: None,
            country: "br".to_string(),
            location: "Brazil".to_string(),
            max_results: 100,
            skills: [
                "Python", "SQL", "Airflow", "PySpark", "Databricks", "Data Engineer",
                "Data Science", "Machine Learning", "Backend", "Full Stack",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl AdzunaConfig {
    /// `(app_id, app_key)`, config values first, then the environment.
    pub fn credentials(&self) -> Result<(String, String), ConfigError> {
        let pick = |value: &Option<String>, var: &'static str| {
            value
                .clone()
                .or_else(|| std::env::var(var).ok())
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };
        Ok((
            pick(&self.app_id, "ADZUNA_APP_ID")?,
            pick(&self.app_key, "ADZUNA_APP_KEY")?,
        ))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub skills_weight: f64,
    pub seniority_weight: f64,
    pub semantic_weight: f64,
    pub min_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            skills_weight: 0.5,
            seniority_weight: 0.3,
            semantic_weight: 0.2,
            min_score: 0.5,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = [self.skills_weight, self.seniority_weight, self.semantic_weight];
        if weights.iter().any(|w| !(0.0..=1.0).contains(w)) {
            return Err(ConfigError::Invalid(
                "scoring weights must each be within [0, 1]".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "scoring weights must sum to 1.0, got {:.3}",
                sum
            )));
        }
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigError::Invalid("min_score must be within [0, 1]".to_string()));
        }
        Ok(())
    }
}

impl Config {
    /// Defaults, then the TOML file if given, then `SCOUT_STORE` from the
    /// environment (a `.env` file in the working directory is honored).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        if let Ok(store) = std::env::var("SCOUT_STORE") {
            if !store.trim().is_empty() {
                config.store = Some(PathBuf::from(store));
            }
        }

        config.scoring.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn store_path(&self) -> PathBuf {
        if let Some(path) = &self.store {
            return path.clone();
        }
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "scout") {
            proj_dirs.data_dir().join("jobs.json")
        } else {
            PathBuf::from("data").join("jobs.json")
        }
    }

    /// Cached company directory, kept next to the store.
    pub fn companies_cache_path(&self) -> PathBuf {
        self.store_path().with_file_name("companies_cache.json")
    }
}
