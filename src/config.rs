use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CachePolicy;
use crate::classify::ClassificationScheme;
use crate::error::ConfigError;
use crate::subjects::default_keywords;

pub const CONFIG_PATH_ENV: &str = "CLASSROOM_INSIGHTS_CONFIG";
pub const CACHE_TTL_ENV: &str = "CLASSROOM_INSIGHTS_CACHE_TTL_SECS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_ttl_secs: u64,
    pub empty_average: f64,
    pub status_cuts: [f64; 3],
    pub letter_cuts: [f64; 4],
    pub subject_keywords: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let scheme = ClassificationScheme::default();
        Config {
            cache_ttl_secs: 300,
            empty_average: 0.0,
            status_cuts: scheme.status_cuts(),
            letter_cuts: scheme.letter_cuts(),
            subject_keywords: default_keywords(),
        }
    }
}

impl Config {
    /// Reads the JSON file when one is given, then applies env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let path = path.map(Path::to_path_buf).or_else(|| env_path.map(Into::into));

        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Config::from_json(&raw).map_err(|source| ConfigError::Parse {
                    path: path.display().to_string(),
                    source,
                })?
            }
            None => Config::default(),
        };

        if let Ok(value) = std::env::var(CACHE_TTL_ENV) {
            config.cache_ttl_secs = value.trim().parse().map_err(|_| ConfigError::Env {
                key: CACHE_TTL_ENV.to_string(),
                value,
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache_policy()?;
        if !self.empty_average.is_finite() || !(0.0..=100.0).contains(&self.empty_average) {
            return Err(ConfigError::EmptyAverage(self.empty_average));
        }
        self.scheme()?;
        Ok(())
    }

    pub fn scheme(&self) -> Result<ClassificationScheme, ConfigError> {
        Ok(ClassificationScheme::new(self.status_cuts, self.letter_cuts)?)
    }

    pub fn cache_policy(&self) -> Result<CachePolicy, ConfigError> {
        CachePolicy::from_secs(self.cache_ttl_secs)
    }
}
