use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://story-frontend-zuu1.vercel.app";
pub const DEFAULT_MAX_LENGTH: u32 = 200;

/// Bounds the story service accepts for `max_length`.
pub const MAX_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

const API_URL_VAR: &str = "STORY_API_URL";
const MAX_LENGTH_VAR: &str = "STORY_MAX_LENGTH";
const IDLE_TIMEOUT_VAR: &str = "STORY_IDLE_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid story API url '{value}': {source}")]
    InvalidUrl {
        value: String,
        source: url::ParseError,
    },
    #[error("story API url '{0}' cannot be used as a base url")]
    NotABase(String),
    #[error("{name} must be a number, got '{value}'")]
    NotANumber { name: &'static str, value: String },
    #[error("max length {0} is outside the accepted range 1..=1000")]
    MaxLengthOutOfRange(u32),
}

/// Settings for talking to the story-generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryConfig {
    pub api_url: Url,
    pub max_length: u32,
    pub idle_timeout: Option<Duration>,
}

impl StoryConfig {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let max_length = match lookup(MAX_LENGTH_VAR) {
            Some(raw) => parse_number(MAX_LENGTH_VAR, &raw)?,
            None => DEFAULT_MAX_LENGTH,
        };

        let idle_timeout = lookup(IDLE_TIMEOUT_VAR)
            .map(|raw| parse_number(IDLE_TIMEOUT_VAR, &raw))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(u64::from(secs)));

        let mut config = Self {
            api_url: parse_base_url(&api_url)?,
            max_length: DEFAULT_MAX_LENGTH,
            idle_timeout,
        };
        config.set_max_length(max_length)?;
        Ok(config)
    }

    /// Apply command line overrides on top of the environment.
    pub fn with_overrides(
        mut self,
        api_url: Option<&str>,
        max_length: Option<u32>,
    ) -> Result<Self, ConfigError> {
        if let Some(api_url) = api_url {
            self.api_url = parse_base_url(api_url)?;
        }
        if let Some(max_length) = max_length {
            self.set_max_length(max_length)?;
        }
        Ok(self)
    }

    fn set_max_length(&mut self, max_length: u32) -> Result<(), ConfigError> {
        if !MAX_LENGTH_RANGE.contains(&max_length) {
            return Err(ConfigError::MaxLengthOutOfRange(max_length));
        }
        self.max_length = max_length;
        Ok(())
    }
}

fn parse_number(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::NotANumber {
        name,
        value: raw.to_string(),
    })
}

/// Parse the service url and make sure its path ends in `/`, so that
/// endpoint paths join beneath it instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        value: raw.to_string(),
        source,
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABase(raw.to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
