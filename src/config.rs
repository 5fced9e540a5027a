//! Runtime configuration loaded from the environment (after `.env`).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_DATABASE_URL: &str = "sqlite://wellness-planner.db?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_GENERATOR_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_GENERATOR_MODEL: &str = "claude-sonnet-4-20250514";

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("Invalid value for {name}: {value}")]
  InvalidValue { name: String, value: String },

  #[error("Invalid URL for {name}: {reason}")]
  InvalidUrl { name: String, reason: String },
}

/// Content generator endpoint; absent when no API key is configured
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
  pub api_key: String,
  pub api_url: Url,
  pub model: String,
  pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
  pub poll_interval: Duration,
  /// Minutes after local midnight during which the daily pass runs
  pub window_minutes: u32,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(60),
      window_minutes: 5,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
  pub poll_interval: Duration,
  /// How long a sent notification waits for a response past its event time
  pub active_window_minutes: i64,
  pub push_webhook: Option<Url>,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(30),
      active_window_minutes: 60,
      push_webhook: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  pub database_url: String,
  pub bind_addr: String,
  pub generator: Option<GeneratorConfig>,
  pub scheduler: SchedulerConfig,
  pub dispatch: DispatchConfig,
}

impl EngineConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let generator = match non_empty("GENERATOR_API_KEY") {
      Some(api_key) => Some(GeneratorConfig {
        api_key,
        api_url: parse_url("GENERATOR_API_URL", DEFAULT_GENERATOR_URL)?,
        model: non_empty("GENERATOR_MODEL").unwrap_or_else(|| DEFAULT_GENERATOR_MODEL.to_string()),
        timeout: Duration::from_secs(parse_or("GENERATOR_TIMEOUT_SECS", 30u64)?),
      }),
      None => None,
    };

    let push_webhook = match non_empty("PUSH_WEBHOOK_URL") {
      Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
        name: "PUSH_WEBHOOK_URL".into(),
        reason: e.to_string(),
      })?),
      None => None,
    };

    Ok(Self {
      database_url: non_empty("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
      bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
      generator,
      scheduler: SchedulerConfig {
        poll_interval: Duration::from_secs(parse_or("SCHEDULER_POLL_SECS", 60u64)?),
        window_minutes: parse_or("MIDNIGHT_WINDOW_MINUTES", 5u32)?,
      },
      dispatch: DispatchConfig {
        poll_interval: Duration::from_secs(parse_or("DISPATCH_POLL_SECS", 30u64)?),
        active_window_minutes: parse_or("NOTIFICATION_ACTIVE_WINDOW_MINUTES", 60i64)?,
        push_webhook,
      },
    })
  }
}

fn non_empty(name: &str) -> Option<String> {
  env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
  match non_empty(name) {
    Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
      name: name.to_string(),
      value: raw,
    }),
    None => Ok(default),
  }
}

fn parse_url(name: &str, default: &str) -> Result<Url, ConfigError> {
  let raw = non_empty(name).unwrap_or_else(|| default.to_string());
  Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl {
    name: name.to_string(),
    reason: e.to_string(),
  })
}
