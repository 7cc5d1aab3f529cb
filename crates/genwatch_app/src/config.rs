use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use engine_logging::LogDestination;
use genwatch_engine::{ClientSettings, EngineSettings, PollSettings};
use log::LevelFilter;
use thiserror::Error;

pub const ENV_BASE_URL: &str = "GENWATCH_BASE_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "GENWATCH_POLL_INTERVAL_MS";
pub const ENV_MAX_POLLS: &str = "GENWATCH_MAX_POLLS";
pub const ENV_STATE_DIR: &str = "GENWATCH_STATE_DIR";
pub const ENV_LOG: &str = "GENWATCH_LOG";
pub const ENV_LOG_LEVEL: &str = "GENWATCH_LOG_LEVEL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
    pub state_dir: PathBuf,
    pub log_destination: LogDestination,
    pub log_level: LevelFilter,
}

impl AppConfig {
    /// Reads the process environment, seeded from `./.env` when present.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client = ClientSettings::default();
        let poll = PollSettings::default();

        let base_url = lookup(ENV_BASE_URL).unwrap_or(client.base_url);
        let poll_interval = match lookup(ENV_POLL_INTERVAL_MS) {
            Some(raw) => Duration::from_millis(parse_positive(ENV_POLL_INTERVAL_MS, &raw)?),
            None => poll.interval,
        };
        let max_polls = match lookup(ENV_MAX_POLLS) {
            Some(raw) => u32::try_from(parse_positive(ENV_MAX_POLLS, &raw)?).map_err(|_| {
                ConfigError::Invalid {
                    name: ENV_MAX_POLLS,
                    expected: "a positive 32-bit integer",
                    value: raw.clone(),
                }
            })?,
            None => poll.max_polls,
        };
        let state_dir = lookup(ENV_STATE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let log_destination = match lookup(ENV_LOG) {
            Some(raw) => LogDestination::parse(&raw).ok_or(ConfigError::Invalid {
                name: ENV_LOG,
                expected: "one of file, terminal, both",
                value: raw,
            })?,
            None => LogDestination::File,
        };
        let log_level = match lookup(ENV_LOG_LEVEL) {
            Some(raw) => LevelFilter::from_str(raw.trim()).map_err(|_| ConfigError::Invalid {
                name: ENV_LOG_LEVEL,
                expected: "a log level",
                value: raw,
            })?,
            None => LevelFilter::Info,
        };

        Ok(Self {
            base_url,
            poll_interval,
            max_polls,
            state_dir,
            log_destination,
            log_level,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            client: ClientSettings {
                base_url: self.base_url.clone(),
                ..ClientSettings::default()
            },
            poll: PollSettings {
                interval: self.poll_interval,
                max_polls: self.max_polls,
                ..PollSettings::default()
            },
            ..EngineSettings::default()
        }
    }
}

fn parse_positive(name: &'static str, raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            name,
            expected: "a positive integer",
            value: raw.to_string(),
        }),
    }
}
