use dialer_core::{DispatchSettings, LiveKitCredentials, RetryPolicy};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// Conversation history is only persisted when this is set.
    pub database_url: Option<String>,
    pub livekit: LiveKitCredentials,
    pub dispatch: DispatchSettings,
    /// Queue depth per observer before it is dropped as too slow.
    pub observer_buffer: usize,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let livekit = LiveKitCredentials {
            url: required("LIVEKIT_URL")?,
            api_key: required("LIVEKIT_API_KEY")?,
            api_secret: required("LIVEKIT_API_SECRET")?,
        };

        let defaults = DispatchSettings::default();
        let provider_timeout_secs: u64 = optional("PROVIDER_TIMEOUT_SECS", 15)?;
        if !(1..=300).contains(&provider_timeout_secs) {
            return Err(ConfigError::InvalidValue(
                "PROVIDER_TIMEOUT_SECS".to_string(),
                format!("{provider_timeout_secs} is outside 1..=300"),
            ));
        }
        let dispatch = DispatchSettings {
            agent_name: std::env::var("AGENT_NAME").unwrap_or(defaults.agent_name),
            room_empty_timeout_secs: optional(
                "ROOM_EMPTY_TIMEOUT_SECS",
                defaults.room_empty_timeout_secs,
            )?,
            max_participants: optional("ROOM_MAX_PARTICIPANTS", defaults.max_participants)?,
            provider_timeout: Duration::from_secs(provider_timeout_secs),
            room_retry: RetryPolicy::with_max_retries(optional("ROOM_CREATE_RETRIES", 0)?),
            country_code: std::env::var("PHONE_COUNTRY_CODE").unwrap_or(defaults.country_code),
        };

        let observer_buffer: usize = optional("OBSERVER_BUFFER", 64)?;
        if observer_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "OBSERVER_BUFFER".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            database_url,
            livekit,
            dispatch,
            observer_buffer,
            log_level,
        })
    }
}

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn optional<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
