use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::flags::DEFAULT_RELATION_NAME;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5432;
const DEFAULT_STATE_PATH: &str = "pgsql-relation-state.json";
const DEFAULT_SERVICE_STATE: &str = "standalone";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    pub relation_name: String,
    pub host: String,
    pub port: u16,
    pub state_path: PathBuf,
    /// Published verbatim as the `state` field of every answer.
    pub service_state: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PGSQL_RELATION_NAME: {0}")]
    InvalidRelationName(String),
    #[error("invalid PGSQL_HOST: {0}")]
    InvalidHost(String),
    #[error("invalid PGSQL_PORT: {0}")]
    InvalidPort(String),
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            relation_name: DEFAULT_RELATION_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            service_state: DEFAULT_SERVICE_STATE.to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; blank values count as
    /// unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let relation_name =
            read("PGSQL_RELATION_NAME").unwrap_or_else(|| DEFAULT_RELATION_NAME.to_string());
        if relation_name.contains(char::is_whitespace) || relation_name.contains('.') {
            return Err(ConfigError::InvalidRelationName(relation_name));
        }

        let host = read("PGSQL_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        if host.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidHost(host));
        }

        let port = match read("PGSQL_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|port| *port != 0)
                .ok_or(ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let state_path = read("PGSQL_STATE_PATH")
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_PATH), PathBuf::from);
        let service_state =
            read("PGSQL_SERVICE_STATE").unwrap_or_else(|| DEFAULT_SERVICE_STATE.to_string());

        Ok(Self {
            relation_name,
            host,
            port,
            state_path,
            service_state,
        })
    }
}
