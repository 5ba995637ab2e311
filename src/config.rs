//! Runtime configuration.
//!
//! Everything is read from the process environment (a `.env` file is loaded by
//! `main` first). Only `DATABASE_URL` and `EVENT_NAME` are required.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use chrono_tz::Tz;
use thiserror::Error;

use crate::bitcoin::chain::Chain;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub event: EventConfig,
    pub database_url: String,
    pub bind_address: String,
    pub chain: Chain,
    /// Zone used for the timestamps in JSON responses.
    pub time_zone: Tz,
    pub explorer: ExplorerConfig,
    pub mail: MailConfig,
    pub rpc: RpcConfig,
}

/// Values shown on every page and email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    pub event_name: String,
    /// Empty in production, otherwise appended to titles and subjects.
    pub environment_name: String,
    pub host_url: String,
}

#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from: String,
    pub send_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub wallet: String,
    pub cookie: Option<PathBuf>,
}

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:25202";
const DEFAULT_HOST_URL: &str = "http://localhost:25202";
const DEFAULT_EXPLORER_URL: &str = "https://blockchain.info";
const DEFAULT_EXPLORER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_MAIL_FROM: &str = "webmaster@localhost";
const DEFAULT_SEND_ATTEMPTS: u32 = 3;
const DEFAULT_RPC_WALLET: &str = "pool";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let chain = match get("BITCOIN_CHAIN") {
            Some(chain) => Chain::from_str(&chain).map_err(|message| ConfigError::Invalid {
                key: "BITCOIN_CHAIN",
                message,
            })?,
            None => Chain::Mainnet,
        };

        let timeout_secs: u64 = parse_or(&get, "EXPLORER_TIMEOUT_SECS", DEFAULT_EXPLORER_TIMEOUT_SECS)?;
        let send_attempts: u32 = parse_or(&get, "MAIL_SEND_ATTEMPTS", DEFAULT_SEND_ATTEMPTS)?;
        let smtp_port: u16 = parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?;
        let time_zone: Tz = parse_or(&get, "TIME_ZONE", Tz::UTC)?;

        let wallet = get("BITCOIN_RPC_WALLET").unwrap_or_else(|| DEFAULT_RPC_WALLET.to_string());
        let rpc_url = get("BITCOIN_RPC_URL").unwrap_or_else(|| {
            format!(
                "http://localhost:{}/wallet/{}",
                chain.default_rpc_port(),
                wallet
            )
        });

        let config = Self {
            event: EventConfig {
                event_name: get("EVENT_NAME").ok_or(ConfigError::Missing("EVENT_NAME"))?,
                environment_name: get("ENVIRONMENT_NAME").unwrap_or_default(),
                host_url: get("HOST_URL")
                    .unwrap_or_else(|| DEFAULT_HOST_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            },
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            chain,
            time_zone,
            explorer: ExplorerConfig {
                base_url: get("EXPLORER_URL")
                    .unwrap_or_else(|| DEFAULT_EXPLORER_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout: Duration::from_secs(timeout_secs),
            },
            mail: MailConfig {
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| "localhost".to_string()),
                smtp_port,
                smtp_username: get("SMTP_USERNAME"),
                smtp_password: get("SMTP_PASSWORD"),
                from: get("MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
                send_attempts,
            },
            rpc: RpcConfig {
                url: rpc_url,
                wallet,
                cookie: get("BITCOIN_RPC_COOKIE").map(PathBuf::from),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.explorer.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "EXPLORER_TIMEOUT_SECS",
                message: "must be greater than zero".to_string(),
            });
        }

        if self.mail.send_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "MAIL_SEND_ATTEMPTS",
                message: "must be at least 1".to_string(),
            });
        }

        if self.mail.smtp_username.is_some() != self.mail.smtp_password.is_some() {
            return Err(ConfigError::Invalid {
                key: "SMTP_USERNAME",
                message: "SMTP_USERNAME and SMTP_PASSWORD must be set together".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
