//! Service configuration from the environment.
//!
//! Every key is optional; unset keys take the defaults below. A `.env` file in
//! the working directory is loaded first when present.
//!
//! | Key                                  | Default          |
//! |--------------------------------------|------------------|
//! | `CARTD_ADDR`                         | `127.0.0.1:8080` |
//! | `CARTD_API_PREFIX`                   | `/api`           |
//! | `CARTD_CACHE_TTL_SECS`               | `300`            |
//! | `CARTD_SWEEP_INTERVAL_SECS`          | `60`             |
//! | `CARTD_RATE_GLOBAL_LIMIT` / `_INTERVAL_SECS`      | `100` / `60` |
//! | `CARTD_RATE_READ_LIMIT` / `_INTERVAL_SECS`        | `60` / `60`  |
//! | `CARTD_RATE_WRITE_LIMIT` / `_INTERVAL_SECS`       | `30` / `60`  |
//! | `CARTD_RATE_CART_MODIFY_LIMIT` / `_INTERVAL_SECS` | `20` / `60`  |
//!
//! A tier's bucket refills `LIMIT` tokens evenly over `INTERVAL_SECS`; an
//! interval of `0` never refills. A sweep interval of `0` turns off the
//! periodic purge of expired cache entries and idle buckets.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::cache::DEFAULT_TTL;
use crate::security::{RateLimitConfig, Tier, TierPolicy};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },

    #[error("{key} must start with '/', got {value:?}")]
    InvalidPrefix { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub addr: String,
    pub api_prefix: String,
    pub cache_ttl: Duration,
    /// How often expired cache entries and idle buckets are dropped.
    pub sweep_interval: Duration,
    pub rate_limits: RateLimitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".to_owned(),
            api_prefix: "/api".to_owned(),
            cache_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for the first key whose value does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        info!(
            addr = %config.addr,
            api_prefix = %config.api_prefix,
            cache_ttl_secs = config.cache_ttl.as_secs(),
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] for the first key whose value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let addr = lookup("CARTD_ADDR").unwrap_or(defaults.addr);
        let api_prefix = lookup("CARTD_API_PREFIX").unwrap_or(defaults.api_prefix);
        if !api_prefix.starts_with('/') {
            return Err(ConfigError::InvalidPrefix {
                key: "CARTD_API_PREFIX",
                value: api_prefix,
            });
        }

        let cache_ttl = match parse(&lookup, "CARTD_CACHE_TTL_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.cache_ttl,
        };

        let sweep_interval = match parse(&lookup, "CARTD_SWEEP_INTERVAL_SECS")? {
            Some(secs) => Duration::from_secs(secs),
            None => defaults.sweep_interval,
        };

        let mut rate_limits = defaults.rate_limits;
        for tier in [Tier::Global, Tier::Read, Tier::Write, Tier::CartModify] {
            let policy = tier_policy(&lookup, tier, rate_limits.policy(tier))?;
            match tier {
                Tier::Global => rate_limits.global = policy,
                Tier::Read => rate_limits.read = policy,
                Tier::Write => rate_limits.write = policy,
                Tier::CartModify => rate_limits.cart_modify = policy,
            }
        }

        Ok(Self {
            addr,
            api_prefix,
            cache_ttl,
            sweep_interval,
            rate_limits,
        })
    }
}

fn tier_policy<F>(lookup: &F, tier: Tier, default: TierPolicy) -> Result<TierPolicy, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let name = tier.as_str().to_ascii_uppercase();
    let limit = parse(lookup, &format!("CARTD_RATE_{name}_LIMIT"))?.unwrap_or(default.limit);
    let interval = parse(lookup, &format!("CARTD_RATE_{name}_INTERVAL_SECS"))?
        .map(Duration::from_secs)
        .unwrap_or(default.interval);
    Ok(TierPolicy::new(limit, interval))
}

fn parse<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_owned(),
                value: raw,
            }),
    }
}
