//! Server settings loaded from the environment.

use crate::gate::cache::{DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::gate::executor::{DEFAULT_CONCURRENCY_LIMIT, DEFAULT_READ_TIMEOUT};
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid chain RPC entry {entry:?}: expected <chainId>=<url>")]
    InvalidChainEntry { entry: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateSettings {
    pub port: u16,
    pub concurrency_limit: usize,
    pub rpc_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: u64,
    pub content_dir: String,
    /// Chain id to JSON-RPC endpoint.
    pub chain_rpc_urls: BTreeMap<u64, String>,
}

impl GateSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(GateSettings {
            port: parse_or(&lookup, "PORT", 8080)?,
            concurrency_limit: parse_or(&lookup, "GATE_CONCURRENCY_LIMIT", DEFAULT_CONCURRENCY_LIMIT)?,
            rpc_timeout: Duration::from_millis(parse_or(
                &lookup,
                "GATE_RPC_TIMEOUT_MS",
                DEFAULT_READ_TIMEOUT.as_millis() as u64,
            )?),
            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "GATE_CACHE_TTL_SECS",
                DEFAULT_TTL.as_secs(),
            )?),
            cache_max_entries: parse_or(&lookup, "GATE_CACHE_MAX_ENTRIES", DEFAULT_MAX_ENTRIES)?,
            content_dir: lookup("GATE_CONTENT_DIR").unwrap_or_else(|| "./content".to_string()),
            chain_rpc_urls: parse_chain_urls(lookup("GATE_CHAIN_RPC_URLS").as_deref())?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

/// Parse `1=https://a,137=https://b`.
fn parse_chain_urls(raw: Option<&str>) -> Result<BTreeMap<u64, String>, ConfigError> {
    let mut urls = BTreeMap::new();
    let Some(raw) = raw else {
        return Ok(urls);
    };
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (chain, url) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidChainEntry {
                entry: entry.to_string(),
            })?;
        let chain_id: u64 = chain
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidChainEntry {
                entry: entry.to_string(),
            })?;
        let url = url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidChainEntry {
                entry: entry.to_string(),
            });
        }
        urls.insert(chain_id, url.to_string());
    }
    Ok(urls)
}
