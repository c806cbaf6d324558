//! Daemon configuration from `DISPATCH_*` environment variables

use anyhow::{bail, Context, Result};
use dispatch_core::application::constants::{
    DEFAULT_CONNECTION_EXPIRY, DEFAULT_REBROADCAST_INTERVAL, DEFAULT_SWEEP_BATCH_SIZE,
    DEFAULT_SWEEP_INTERVAL,
};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.dispatch/dispatch.db";
const DEFAULT_RPC_PORT: u16 = 9627;
const DEFAULT_DELEGATE_CACHE_TTL: Duration = Duration::from_secs(30);
const DEFAULT_LEADER_LEASE: Duration = Duration::from_secs(30);
const DEFAULT_RATE_LIMIT_BURST: u32 = 200;
const DEFAULT_RATE_LIMIT_RATE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub rpc_port: u16,
    pub log_format: LogFormat,
    pub sweep_interval: Duration,
    pub connection_expiry: Duration,
    pub sweep_batch_size: usize,
    pub rebroadcast_interval: Duration,
    pub delegate_cache_ttl: Duration,
    /// `None` runs as the only primary
    pub leader_lease: Option<Duration>,
    pub feature_flags: String,
    pub rate_limit_burst: u32,
    pub rate_limit_rate: u32,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("DISPATCH_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let log_format = match lookup("DISPATCH_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => bail!(
                "DISPATCH_LOG_FORMAT must be 'json' or 'pretty', got '{}'",
                other
            ),
        };

        let lease_secs: u64 = parse_or(
            &lookup,
            "DISPATCH_LEADER_LEASE_SECS",
            DEFAULT_LEADER_LEASE.as_secs(),
        )?;

        let sweep_batch_size =
            parse_or(&lookup, "DISPATCH_SWEEP_BATCH_SIZE", DEFAULT_SWEEP_BATCH_SIZE)?;
        if sweep_batch_size == 0 {
            bail!("DISPATCH_SWEEP_BATCH_SIZE must be positive");
        }

        Ok(Self {
            db_path,
            rpc_port: parse_or(&lookup, "DISPATCH_RPC_PORT", DEFAULT_RPC_PORT)?,
            log_format,
            sweep_interval: secs_or(
                &lookup,
                "DISPATCH_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL,
            )?,
            connection_expiry: secs_or(
                &lookup,
                "DISPATCH_CONNECTION_EXPIRY_SECS",
                DEFAULT_CONNECTION_EXPIRY,
            )?,
            sweep_batch_size,
            rebroadcast_interval: secs_or(
                &lookup,
                "DISPATCH_REBROADCAST_INTERVAL_SECS",
                DEFAULT_REBROADCAST_INTERVAL,
            )?,
            delegate_cache_ttl: secs_or(
                &lookup,
                "DISPATCH_DELEGATE_CACHE_TTL_SECS",
                DEFAULT_DELEGATE_CACHE_TTL,
            )?,
            leader_lease: (lease_secs > 0).then(|| Duration::from_secs(lease_secs)),
            feature_flags: lookup("DISPATCH_FEATURE_FLAGS").unwrap_or_default(),
            rate_limit_burst: parse_or(
                &lookup,
                "DISPATCH_RATE_LIMIT_BURST",
                DEFAULT_RATE_LIMIT_BURST,
            )?,
            rate_limit_rate: parse_or(&lookup, "DISPATCH_RATE_LIMIT_RATE", DEFAULT_RATE_LIMIT_RATE)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

/// Interval in whole seconds; zero is rejected
fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs: u64 = parse_or(lookup, key, default.as_secs())?;
    if secs == 0 {
        bail!("{} must be positive", key);
    }
    Ok(Duration::from_secs(secs))
}
