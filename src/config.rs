use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::auth::AdminList;
use crate::engine::CutoffPolicy;

/// Runtime settings, read from `LUNCHBOX_*` variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub timezone: Tz,
    pub cutoff: NaiveTime,
    pub sweep_interval: Duration,
    pub menu_edit_ttl: Duration,
    pub selection_ttl: Duration,
    pub admins: AdminList,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cutoff = match lookup("LUNCHBOX_CUTOFF") {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .map_err(|_| ConfigError::Invalid("LUNCHBOX_CUTOFF", raw))?,
            None => CutoffPolicy::default().cutoff,
        };
        let admins = match lookup("LUNCHBOX_ADMINS") {
            Some(raw) => {
                AdminList::from_json(&raw).map_err(|_| ConfigError::Invalid("LUNCHBOX_ADMINS", raw))?
            }
            None => AdminList::default(),
        };

        Ok(Self {
            bind: lookup("LUNCHBOX_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "LUNCHBOX_PORT", 8085)?,
            data_dir: lookup("LUNCHBOX_DATA_DIR")
                .unwrap_or_else(|| "./data".into())
                .into(),
            metrics_port: parse_opt(&lookup, "LUNCHBOX_METRICS_PORT")?,
            max_connections: parse_or(&lookup, "LUNCHBOX_MAX_CONNECTIONS", 256)?,
            compact_threshold: parse_or(&lookup, "LUNCHBOX_COMPACT_THRESHOLD", 1000)?,
            timezone: parse_or(&lookup, "LUNCHBOX_TIMEZONE", chrono_tz::Asia::Tehran)?,
            cutoff,
            sweep_interval: nonzero_secs(&lookup, "LUNCHBOX_SWEEP_INTERVAL_SECS", 60)?,
            menu_edit_ttl: nonzero_secs(&lookup, "LUNCHBOX_MENU_EDIT_TTL_SECS", 30)?,
            selection_ttl: nonzero_secs(&lookup, "LUNCHBOX_SELECTION_TTL_SECS", 60)?,
            admins,
        })
    }

    pub fn cutoff_policy(&self) -> CutoffPolicy {
        CutoffPolicy::new(self.timezone, self.cutoff)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_opt<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err(ConfigError::Invalid(key, raw)),
        },
        None => Ok(None),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_opt(lookup, key)?.unwrap_or(default))
}

/// Whole seconds; zero is rejected since a zero period cannot drive an interval.
fn nonzero_secs<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid(key, lookup(key).unwrap_or_default())),
        secs => Ok(Duration::from_secs(secs)),
    }
}

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Key and the raw value that failed to parse.
    Invalid(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid(key, raw) => write!(f, "invalid value for {key}: {raw:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}
