// Server configuration from environment variables
//
// Every option has a default so a bare `baton-server` starts against
// ./baton.db and ./content. Unknown enum values are a startup error.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Result};

/// Where workflow/agent definitions come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentBackend {
    Filesystem,
    Database,
}

impl FromStr for ContentBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "filesystem" => Ok(Self::Filesystem),
            "database" => Ok(Self::Database),
            other => bail!("unknown content backend: {other} (expected filesystem|database)"),
        }
    }
}

/// How content under the root is located
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    Autodiscover,
    Manual,
}

impl FromStr for DiscoveryMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "autodiscover" => Ok(Self::Autodiscover),
            "manual" => Ok(Self::Manual),
            other => bail!("unknown discovery method: {other} (expected autodiscover|manual)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the SQLite database file (BATON_DB_PATH)
    pub db_path: PathBuf,

    /// Root of the content tree (BATON_CONTENT_PATH)
    pub content_path: PathBuf,

    /// Definition source (BATON_BACKEND)
    pub backend: ContentBackend,

    /// Content discovery mode (BATON_DISCOVERY)
    pub discovery_method: DiscoveryMethod,

    /// Seed the database with bundled content on startup (BATON_SEED_DB)
    pub seed_db: bool,

    /// Cadence of the running-step timeout sweeper, seconds
    /// (BATON_SWEEP_INTERVAL_SECS)
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("baton.db"),
            content_path: PathBuf::from("./content"),
            backend: ContentBackend::Filesystem,
            discovery_method: DiscoveryMethod::Autodiscover,
            seed_db: false,
            sweep_interval_secs: 60,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let db_path = std::env::var("BATON_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let content_path = std::env::var("BATON_CONTENT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.content_path);
        let backend = match std::env::var("BATON_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.backend,
        };
        let discovery_method = match std::env::var("BATON_DISCOVERY") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.discovery_method,
        };
        let seed_db = match std::env::var("BATON_SEED_DB") {
            Ok(raw) => matches!(raw.as_str(), "1" | "true" | "yes"),
            Err(_) => defaults.seed_db,
        };
        let sweep_interval_secs = match std::env::var("BATON_SWEEP_INTERVAL_SECS") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.sweep_interval_secs,
        };

        Ok(Self {
            db_path,
            content_path,
            backend,
            discovery_method,
            seed_db,
            sweep_interval_secs,
        })
    }
}
