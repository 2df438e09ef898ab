//! Workbench configuration: where to run and which D1 database to target.
//!
//! The JSON keys match the `/api/initial-data` payload so the same file can
//! seed both the terminal front ends and the HTTP surface.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::engine::state::DEFAULT_MIGRATION_NAME;

/// File looked up in the current directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "d1flow.json";

/// Environment override for the working directory
pub const ENV_WORKDIR: &str = "D1FLOW_WORKDIR";
/// Environment override for the database name
pub const ENV_DATABASE: &str = "D1FLOW_DATABASE";

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkbenchConfig {
    /// Project root containing `prisma/` and `migrations/`
    pub working_directory: PathBuf,
    /// D1 database name as declared in wrangler.toml
    pub database_name: String,
    /// Initial migration name for the create step
    pub migration_name: String,
    /// Listen address for `serve`
    pub bind: String,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            working_directory: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            database_name: String::new(),
            migration_name: DEFAULT_MIGRATION_NAME.to_string(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl WorkbenchConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file. Missing keys take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let db = self.database_name.trim();
        if db.is_empty() {
            anyhow::bail!("Database name must be specified");
        }
        if self.database_name.contains(char::is_whitespace) {
            anyhow::bail!("Database name cannot contain whitespace");
        }

        if self.migration_name.trim().is_empty() {
            anyhow::bail!("Migration name must be specified");
        }

        if self.working_directory.as_os_str().is_empty() {
            anyhow::bail!("Working directory must be specified");
        }

        self.bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid bind address '{}'", self.bind))?;

        Ok(())
    }

    /// Apply `D1FLOW_WORKDIR` / `D1FLOW_DATABASE` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_WORKDIR) {
            debug!("{} overrides working directory: {}", ENV_WORKDIR, dir);
            self.working_directory = PathBuf::from(dir);
        }
        if let Some(db) = lookup(ENV_DATABASE) {
            debug!("{} overrides database name: {}", ENV_DATABASE, db);
            self.database_name = db;
        }
    }
}

/// Fetch the session's starting configuration. Never fails.
///
/// Reads `path` if given, else `d1flow.json` in the current directory if it
/// exists, then applies environment overrides. A file that cannot be read or
/// parsed is logged and the defaults are kept.
pub fn fetch_config(path: Option<&Path>) -> WorkbenchConfig {
    let candidate = match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.exists().then_some(default)
        }
    };

    let mut config = match candidate {
        Some(file) => match WorkbenchConfig::load_from_file(&file) {
            Ok(config) => {
                info!("Loaded configuration from {}", file.display());
                config
            }
            Err(e) => {
                warn!("Error fetching configuration: {:#}; using defaults", e);
                WorkbenchConfig::default()
            }
        },
        None => {
            debug!("No configuration file, using defaults");
            WorkbenchConfig::default()
        }
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config
}
