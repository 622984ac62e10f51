//! Global flags, configuration loading and the opened store
//!
//! Configuration precedence: command-line flags over `DOCVAULT_*`
//! environment variables over the YAML file over built-in defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use docvault_storage::{Actor, RevisionManager, StoreConfig};

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Versioned YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data root holding the database and `storage/` (overrides config and env).
    #[arg(long, global = true)]
    pub data_root: Option<PathBuf>,

    /// User name recorded as `created_by` and in the audit trail.
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Role checked against the configured role grants.
    #[arg(long, global = true, default_value = "engineer")]
    pub role: String,

    /// Print JSON instead of aligned text.
    #[arg(long, global = true)]
    pub json: bool,
}

impl GlobalArgs {
    pub fn load_config(&self) -> Result<StoreConfig> {
        let config = match &self.config {
            Some(path) => StoreConfig::from_yaml(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => StoreConfig::new("."),
        };
        let mut config = config
            .apply_env()
            .context("applying DOCVAULT_* environment overrides")?;
        if let Some(root) = &self.data_root {
            config.data_root = root.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// `--user`, else `$USER`, else `docvault`
    pub fn actor(&self) -> Actor {
        let username = self
            .user
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "docvault".to_string());
        Actor::new(username, self.role.clone())
    }
}

/// Opened store plus the identity and output mode of this invocation
pub struct Session {
    pub manager: RevisionManager,
    pub actor: Actor,
    pub json: bool,
}

impl Session {
    pub fn open(args: &GlobalArgs) -> Result<Self> {
        let config = args.load_config()?;
        tracing::debug!(
            data_root = %config.data_root.display(),
            database = %config.database_path().display(),
            "opening store"
        );
        let manager = RevisionManager::open(config).context("opening revision store")?;
        Ok(Self {
            manager,
            actor: args.actor(),
            json: args.json,
        })
    }
}
