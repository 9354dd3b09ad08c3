use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;

/// Demo configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_path: Option<PathBuf>,
    pub actions_path: Option<PathBuf>,
    pub print_events: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            snapshot_path: env::var("STATE_TREE_SNAPSHOT").ok().map(PathBuf::from),
            actions_path: env::var("STATE_TREE_ACTIONS").ok().map(PathBuf::from),
            print_events: env::var("STATE_TREE_PRINT_EVENTS")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .context("STATE_TREE_PRINT_EVENTS must be true or false")?,
        })
    }
}
