//! Operation configuration management

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

const CONFIG_FILE: &str = "ops_config.json";

/// Settings shared by every operation a dispatcher starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpsConfig {
    /// Remote used by fetch when the current branch has no upstream
    pub default_remote: String,

    /// How many times the user may be asked for credentials per operation
    pub max_credential_prompts: u32,

    /// Buffer size of the notification bus
    pub event_capacity: usize,

    /// Offer the SSH agent before prompting
    pub try_ssh_agent: bool,

    /// Ask configured git credential helpers before prompting
    pub use_credential_helper: bool,

    /// Prune deleted remote branches when fetching
    pub prune_on_fetch: bool,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            default_remote: "origin".to_string(),
            max_credential_prompts: 3,
            event_capacity: 256,
            try_ssh_agent: true,
            use_credential_helper: true,
            prune_on_fetch: false,
        }
    }
}

impl OpsConfig {
    /// Load configuration from disk
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let config = serde_json::from_str(&contents)?;
        tracing::debug!("Loaded operation config from {}", config_path.display());
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, contents)?;
        Ok(())
    }
}

/// Per-user configuration directory
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("leviathan"))
}
