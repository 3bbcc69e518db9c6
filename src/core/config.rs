//! Engine configuration loaded from `<store>/tenderhub.toml`.

use crate::core::error::TenderError;
use crate::core::lifecycle::TransitionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "tenderhub.toml";

pub const DEFAULT_QUORUM: u32 = 3;
pub const DEFAULT_DECISION_ATTEMPTS: u32 = 3;
pub const DEFAULT_PAGE_LIMIT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Approvals needed to close a bid as `Approved`.
    pub quorum: u32,
    /// Whether tender/bid status writes must follow `Created -> Published -> Closed`.
    pub status_transitions: TransitionPolicy,
    /// Attempts for the decision compare-and-swap before giving up.
    pub decision_attempts: u32,
    pub default_page_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quorum: DEFAULT_QUORUM,
            status_transitions: TransitionPolicy::Permissive,
            decision_attempts: DEFAULT_DECISION_ATTEMPTS,
            default_page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl EngineConfig {
    fn check(self) -> Result<Self, TenderError> {
        if self.quorum == 0 {
            return Err(TenderError::ValidationError(
                "quorum must be at least 1".to_string(),
            ));
        }
        if self.decision_attempts == 0 {
            return Err(TenderError::ValidationError(
                "decision_attempts must be at least 1".to_string(),
            ));
        }
        if self.default_page_limit == 0 {
            return Err(TenderError::ValidationError(
                "default_page_limit must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Load the engine config from the store root.
/// No config file = defaults (not an error).
pub fn load_config(root: &Path) -> Result<EngineConfig, TenderError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(&config_path).map_err(TenderError::IoError)?;
    parse_config(&content)
}

/// Write the default config unless one exists. Returns true when a file was written.
pub fn write_default_config(root: &Path) -> Result<bool, TenderError> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        return Ok(false);
    }
    let body = toml::to_string(&EngineConfig::default())
        .map_err(|e| TenderError::StorageError(format!("{}: {}", CONFIG_FILE_NAME, e)))?;
    fs::write(&config_path, body)?;
    Ok(true)
}

pub fn parse_config(content: &str) -> Result<EngineConfig, TenderError> {
    let config: EngineConfig = toml::from_str(content)
        .map_err(|e| TenderError::ValidationError(format!("{}: {}", CONFIG_FILE_NAME, e)))?;
    config.check()
}
