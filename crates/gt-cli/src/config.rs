//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use gt_core::settings::Settings;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Engine settings forwarded to the session engine.
    #[serde(flatten)]
    pub settings: Settings,
    /// Path to the retry-queue backup file.
    pub queue_backup_path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("queue_backup_path", &self.queue_backup_path)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = dirs_state_path()
            .or_else(dirs_data_path)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            settings: Settings::default(),
            queue_backup_path: state_dir.join("queue.json"),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (GT_*)
        figment = figment.merge(Env::prefixed("GT_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for gt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gt"))
}

/// Returns the platform-specific data directory for gt.
///
/// On Linux: `~/.local/share/gt`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("gt"))
}

/// Returns the platform-specific state directory for gt.
///
/// On Linux: `~/.local/state/gt`
pub fn dirs_state_path() -> Option<PathBuf> {
    dirs::state_dir().map(|p| p.join("gt"))
}
