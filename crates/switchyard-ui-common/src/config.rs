//! Configuration for switchyard front ends.
//!
//! [`SwitchyardConfig`] is stored in `~/.switchyard/config.toml`. Partial files
//! are accepted; unspecified values use the defaults below.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use switchyard_core::game::DEFAULT_RHO_THRESHOLD;
use switchyard_core::GameOptions;

use crate::error::{Error, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    /// Run loop settings.
    pub game: GameConfig,

    /// Scenario loading.
    pub scenario: ScenarioConfig,

    /// Text rendering.
    pub display: DisplayConfig,
}

/// Run loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Overload ratio at which a run stops (`rho >= threshold` on any line).
    pub rho_threshold: f64,

    /// Give up after this many ticks without an overload.
    pub max_ticks: Option<u64>,

    /// Empty the ledger once the simulator accepted the submitted action.
    pub clear_after_submit: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            rho_threshold: DEFAULT_RHO_THRESHOLD,
            max_ticks: None,
            clear_after_submit: true,
        }
    }
}

impl GameConfig {
    pub fn to_options(&self) -> GameOptions {
        GameOptions {
            rho_threshold: self.rho_threshold,
            max_ticks: self.max_ticks,
            clear_after_submit: self.clear_after_submit,
        }
    }
}

/// Scenario loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Scenario used when none is given on the command line.
    pub default_path: Option<PathBuf>,
}

/// Text rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width of each column in the line table.
    pub column_width: usize,

    /// Print the line table above the pending action.
    pub show_topology: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            column_width: 4,
            show_topology: true,
        }
    }
}

impl SwitchyardConfig {
    /// Get the default config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".switchyard"))
    }

    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Load configuration from the default location.
    ///
    /// Returns default config if file doesn't exist.
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| Error::Config("could not determine config directory".to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn check(&self) -> Result<()> {
        if !self.game.rho_threshold.is_finite() || self.game.rho_threshold <= 0.0 {
            return Err(Error::Config(format!(
                "game.rho_threshold must be positive, got {}",
                self.game.rho_threshold
            )));
        }
        if self.display.column_width == 0 {
            return Err(Error::Config("display.column_width must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SwitchyardConfig::default();
        assert_eq!(config.game.rho_threshold, 0.99);
        assert_eq!(config.game.max_ticks, None);
        assert!(config.game.clear_after_submit);
        assert_eq!(config.scenario.default_path, None);
        assert_eq!(config.display.column_width, 4);
        assert!(config.display.show_topology);
    }

    #[test]
    fn test_partial_config_parsing() {
        let toml = r#"
            [game]
            rho_threshold = 0.95

            [display]
            show_topology = false
        "#;

        let config: SwitchyardConfig = toml::from_str(toml).unwrap();

        assert_eq!(config.game.rho_threshold, 0.95);
        assert!(!config.display.show_topology);

        // Defaults for unset values
        assert!(config.game.clear_after_submit);
        assert_eq!(config.display.column_width, 4);
        assert_eq!(config.scenario.default_path, None);
    }

    #[test]
    fn test_save_and_load() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut config = SwitchyardConfig::default();
        config.game.max_ticks = Some(500);
        config.scenario.default_path = Some(PathBuf::from("scenarios/demo.yaml"));
        config.save_to(&path).unwrap();

        let loaded = SwitchyardConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.game.to_options().max_ticks, Some(500));
    }

    #[test]
    fn test_rejects_bad_threshold() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[game]\nrho_threshold = -1.0\n").unwrap();

        let err = SwitchyardConfig::load_from(&file.path().to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
