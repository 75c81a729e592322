use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use switchyard_scenarios::{validate, ReplayEnvironment};
use switchyard_ui_common::SwitchyardConfig;
use tracing::warn;

/// Configuration from `--config`, or the user's default file.
pub fn load_config(path: Option<&Path>) -> Result<SwitchyardConfig> {
    let config = match path {
        Some(path) => SwitchyardConfig::load_from(&path.to_path_buf())
            .with_context(|| format!("loading config '{}'", path.display()))?,
        None => SwitchyardConfig::load().context("loading default config")?,
    };
    Ok(config)
}

/// The scenario named on the command line, falling back to `scenario.default_path`.
pub fn resolve_scenario(arg: Option<&PathBuf>, config: &SwitchyardConfig) -> Result<PathBuf> {
    match arg.or(config.scenario.default_path.as_ref()) {
        Some(path) => Ok(path.clone()),
        None => bail!("no scenario given and scenario.default_path is not configured"),
    }
}

/// Open a scenario, logging validation warnings.
pub fn open_scenario(path: &Path) -> Result<ReplayEnvironment> {
    let environment = ReplayEnvironment::open(path)?;
    let diag = validate(environment.scenario());
    for issue in &diag.issues {
        warn!("{issue}");
    }
    Ok(environment)
}
