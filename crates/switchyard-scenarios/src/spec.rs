use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use switchyard_core::{Busbar, Diagnostics, ElementCategory, Topology};

/// A recorded episode: the grid topology plus what the simulator reported at every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    pub name: String,
    pub description: Option<String>,
    pub topology: Topology,
    #[serde(default)]
    pub initial_buses: InitialBuses,
    /// Line loading reported by `reset`; zeros when absent.
    #[serde(default)]
    pub initial_rho: Option<Vec<f64>>,
    pub start_time: Option<String>,
    #[serde(default = "default_step_minutes")]
    pub step_minutes: i64,
    #[serde(default = "default_reward")]
    pub default_reward: f64,
    /// Tick (1-based) at which the simulator gives up, independent of loading.
    pub done_at: Option<u64>,
    #[serde(default)]
    pub ticks: Vec<TickSpec>,
}

fn default_step_minutes() -> i64 {
    5
}

fn default_reward() -> f64 {
    1.0
}

/// Busbar assignment at reset, per category. Missing vectors mean "all on busbar 1".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitialBuses {
    pub lines_or: Option<Vec<Busbar>>,
    pub lines_ex: Option<Vec<Busbar>>,
    pub generators: Option<Vec<Busbar>>,
    pub loads: Option<Vec<Busbar>>,
}

impl InitialBuses {
    pub fn get(&self, category: ElementCategory) -> Option<&Vec<Busbar>> {
        match category {
            ElementCategory::LinesOr => self.lines_or.as_ref(),
            ElementCategory::LinesEx => self.lines_ex.as_ref(),
            ElementCategory::Generators => self.generators.as_ref(),
            ElementCategory::Loads => self.loads.as_ref(),
        }
    }

    /// The vector for `category`, filled with busbar 1 when not given.
    pub fn resolve(&self, category: ElementCategory, len: usize) -> Vec<Busbar> {
        self.get(category)
            .cloned()
            .unwrap_or_else(|| vec![Busbar::new(1); len])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickSpec {
    pub rho: Vec<f64>,
    pub reward: Option<f64>,
}

pub fn load_scenario_from_path(path: &Path) -> Result<ScenarioFile> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading scenario '{}'", path.display()))?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml::from_str(&data).context("parsing scenario yaml")
        }
        Some(ext) if ext.eq_ignore_ascii_case("json") => {
            serde_json::from_str(&data).context("parsing scenario json")
        }
        _ => serde_yaml::from_str(&data)
            .or_else(|_| serde_json::from_str(&data))
            .context("parsing scenario"),
    }
}

/// Collect every inconsistency between the recorded ticks and the topology.
pub fn validate(scenario: &ScenarioFile) -> Diagnostics {
    let mut diag = Diagnostics::new();
    let topology = &scenario.topology;
    topology.validate_into(&mut diag);

    if scenario.name.trim().is_empty() {
        diag.add_error("scenario", "name cannot be empty");
    }
    for category in ElementCategory::ALL {
        let expected = topology.category_len(category);
        if let Some(buses) = scenario.initial_buses.get(category) {
            if buses.len() != expected {
                diag.add_error(
                    "scenario",
                    &format!(
                        "initial {category} has {} entries, topology has {expected}",
                        buses.len()
                    ),
                );
            }
            for (index, busbar) in buses.iter().enumerate() {
                if *busbar != Busbar::DISCONNECTED && !topology.is_valid_busbar(*busbar) {
                    diag.add_error_with_entity(
                        "scenario",
                        &format!("initial busbar {busbar} is not a legal busbar"),
                        &format!("{category} {index}"),
                    );
                }
            }
        }
    }
    if let Some(rho) = &scenario.initial_rho {
        if rho.len() != topology.n_line() {
            diag.add_error(
                "scenario",
                &format!(
                    "initial_rho has {} entries, topology has {} lines",
                    rho.len(),
                    topology.n_line()
                ),
            );
        }
    }
    if scenario.ticks.is_empty() {
        diag.add_warning("scenario", "no ticks recorded; the first step ends the episode");
    }
    for (tick, spec) in scenario.ticks.iter().enumerate() {
        if spec.rho.len() != topology.n_line() {
            diag.add_error_with_entity(
                "scenario",
                &format!(
                    "rho has {} entries, topology has {} lines",
                    spec.rho.len(),
                    topology.n_line()
                ),
                &format!("Tick {}", tick + 1),
            );
        }
    }
    if scenario.done_at == Some(0) {
        diag.add_error("scenario", "done_at counts ticks from 1");
    }
    if scenario.step_minutes <= 0 {
        diag.add_error("scenario", "step_minutes must be positive");
    }
    if let Some(start) = &scenario.start_time {
        match parse_start_time(start) {
            Ok(start) if scenario.step_minutes > 0 => {
                // One step past the recording is still reported with a timestamp.
                let last_tick = scenario.ticks.len() as u64 + 1;
                if tick_time(start, scenario.step_minutes, last_tick).is_none() {
                    diag.add_error(
                        "scenario",
                        &format!(
                            "step_minutes {} over {} ticks runs past the supported date range",
                            scenario.step_minutes, last_tick
                        ),
                    );
                }
            }
            Ok(_) => {}
            Err(err) => diag.add_error("scenario", &format!("{err:#}")),
        }
    }
    diag
}

/// Wall-clock time of `tick`, or `None` when it cannot be represented.
pub fn tick_time(start: NaiveDateTime, step_minutes: i64, tick: u64) -> Option<NaiveDateTime> {
    let minutes = i64::try_from(tick).ok()?.checked_mul(step_minutes)?;
    start.checked_add_signed(Duration::try_minutes(minutes)?)
}

pub fn parse_start_time(value: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .map_err(|_| anyhow!("parsing start time '{}'; use RFC3339", value))
}
