use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};
use chrono::NaiveDateTime;
use switchyard_core::environment::check_action;
use switchyard_core::{
    CompositeAction, ElementCategory, Environment, Observation, StepOutcome, SwitchyardError,
    SwitchyardResult, Topology,
};
use tracing::{debug, info};

use crate::spec::{load_scenario_from_path, parse_start_time, tick_time, validate, ScenarioFile};

/// Simulation facade that replays a recorded scenario.
///
/// Busbar changes are applied to the observation as submitted; line loading
/// and rewards come from the recording and do not react to them.
#[derive(Debug, Clone)]
pub struct ReplayEnvironment {
    scenario: ScenarioFile,
    start_time: Option<NaiveDateTime>,
    observation: Observation,
    tick: u64,
    done: bool,
}

impl ReplayEnvironment {
    /// Validate the scenario and build an environment ready to `reset`.
    pub fn from_scenario(scenario: ScenarioFile) -> Result<Self> {
        let diag = validate(&scenario);
        if diag.has_errors() {
            bail!("scenario '{}' is invalid: {}", scenario.name, diag);
        }
        let start_time = scenario
            .start_time
            .as_deref()
            .map(parse_start_time)
            .transpose()?;
        Ok(Self {
            scenario,
            start_time,
            observation: Observation::default(),
            tick: 0,
            done: false,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let scenario = load_scenario_from_path(path)?;
        info!(path = %path.display(), name = %scenario.name, "loaded scenario");
        Self::from_scenario(scenario)
    }

    pub fn scenario(&self) -> &ScenarioFile {
        &self.scenario
    }

    /// Ticks advanced since the last reset.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn timestamp_at(&self, tick: u64) -> SwitchyardResult<Option<NaiveDateTime>> {
        let Some(start) = self.start_time else {
            return Ok(None);
        };
        tick_time(start, self.scenario.step_minutes, tick)
            .map(Some)
            .ok_or_else(|| {
                SwitchyardError::Environment(format!(
                    "tick {tick} at {} minutes per step is out of the date range",
                    self.scenario.step_minutes
                ))
            })
    }
}

impl Environment for ReplayEnvironment {
    fn topology(&self) -> &Topology {
        &self.scenario.topology
    }

    fn reset(&mut self) -> SwitchyardResult<Observation> {
        let topology = &self.scenario.topology;
        let buses = &self.scenario.initial_buses;
        let rho = self
            .scenario
            .initial_rho
            .clone()
            .unwrap_or_else(|| vec![0.0; topology.n_line()]);
        self.observation = Observation {
            line_or_bus: buses.resolve(ElementCategory::LinesOr, topology.n_line()),
            line_ex_bus: buses.resolve(ElementCategory::LinesEx, topology.n_line()),
            gen_bus: buses.resolve(ElementCategory::Generators, topology.n_gen()),
            load_bus: buses.resolve(ElementCategory::Loads, topology.n_load()),
            rho,
            timestamp: self.start_time,
        };
        self.tick = 0;
        self.done = false;
        debug!(scenario = %self.scenario.name, "replay reset");
        Ok(self.observation.clone())
    }

    fn step(&mut self, action: &CompositeAction) -> SwitchyardResult<StepOutcome> {
        if self.done {
            return Err(SwitchyardError::Environment(
                "episode is over; reset before stepping".to_string(),
            ));
        }
        check_action(&self.scenario.topology, action)?;
        let timestamp = self.timestamp_at(self.tick + 1)?;

        for category in ElementCategory::ALL {
            let buses = self.observation.buses_mut(category);
            for (index, busbar) in action.set_bus.get(category) {
                buses[*index] = *busbar;
            }
        }

        self.tick += 1;
        let recorded = usize::try_from(self.tick - 1)
            .ok()
            .and_then(|k| self.scenario.ticks.get(k));
        let reward = match recorded {
            Some(spec) => {
                self.observation.rho = spec.rho.clone();
                spec.reward.unwrap_or(self.scenario.default_reward)
            }
            // Past the end of the recording the simulator gives up.
            None => 0.0,
        };
        self.observation.timestamp = timestamp;
        self.done = recorded.is_none() || self.scenario.done_at.is_some_and(|at| self.tick >= at);

        let mut info = BTreeMap::new();
        info.insert("tick".to_string(), self.tick.to_string());
        info.insert("scenario".to_string(), self.scenario.name.clone());
        if !action.is_do_nothing() {
            info.insert("set_bus".to_string(), action.set_bus.len().to_string());
        }

        debug!(
            tick = self.tick,
            reward,
            done = self.done,
            changes = action.set_bus.len(),
            "replay step"
        );

        Ok(StepOutcome {
            observation: self.observation.clone(),
            reward,
            done: self.done,
            info,
        })
    }
}
