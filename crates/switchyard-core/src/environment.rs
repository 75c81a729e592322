//! The simulation facade as seen by the substation game.
//!
//! Grid physics, rewards and the `done` signal live behind the
//! [`Environment`] trait; this crate only consumes them.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{SwitchyardError, SwitchyardResult};
use crate::ledger::CompositeAction;
use crate::topology::Topology;
use crate::{Busbar, ElementCategory};

/// Snapshot of the grid after a reset or a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub line_or_bus: Vec<Busbar>,
    pub line_ex_bus: Vec<Busbar>,
    pub gen_bus: Vec<Busbar>,
    pub load_bus: Vec<Busbar>,
    /// Per-line utilisation ratio (flow / thermal limit)
    pub rho: Vec<f64>,
    /// Simulated wall-clock time of the snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<NaiveDateTime>,
}

impl Observation {
    /// Baseline busbar vector for a category.
    pub fn buses(&self, category: ElementCategory) -> &[Busbar] {
        match category {
            ElementCategory::LinesOr => &self.line_or_bus,
            ElementCategory::LinesEx => &self.line_ex_bus,
            ElementCategory::Generators => &self.gen_bus,
            ElementCategory::Loads => &self.load_bus,
        }
    }

    pub fn buses_mut(&mut self, category: ElementCategory) -> &mut Vec<Busbar> {
        match category {
            ElementCategory::LinesOr => &mut self.line_or_bus,
            ElementCategory::LinesEx => &mut self.line_ex_bus,
            ElementCategory::Generators => &mut self.gen_bus,
            ElementCategory::Loads => &mut self.load_bus,
        }
    }

    /// Highest line loading, or 0.0 for a grid without lines.
    pub fn max_rho(&self) -> f64 {
        self.rho.iter().copied().fold(0.0, f64::max)
    }

    /// Lines whose loading is at or above `threshold`.
    pub fn overloaded_lines(&self, threshold: f64) -> Vec<usize> {
        self.rho
            .iter()
            .enumerate()
            .filter(|(_, rho)| **rho >= threshold)
            .map(|(line, _)| line)
            .collect()
    }
}

/// Result of one simulation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f64,
    /// The episode is over; the facade must be reset before stepping again.
    pub done: bool,
    #[serde(default)]
    pub info: BTreeMap<String, String>,
}

/// A grid simulator the game can drive.
///
/// Implementations own all physics. `step` returns an error for actions it
/// cannot apply; ending the episode is reported through `done`, not an error.
pub trait Environment: Send {
    /// Static topology; fixed for the lifetime of the environment.
    fn topology(&self) -> &Topology;

    /// Start a new episode.
    fn reset(&mut self) -> SwitchyardResult<Observation>;

    /// Apply `action` and advance one tick.
    fn step(&mut self, action: &CompositeAction) -> SwitchyardResult<StepOutcome>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn topology(&self) -> &Topology {
        (**self).topology()
    }

    fn reset(&mut self) -> SwitchyardResult<Observation> {
        (**self).reset()
    }

    fn step(&mut self, action: &CompositeAction) -> SwitchyardResult<StepOutcome> {
        (**self).step(action)
    }
}

/// Check that every `set_bus` entry names an existing element and a legal busbar.
///
/// [`Busbar::DISCONNECTED`] is accepted for any element.
pub fn check_action(topology: &Topology, action: &CompositeAction) -> SwitchyardResult<()> {
    for category in ElementCategory::ALL {
        let len = topology.category_len(category);
        for (index, busbar) in action.set_bus.get(category) {
            if *index >= len {
                return Err(SwitchyardError::InvalidAction(format!(
                    "{category} index {index} out of range (have {len})"
                )));
            }
            if *busbar != Busbar::DISCONNECTED && !topology.is_valid_busbar(*busbar) {
                return Err(SwitchyardError::InvalidAction(format!(
                    "{category} index {index}: busbar {busbar} not in 1..={}",
                    topology.n_busbar_per_sub()
                )));
            }
        }
    }
    Ok(())
}

/// Check that an observation has one busbar per element and one `rho` per line.
pub fn check_observation(topology: &Topology, observation: &Observation) -> SwitchyardResult<()> {
    for category in ElementCategory::ALL {
        let expected = topology.category_len(category);
        let got = observation.buses(category).len();
        if got != expected {
            return Err(SwitchyardError::Environment(format!(
                "observation has {got} {category} busbars, topology has {expected}"
            )));
        }
    }
    if observation.rho.len() != topology.n_line() {
        return Err(SwitchyardError::Environment(format!(
            "observation has {} rho values, topology has {} lines",
            observation.rho.len(),
            topology.n_line()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SubstationId;

    fn topology() -> Topology {
        let sid = SubstationId::new;
        Topology::new(2, 2, vec![sid(0)], vec![sid(1)], vec![sid(0)], vec![sid(1)]).unwrap()
    }

    #[test]
    fn test_overloaded_lines_use_inclusive_threshold() {
        let obs = Observation {
            rho: vec![0.5, 0.99, 1.2],
            ..Observation::default()
        };
        assert_eq!(obs.overloaded_lines(0.99), vec![1, 2]);
        assert_eq!(obs.max_rho(), 1.2);
        assert_eq!(Observation::default().max_rho(), 0.0);
    }

    #[test]
    fn test_check_observation_shape() {
        let topology = topology();
        let mut obs = Observation {
            line_or_bus: vec![Busbar::new(1)],
            line_ex_bus: vec![Busbar::new(1)],
            gen_bus: vec![Busbar::new(1)],
            load_bus: vec![Busbar::new(2)],
            rho: vec![0.3],
            timestamp: None,
        };
        assert!(check_observation(&topology, &obs).is_ok());

        obs.rho.clear();
        assert!(matches!(
            check_observation(&topology, &obs),
            Err(SwitchyardError::Environment(_))
        ));

        let err = check_observation(&topology, &Observation::default()).unwrap_err();
        assert!(err.to_string().contains("lines_or"), "{err}");
    }

    #[test]
    fn test_buses_by_category() {
        let mut obs = Observation {
            gen_bus: vec![Busbar::new(2)],
            ..Observation::default()
        };
        assert_eq!(obs.buses(ElementCategory::Generators), &[Busbar::new(2)]);
        obs.buses_mut(ElementCategory::Loads).push(Busbar::new(1));
        assert_eq!(obs.load_bus, vec![Busbar::new(1)]);
    }

    #[test]
    fn test_check_action_accepts_legal_changes() {
        let mut action = CompositeAction::do_nothing();
        action.set_bus.lines_ex_id.push((0, Busbar::new(2)));
        action.set_bus.loads_id.push((0, Busbar::DISCONNECTED));
        assert!(check_action(&topology(), &action).is_ok());
    }

    #[test]
    fn test_check_action_rejects_unknown_element_and_busbar() {
        let mut action = CompositeAction::do_nothing();
        action.set_bus.generators_id.push((4, Busbar::new(1)));
        let err = check_action(&topology(), &action).unwrap_err();
        assert!(matches!(err, SwitchyardError::InvalidAction(_)));

        let mut action = CompositeAction::do_nothing();
        action.set_bus.lines_or_id.push((0, Busbar::new(3)));
        assert!(check_action(&topology(), &action).is_err());
    }
}
