//! The game loop: submit the pending action, then let the grid run until a line overloads.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::environment::{check_observation, Environment, Observation};
use crate::error::{SwitchyardError, SwitchyardResult};
use crate::ledger::{ActionLedger, CompositeAction};
use crate::topology::Topology;
use crate::{Busbar, ElementRef};

/// Default utilisation ratio at which the run loop hands control back.
pub const DEFAULT_RHO_THRESHOLD: f64 = 0.99;

/// Tunables for [`Game::continue_simulation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameOptions {
    /// Stop as soon as any line has `rho >= rho_threshold`.
    pub rho_threshold: f64,
    /// Give up after this many ticks without an overload. `None` runs until
    /// an overload, a failure or cancellation.
    pub max_ticks: Option<u64>,
    /// Empty the ledger once the simulator has accepted the submitted action.
    pub clear_after_submit: bool,
}

impl Default for GameOptions {
    fn default() -> Self {
        Self {
            rho_threshold: DEFAULT_RHO_THRESHOLD,
            max_ticks: None,
            clear_after_submit: true,
        }
    }
}

/// Progress of one simulated tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub reward: f64,
    pub cumulative_reward: f64,
    pub max_rho: f64,
    pub timestamp: Option<NaiveDateTime>,
}

impl std::fmt::Display for TickReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Running simulation ")?;
        if let Some(ts) = self.timestamp {
            write!(f, "{} ", ts.format("%d/%m/%Y %H:%M"))?;
        } else {
            write!(f, "tick {} ", self.tick)?;
        }
        write!(
            f,
            "Cumulative reward = {} Reward = {}",
            self.cumulative_reward, self.reward
        )
    }
}

/// Outcome of a run that stopped on an overload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Ticks advanced during this run.
    pub ticks: u64,
    pub cumulative_reward: f64,
    /// Lines at or above the threshold in the final observation.
    pub overloaded_lines: Vec<usize>,
    pub max_rho: f64,
    pub observation: Observation,
}

/// One play session on top of a simulation facade.
///
/// Owns the facade, the current observation, the ledger of pending busbar
/// changes and the running reward total.
pub struct Game<E: Environment> {
    environment: E,
    options: GameOptions,
    ledger: ActionLedger,
    observation: Observation,
    cumulative_reward: f64,
}

impl<E: Environment> Game<E> {
    /// Reset the environment and start with an empty ledger.
    pub fn new(mut environment: E, options: GameOptions) -> SwitchyardResult<Self> {
        let observation = environment.reset()?;
        check_observation(environment.topology(), &observation)?;
        Ok(Self {
            environment,
            options,
            ledger: ActionLedger::new(),
            observation,
            cumulative_reward: 0.0,
        })
    }

    pub fn topology(&self) -> &Topology {
        self.environment.topology()
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn ledger(&self) -> &ActionLedger {
        &self.ledger
    }

    pub fn options(&self) -> &GameOptions {
        &self.options
    }

    pub fn set_rho_threshold(&mut self, threshold: f64) {
        self.options.rho_threshold = threshold;
    }

    pub fn cumulative_reward(&self) -> f64 {
        self.cumulative_reward
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Busbar the element will be on once the pending action is applied.
    pub fn effective_busbar(&self, element: ElementRef) -> SwitchyardResult<Busbar> {
        self.check_element(element)?;
        Ok(self.ledger.effective_for(element, &self.observation))
    }

    /// Record a busbar choice against the current observation.
    pub fn upsert(&mut self, element: ElementRef, target: Busbar) -> SwitchyardResult<()> {
        self.check_element(element)?;
        if target != Busbar::DISCONNECTED && !self.topology().is_valid_busbar(target) {
            return Err(SwitchyardError::InvalidAction(format!(
                "{element}: busbar {target} not in 1..={}",
                self.topology().n_busbar_per_sub()
            )));
        }
        self.ledger.upsert_element(element, target, &self.observation);
        Ok(())
    }

    pub fn clear_ledger(&mut self) {
        self.ledger.clear();
    }

    pub fn composite_action(&self) -> CompositeAction {
        self.ledger.to_composite_action()
    }

    /// Start a new episode: reset the facade, the ledger and the reward total.
    pub fn reset(&mut self) -> SwitchyardResult<()> {
        let observation = self.environment.reset()?;
        check_observation(self.topology(), &observation)?;
        self.observation = observation;
        self.ledger.clear();
        self.cumulative_reward = 0.0;
        Ok(())
    }

    /// Submit the pending action and keep stepping with "do nothing" until a
    /// line reaches the overload threshold.
    ///
    /// `on_tick` is called after every step. The token is checked before each
    /// step; a cancelled run keeps the observation reached so far.
    pub fn continue_simulation<F>(
        &mut self,
        cancel: &CancellationToken,
        mut on_tick: F,
    ) -> SwitchyardResult<RunReport>
    where
        F: FnMut(&TickReport),
    {
        let threshold = self.options.rho_threshold;
        let mut pending = Some(self.ledger.to_composite_action());
        let mut tick = 0u64;

        info!(
            pending_changes = self.ledger.len(),
            threshold, "continuing simulation"
        );

        loop {
            if cancel.is_cancelled() {
                warn!(tick, "simulation run cancelled");
                return Err(SwitchyardError::Cancelled { ticks: tick });
            }
            if let Some(max_ticks) = self.options.max_ticks {
                if tick >= max_ticks {
                    warn!(max_ticks, "tick budget exhausted");
                    return Err(SwitchyardError::TickBudgetExhausted { max_ticks });
                }
            }

            let submitting = pending.is_some();
            let action = pending.take().unwrap_or_default();
            let outcome = self.environment.step(&action)?;
            check_observation(self.topology(), &outcome.observation)?;
            if submitting && self.options.clear_after_submit {
                self.ledger.clear();
            }

            tick += 1;
            self.observation = outcome.observation;
            self.cumulative_reward += outcome.reward;

            let report = TickReport {
                tick,
                reward: outcome.reward,
                cumulative_reward: self.cumulative_reward,
                max_rho: self.observation.max_rho(),
                timestamp: self.observation.timestamp,
            };
            debug!(tick, max_rho = report.max_rho, reward = report.reward, "tick");
            on_tick(&report);

            if outcome.done {
                warn!(
                    tick,
                    cumulative_reward = self.cumulative_reward,
                    "simulation ended before any overload"
                );
                return Err(SwitchyardError::SimulationFailed {
                    cumulative_reward: self.cumulative_reward,
                    tick,
                });
            }

            let overloaded_lines = self.observation.overloaded_lines(threshold);
            if !overloaded_lines.is_empty() {
                info!(tick, lines = ?overloaded_lines, "overload threshold reached");
                return Ok(RunReport {
                    ticks: tick,
                    cumulative_reward: self.cumulative_reward,
                    overloaded_lines,
                    max_rho: report.max_rho,
                    observation: self.observation.clone(),
                });
            }
        }
    }

    fn check_element(&self, element: ElementRef) -> SwitchyardResult<()> {
        let len = self.topology().category_len(element.category());
        if element.index() >= len {
            return Err(SwitchyardError::InvalidAction(format!(
                "{element} does not exist (have {len})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{check_action, StepOutcome};
    use crate::{ElementCategory, LineSide, SubstationId};
    use std::collections::BTreeMap;

    /// Two lines (0->1, 1->2), one generator and one load; replays a rho script.
    struct ScriptedEnv {
        topology: Topology,
        rho: Vec<Vec<f64>>,
        done_at: Option<usize>,
        tick: usize,
        buses: Observation,
        received: Vec<CompositeAction>,
    }

    impl ScriptedEnv {
        fn new(rho: Vec<Vec<f64>>, done_at: Option<usize>) -> Self {
            let sid = SubstationId::new;
            Self {
                topology: Topology::new(
                    3,
                    2,
                    vec![sid(0), sid(1)],
                    vec![sid(1), sid(2)],
                    vec![sid(0)],
                    vec![sid(2)],
                )
                .unwrap(),
                rho,
                done_at,
                tick: 0,
                buses: Observation::default(),
                received: Vec::new(),
            }
        }
    }

    impl Environment for ScriptedEnv {
        fn topology(&self) -> &Topology {
            &self.topology
        }

        fn reset(&mut self) -> SwitchyardResult<Observation> {
            self.tick = 0;
            self.buses = Observation {
                line_or_bus: vec![Busbar::new(1); 2],
                line_ex_bus: vec![Busbar::new(1); 2],
                gen_bus: vec![Busbar::new(1)],
                load_bus: vec![Busbar::new(1)],
                rho: vec![0.1, 0.1],
                timestamp: None,
            };
            Ok(self.buses.clone())
        }

        fn step(&mut self, action: &CompositeAction) -> SwitchyardResult<StepOutcome> {
            check_action(&self.topology, action)?;
            self.received.push(action.clone());
            for category in ElementCategory::ALL {
                for (index, busbar) in action.set_bus.get(category) {
                    self.buses.buses_mut(category)[*index] = *busbar;
                }
            }
            self.buses.rho = self.rho[self.tick.min(self.rho.len() - 1)].clone();
            self.tick += 1;
            Ok(StepOutcome {
                observation: self.buses.clone(),
                reward: 2.0,
                done: self.done_at == Some(self.tick),
                info: BTreeMap::new(),
            })
        }
    }

    fn line_ex(index: usize) -> ElementRef {
        ElementRef::Line {
            index,
            side: LineSide::Extremity,
        }
    }

    #[test]
    fn test_run_stops_at_threshold_and_clears_ledger() {
        let env = ScriptedEnv::new(vec![vec![0.5, 0.6], vec![0.7, 0.8], vec![0.2, 0.99]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();
        game.upsert(line_ex(1), Busbar::new(2)).unwrap();

        let mut ticks = Vec::new();
        let report = game
            .continue_simulation(&CancellationToken::new(), |t| ticks.push(t.tick))
            .unwrap();

        assert_eq!(report.ticks, 3);
        assert_eq!(ticks, vec![1, 2, 3]);
        assert_eq!(report.overloaded_lines, vec![1]);
        assert_eq!(report.cumulative_reward, 6.0);
        assert!(game.ledger().is_empty());
        assert_eq!(game.observation().line_ex_bus[1], Busbar::new(2));

        let received = &game.environment().received;
        assert_eq!(received[0].set_bus.lines_ex_id, vec![(1, Busbar::new(2))]);
        assert!(received[1].is_do_nothing());
        assert!(received[2].is_do_nothing());
    }

    #[test]
    fn test_done_before_overload_is_terminal_failure() {
        let env = ScriptedEnv::new(vec![vec![0.5, 0.5]], Some(2));
        let mut game = Game::new(env, GameOptions::default()).unwrap();

        let err = game
            .continue_simulation(&CancellationToken::new(), |_| {})
            .unwrap_err();
        match err {
            SwitchyardError::SimulationFailed {
                cumulative_reward,
                tick,
            } => {
                assert_eq!(tick, 2);
                assert_eq!(cumulative_reward, 4.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_before_first_tick_keeps_ledger() {
        let env = ScriptedEnv::new(vec![vec![1.0, 1.0]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();
        game.upsert(line_ex(0), Busbar::new(2)).unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let err = game.continue_simulation(&token, |_| {}).unwrap_err();

        assert!(matches!(err, SwitchyardError::Cancelled { ticks: 0 }));
        assert_eq!(game.ledger().len(), 1);
        assert!(game.environment().received.is_empty());
    }

    #[test]
    fn test_cancel_from_progress_callback_stops_run() {
        let env = ScriptedEnv::new(vec![vec![0.1, 0.1]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();

        let token = CancellationToken::new();
        let err = game
            .continue_simulation(&token, |t| {
                if t.tick == 4 {
                    token.cancel();
                }
            })
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Cancelled { ticks: 4 }));
    }

    #[test]
    fn test_tick_budget() {
        let env = ScriptedEnv::new(vec![vec![0.1, 0.1]], None);
        let options = GameOptions {
            max_ticks: Some(5),
            ..GameOptions::default()
        };
        let mut game = Game::new(env, options).unwrap();
        let err = game
            .continue_simulation(&CancellationToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchyardError::TickBudgetExhausted { max_ticks: 5 }
        ));
    }

    #[test]
    fn test_rejected_action_keeps_ledger() {
        let env = ScriptedEnv::new(vec![vec![1.0, 1.0]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();
        game.upsert(ElementRef::Generator { index: 0 }, Busbar::new(2))
            .unwrap();
        game.environment.topology = Topology::new(
            3,
            2,
            vec![SubstationId::new(0), SubstationId::new(1)],
            vec![SubstationId::new(1), SubstationId::new(2)],
            vec![],
            vec![SubstationId::new(2)],
        )
        .unwrap();

        let err = game
            .continue_simulation(&CancellationToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::InvalidAction(_)));
        assert_eq!(game.ledger().len(), 1);
    }

    #[test]
    fn test_upsert_validates_element_and_busbar() {
        let env = ScriptedEnv::new(vec![vec![0.1, 0.1]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();

        assert!(game.upsert(ElementRef::Load { index: 3 }, Busbar::new(2)).is_err());
        assert!(game.upsert(line_ex(0), Busbar::new(5)).is_err());
        assert!(game.ledger().is_empty());

        game.upsert(line_ex(0), Busbar::new(2)).unwrap();
        assert_eq!(game.effective_busbar(line_ex(0)).unwrap(), Busbar::new(2));
        game.upsert(line_ex(0), Busbar::new(1)).unwrap();
        assert!(game.ledger().is_empty());
    }

    /// One line and one generator; `reset` can drop the generator vector and
    /// `step` always drops `rho`.
    struct MisshapenEnv {
        topology: Topology,
        short_reset: bool,
    }

    impl MisshapenEnv {
        fn new(short_reset: bool) -> Self {
            let sid = SubstationId::new;
            Self {
                topology: Topology::new(2, 2, vec![sid(0)], vec![sid(1)], vec![sid(0)], vec![])
                    .unwrap(),
                short_reset,
            }
        }
    }

    impl Environment for MisshapenEnv {
        fn topology(&self) -> &Topology {
            &self.topology
        }

        fn reset(&mut self) -> SwitchyardResult<Observation> {
            if self.short_reset {
                return Ok(Observation::default());
            }
            Ok(Observation {
                line_or_bus: vec![Busbar::new(1)],
                line_ex_bus: vec![Busbar::new(1)],
                gen_bus: vec![Busbar::new(1)],
                rho: vec![0.2],
                ..Observation::default()
            })
        }

        fn step(&mut self, _action: &CompositeAction) -> SwitchyardResult<StepOutcome> {
            Ok(StepOutcome {
                observation: Observation::default(),
                reward: 1.0,
                done: false,
                info: BTreeMap::new(),
            })
        }
    }

    #[test]
    fn test_observation_shorter_than_topology_is_an_error() {
        let err = Game::new(MisshapenEnv::new(true), GameOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SwitchyardError::Environment(_)));

        let mut game = Game::new(MisshapenEnv::new(false), GameOptions::default()).unwrap();
        game.upsert(ElementRef::Generator { index: 0 }, Busbar::new(2))
            .unwrap();
        let err = game
            .continue_simulation(&CancellationToken::new(), |_| {})
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::Environment(_)));
        // The rejected observation is not adopted and the change stays pending.
        assert_eq!(game.observation().gen_bus, vec![Busbar::new(1)]);
        assert_eq!(
            game.effective_busbar(ElementRef::Generator { index: 0 })
                .unwrap(),
            Busbar::new(2)
        );

        game.environment.short_reset = true;
        assert!(matches!(game.reset(), Err(SwitchyardError::Environment(_))));
        assert_eq!(game.observation().gen_bus.len(), 1);
    }

    #[test]
    fn test_reset_clears_reward_and_ledger() {
        let env = ScriptedEnv::new(vec![vec![1.0, 0.0]], None);
        let mut game = Game::new(env, GameOptions::default()).unwrap();
        game.continue_simulation(&CancellationToken::new(), |_| {})
            .unwrap();
        game.upsert(line_ex(0), Busbar::new(2)).unwrap();
        assert_eq!(game.cumulative_reward(), 2.0);

        game.reset().unwrap();
        assert_eq!(game.cumulative_reward(), 0.0);
        assert!(game.ledger().is_empty());
    }

    #[test]
    fn test_tick_report_display() {
        let report = TickReport {
            tick: 3,
            reward: 1.5,
            cumulative_reward: 4.5,
            max_rho: 0.4,
            timestamp: chrono::NaiveDate::from_ymd_opt(2019, 1, 5)
                .and_then(|d| d.and_hms_opt(0, 5, 0)),
        };
        assert_eq!(
            report.to_string(),
            "Running simulation 05/01/2019 00:05 Cumulative reward = 4.5 Reward = 1.5"
        );
    }
}
