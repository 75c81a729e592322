//! Selection menu for the substation game.
//!
//! The menu is a chain of four stages: substation, element kind, element and
//! busbar. Each stage's options depend only on the stages above it, so a change
//! re-evaluates every stage below it in [`Stage::ORDER`], top-down. Choosing a
//! busbar writes to the game's ledger; every ledger change is rendered into the
//! [`ActionLog`] handed to the menu at construction.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use switchyard_core::{
    Busbar, ElementKind, ElementRef, Environment, Game, SubstationId, SwitchyardError, Topology,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::DisplayConfig;
use crate::error::{Error, Result};
use crate::events::MenuEvent;

/// Menu stages in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Substation,
    ElementKind,
    Element,
    Busbar,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::Substation,
        Stage::ElementKind,
        Stage::Element,
        Stage::Busbar,
    ];

    /// Stages whose options depend on this one, in evaluation order.
    pub fn downstream(self) -> impl Iterator<Item = Stage> {
        Self::ORDER.into_iter().filter(move |stage| *stage > self)
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Substation => "substation",
            Stage::ElementKind => "element kind",
            Stage::Element => "element",
            Stage::Busbar => "busbar",
        }
    }
}

/// Shared text sink that always holds the latest rendering of the pending action.
///
/// Each menu gets its own handle; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    text: Arc<RwLock<String>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents.
    pub fn show(&self, text: String) {
        *self.text.write() = text;
    }

    pub fn contents(&self) -> String {
        self.text.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.text.read().is_empty()
    }
}

/// One choice in the element stage.
///
/// Lines are offered by the substation at their far end; `neighbor` is set for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ElementOption {
    pub element: ElementRef,
    pub neighbor: Option<SubstationId>,
}

impl std::fmt::Display for ElementOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.element, self.neighbor) {
            (ElementRef::Line { .. }, Some(neighbor)) => {
                write!(f, "to substation {neighbor} [{}]", self.element)
            }
            _ => write!(f, "{}", self.element),
        }
    }
}

/// Snapshot of every stage's options and current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuState {
    pub substations: Vec<SubstationId>,
    pub substation: SubstationId,
    pub kinds: Vec<ElementKind>,
    pub kind: Option<ElementKind>,
    pub elements: Vec<ElementOption>,
    pub element: Option<ElementRef>,
    pub busbars: Vec<Busbar>,
    pub busbar: Option<Busbar>,
}

/// Options offered for `kind` at `substation`.
pub fn element_options(
    topology: &Topology,
    kind: ElementKind,
    substation: SubstationId,
) -> Vec<ElementOption> {
    match kind {
        ElementKind::Line => {
            let mut options: Vec<ElementOption> = Vec::new();
            for neighbor in topology.line_neighbors(substation) {
                let Some(endpoint) = topology.resolve_line(substation, neighbor) else {
                    continue;
                };
                let element = endpoint.element();
                if options.iter().all(|option| option.element != element) {
                    options.push(ElementOption {
                        element,
                        neighbor: Some(neighbor),
                    });
                }
            }
            options
        }
        ElementKind::Generator | ElementKind::Load => topology
            .elements_at_substation(kind, substation)
            .into_iter()
            .map(|element| ElementOption {
                element,
                neighbor: None,
            })
            .collect(),
    }
}

/// Cascading selection state bound to one game.
pub struct Menu {
    substations: Vec<SubstationId>,
    substation: SubstationId,
    kinds: Vec<ElementKind>,
    kind: Option<ElementKind>,
    elements: Vec<ElementOption>,
    element: Option<ElementRef>,
    busbars: Vec<Busbar>,
    busbar: Option<Busbar>,
    log: ActionLog,
    display: DisplayConfig,
    events_tx: broadcast::Sender<MenuEvent>,
}

impl Menu {
    /// Build the menu with the first substation selected and render the ledger.
    pub fn new<E: Environment>(
        game: &Game<E>,
        log: ActionLog,
        display: DisplayConfig,
        events_tx: broadcast::Sender<MenuEvent>,
    ) -> Result<Self> {
        let substations = game.topology().substation_ids();
        let first = *substations.first().ok_or_else(|| {
            SwitchyardError::Topology("topology has no substations".to_string())
        })?;
        let mut menu = Self {
            substations,
            substation: first,
            kinds: Vec::new(),
            kind: None,
            elements: Vec::new(),
            element: None,
            busbars: game.topology().busbar_options(),
            busbar: None,
            log,
            display,
            events_tx,
        };
        menu.reevaluate(game, Stage::Substation)?;
        menu.render(game);
        Ok(menu)
    }

    pub fn state(&self) -> MenuState {
        MenuState {
            substations: self.substations.clone(),
            substation: self.substation,
            kinds: self.kinds.clone(),
            kind: self.kind,
            elements: self.elements.clone(),
            element: self.element,
            busbars: self.busbars.clone(),
            busbar: self.busbar,
        }
    }

    pub fn substation(&self) -> SubstationId {
        self.substation
    }

    pub fn element(&self) -> Option<ElementRef> {
        self.element
    }

    pub fn busbar(&self) -> Option<Busbar> {
        self.busbar
    }

    pub fn log(&self) -> &ActionLog {
        &self.log
    }

    pub fn select_substation<E: Environment>(
        &mut self,
        game: &Game<E>,
        substation: SubstationId,
    ) -> Result<()> {
        if !self.substations.contains(&substation) {
            return Err(Error::invalid(Stage::Substation.label(), substation));
        }
        self.substation = substation;
        let _ = self.events_tx.send(MenuEvent::SubstationSelected { substation });
        self.reevaluate(game, Stage::Substation)
    }

    pub fn select_kind<E: Environment>(&mut self, game: &Game<E>, kind: ElementKind) -> Result<()> {
        if !self.kinds.contains(&kind) {
            return Err(Error::invalid(Stage::ElementKind.label(), kind));
        }
        self.kind = Some(kind);
        let _ = self.events_tx.send(MenuEvent::KindSelected { kind });
        self.reevaluate(game, Stage::ElementKind)
    }

    pub fn select_element<E: Environment>(
        &mut self,
        game: &Game<E>,
        element: ElementRef,
    ) -> Result<()> {
        if !self.elements.iter().any(|option| option.element == element) {
            return Err(Error::invalid(Stage::Element.label(), element));
        }
        self.element = Some(element);
        self.reevaluate(game, Stage::Element)?;
        if let Some(busbar) = self.busbar {
            let _ = self
                .events_tx
                .send(MenuEvent::ElementSelected { element, busbar });
        }
        Ok(())
    }

    /// Select the line towards `neighbor` from the current substation.
    pub fn select_line_to<E: Environment>(
        &mut self,
        game: &Game<E>,
        neighbor: SubstationId,
    ) -> Result<()> {
        if self.kind != Some(ElementKind::Line) {
            self.select_kind(game, ElementKind::Line)?;
        }
        let element = game
            .topology()
            .resolve_line(self.substation, neighbor)
            .map(|endpoint| endpoint.element())
            .ok_or_else(|| {
                Error::invalid(
                    Stage::Element.label(),
                    format!("no line between substations {} and {neighbor}", self.substation),
                )
            })?;
        self.select_element(game, element)
    }

    /// Put the selected element on `busbar` and record the change in the ledger.
    pub fn select_busbar<E: Environment>(&mut self, game: &mut Game<E>, busbar: Busbar) -> Result<()> {
        let element = self
            .element
            .ok_or_else(|| Error::invalid(Stage::Busbar.label(), "no element selected"))?;
        if !self.busbars.contains(&busbar) {
            return Err(Error::invalid(Stage::Busbar.label(), busbar));
        }
        game.upsert(element, busbar)?;
        self.busbar = Some(busbar);
        debug!(%element, %busbar, pending = game.ledger().len(), "busbar selected");
        let _ = self.events_tx.send(MenuEvent::LedgerChanged {
            element,
            busbar,
            pending: game.ledger().len(),
        });
        self.render(game);
        Ok(())
    }

    /// Drop every pending change.
    pub fn clear_ledger<E: Environment>(&mut self, game: &mut Game<E>) -> Result<()> {
        game.clear_ledger();
        let _ = self.events_tx.send(MenuEvent::LedgerCleared);
        self.refresh(game)
    }

    /// Re-read the busbar stage after the observation or the ledger changed underneath.
    pub fn refresh<E: Environment>(&mut self, game: &Game<E>) -> Result<()> {
        self.reevaluate(game, Stage::Element)?;
        self.render(game);
        Ok(())
    }

    /// Recompute every stage below `changed`. Each recomputed stage takes its first option.
    fn reevaluate<E: Environment>(&mut self, game: &Game<E>, changed: Stage) -> Result<()> {
        let topology = game.topology();
        for stage in changed.downstream() {
            match stage {
                Stage::Substation => {}
                Stage::ElementKind => {
                    self.kinds = topology.element_kinds_at(self.substation);
                    self.kind = self.kinds.first().copied();
                }
                Stage::Element => {
                    self.elements = match self.kind {
                        Some(kind) => element_options(topology, kind, self.substation),
                        None => Vec::new(),
                    };
                    self.element = self.elements.first().map(|option| option.element);
                }
                Stage::Busbar => {
                    self.busbar = match self.element {
                        Some(element) => Some(game.effective_busbar(element)?),
                        None => None,
                    };
                }
            }
        }
        Ok(())
    }

    fn render<E: Environment>(&self, game: &Game<E>) {
        let mut text = String::new();
        if self.display.show_topology {
            text.push_str(&game.topology().render_table(self.display.column_width));
            text.push_str("\n\n");
        }
        text.push_str(&game.ledger().to_string());
        self.log.show(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::{
        CompositeAction, ElementCategory, GameOptions, LineSide, Observation, StepOutcome,
        SwitchyardResult,
    };

    struct StaticEnv {
        topology: Topology,
    }

    impl Environment for StaticEnv {
        fn topology(&self) -> &Topology {
            &self.topology
        }

        fn reset(&mut self) -> SwitchyardResult<Observation> {
            Ok(Observation {
                line_or_bus: vec![Busbar::new(1); self.topology.n_line()],
                line_ex_bus: vec![Busbar::new(1); self.topology.n_line()],
                gen_bus: vec![Busbar::new(1); self.topology.n_gen()],
                load_bus: vec![Busbar::new(2); self.topology.n_load()],
                rho: vec![0.0; self.topology.n_line()],
                timestamp: None,
            })
        }

        fn step(&mut self, _action: &CompositeAction) -> SwitchyardResult<StepOutcome> {
            let observation = self.reset()?;
            Ok(StepOutcome {
                observation,
                reward: 0.0,
                done: false,
                info: Default::default(),
            })
        }
    }

    // Lines: 0: 0->1, 1: 1->2, 2: 2->0. Generator at 0, load at 2, substation 3 empty.
    fn game() -> Game<StaticEnv> {
        let s = SubstationId::new;
        let topology = Topology::new(
            4,
            2,
            vec![s(0), s(1), s(2)],
            vec![s(1), s(2), s(0)],
            vec![s(0)],
            vec![s(2)],
        )
        .unwrap();
        Game::new(StaticEnv { topology }, GameOptions::default()).unwrap()
    }

    fn menu(game: &Game<StaticEnv>) -> (Menu, ActionLog) {
        let log = ActionLog::new();
        let (tx, _) = broadcast::channel(16);
        let menu = Menu::new(game, log.clone(), DisplayConfig::default(), tx).unwrap();
        (menu, log)
    }

    #[test]
    fn test_initial_cascade() {
        let game = game();
        let (menu, log) = menu(&game);
        let state = menu.state();

        assert_eq!(state.substation, SubstationId::new(0));
        assert_eq!(state.kinds, vec![ElementKind::Line, ElementKind::Generator]);
        assert_eq!(state.kind, Some(ElementKind::Line));
        // Arriving lines first: line 2 comes from substation 2, then line 0 leaves to 1.
        assert_eq!(
            state.elements.iter().map(|o| o.neighbor).collect::<Vec<_>>(),
            vec![Some(SubstationId::new(2)), Some(SubstationId::new(1))]
        );
        assert_eq!(
            state.element,
            Some(ElementRef::Line {
                index: 2,
                side: LineSide::Extremity
            })
        );
        assert_eq!(state.busbar, Some(Busbar::new(1)));
        assert!(log.contents().contains("Selected actions:"));
        assert!(log.contents().starts_with("Line ID:"));
    }

    #[test]
    fn test_upstream_change_resets_downstream() {
        let game = game();
        let (mut menu, _) = menu(&game);

        menu.select_kind(&game, ElementKind::Generator).unwrap();
        assert_eq!(menu.element(), Some(ElementRef::Generator { index: 0 }));

        menu.select_substation(&game, SubstationId::new(2)).unwrap();
        let state = menu.state();
        assert_eq!(state.kinds, vec![ElementKind::Line, ElementKind::Load]);
        assert_eq!(state.kind, Some(ElementKind::Line));
        assert_eq!(
            state.element,
            Some(ElementRef::Line {
                index: 1,
                side: LineSide::Extremity
            })
        );
    }

    #[test]
    fn test_busbar_choice_updates_ledger_and_log() {
        let mut game = game();
        let (mut menu, log) = menu(&game);

        menu.select_line_to(&game, SubstationId::new(1)).unwrap();
        assert_eq!(
            menu.element(),
            Some(ElementRef::Line {
                index: 0,
                side: LineSide::Origin
            })
        );

        menu.select_busbar(&mut game, Busbar::new(2)).unwrap();
        assert_eq!(
            game.ledger().entries(ElementCategory::LinesOr),
            &[(0, Busbar::new(2))]
        );
        assert!(log.contents().contains("'lines_or_id': [(0, 2)]"));

        // Leaving and coming back shows the pending busbar.
        menu.select_kind(&game, ElementKind::Generator).unwrap();
        menu.select_line_to(&game, SubstationId::new(1)).unwrap();
        assert_eq!(menu.busbar(), Some(Busbar::new(2)));

        // Re-selecting the original busbar cancels the change.
        menu.select_busbar(&mut game, Busbar::new(1)).unwrap();
        assert!(game.ledger().is_empty());
        assert!(log.contents().contains("'lines_or_id': []"));
    }

    #[test]
    fn test_load_busbar_reads_baseline() {
        let game = game();
        let (mut menu, _) = menu(&game);
        menu.select_substation(&game, SubstationId::new(2)).unwrap();
        menu.select_kind(&game, ElementKind::Load).unwrap();
        assert_eq!(menu.busbar(), Some(Busbar::new(2)));
    }

    #[test]
    fn test_invalid_selections() {
        let mut game = game();
        let (mut menu, _) = menu(&game);

        assert!(matches!(
            menu.select_substation(&game, SubstationId::new(9)),
            Err(Error::InvalidSelection { .. })
        ));
        assert!(matches!(
            menu.select_kind(&game, ElementKind::Load),
            Err(Error::InvalidSelection { .. })
        ));
        assert!(matches!(
            menu.select_element(&game, ElementRef::Generator { index: 5 }),
            Err(Error::InvalidSelection { .. })
        ));
        assert!(matches!(
            menu.select_busbar(&mut game, Busbar::new(3)),
            Err(Error::InvalidSelection { .. })
        ));
        assert!(game.ledger().is_empty());
    }

    #[test]
    fn test_empty_substation_has_no_options() {
        let mut game = game();
        let (mut menu, _) = menu(&game);
        menu.select_substation(&game, SubstationId::new(3)).unwrap();

        let state = menu.state();
        assert!(state.kinds.is_empty());
        assert_eq!(state.element, None);
        assert_eq!(state.busbar, None);
        assert!(menu.select_busbar(&mut game, Busbar::new(2)).is_err());
    }

    #[test]
    fn test_clear_ledger_refreshes_busbar() {
        let mut game = game();
        let (mut menu, _) = menu(&game);
        menu.select_busbar(&mut game, Busbar::new(2)).unwrap();
        assert_eq!(game.ledger().len(), 1);

        menu.clear_ledger(&mut game).unwrap();
        assert!(game.ledger().is_empty());
        assert_eq!(menu.busbar(), Some(Busbar::new(1)));
    }

    #[test]
    fn test_downstream_order() {
        assert_eq!(
            Stage::ElementKind.downstream().collect::<Vec<_>>(),
            vec![Stage::Element, Stage::Busbar]
        );
        assert_eq!(Stage::Busbar.downstream().count(), 0);
    }
}
