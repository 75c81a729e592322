//! The action ledger: pending busbar reassignments kept as a minimal diff.
//!
//! Every entry is a change request relative to the current observation. The
//! ledger never stores a change that would leave an element where it already
//! is, and re-selecting an element's original busbar removes its entry. The
//! result is always the smallest set of effective diffs from the baseline.
//!
//! Entries are kept per [`ElementCategory`]; indices in different categories
//! never interact even when they are numerically equal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::environment::Observation;
use crate::{Busbar, ElementCategory, ElementRef};

/// Ordered `(element index, target busbar)` pairs of one category.
pub type BusAssignments = Vec<(usize, Busbar)>;

/// The `set_bus` part of a simulator action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetBus {
    #[serde(default)]
    pub lines_or_id: BusAssignments,
    #[serde(default)]
    pub lines_ex_id: BusAssignments,
    #[serde(default)]
    pub generators_id: BusAssignments,
    #[serde(default)]
    pub loads_id: BusAssignments,
}

impl SetBus {
    pub fn get(&self, category: ElementCategory) -> &BusAssignments {
        match category {
            ElementCategory::LinesOr => &self.lines_or_id,
            ElementCategory::LinesEx => &self.lines_ex_id,
            ElementCategory::Generators => &self.generators_id,
            ElementCategory::Loads => &self.loads_id,
        }
    }

    fn get_mut(&mut self, category: ElementCategory) -> &mut BusAssignments {
        match category {
            ElementCategory::LinesOr => &mut self.lines_or_id,
            ElementCategory::LinesEx => &mut self.lines_ex_id,
            ElementCategory::Generators => &mut self.generators_id,
            ElementCategory::Loads => &mut self.loads_id,
        }
    }

    pub fn len(&self) -> usize {
        ElementCategory::ALL
            .iter()
            .map(|category| self.get(*category).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Action submitted to the simulation facade in one step.
///
/// Serializes as `{"set_bus": {"lines_or_id": [[3, 2]], ...}}`, the shape the
/// simulator's action constructor expects. The default value is the
/// "do nothing" action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeAction {
    #[serde(default)]
    pub set_bus: SetBus,
}

impl CompositeAction {
    pub fn do_nothing() -> Self {
        Self::default()
    }

    pub fn is_do_nothing(&self) -> bool {
        self.set_bus.is_empty()
    }
}

/// Minimal-diff collection of pending busbar changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionLedger {
    entries: SetBus,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Busbar the element will be on once the ledger is applied.
    ///
    /// The pending target if one is recorded, otherwise `baseline[index]`.
    ///
    /// # Panics
    ///
    /// Panics if no entry exists and `index` is outside `baseline`.
    pub fn effective_busbar(
        &self,
        category: ElementCategory,
        index: usize,
        baseline: &[Busbar],
    ) -> Busbar {
        self.pending(category, index)
            .unwrap_or_else(|| baseline[index])
    }

    /// Pending target for an element, if any.
    pub fn pending(&self, category: ElementCategory, index: usize) -> Option<Busbar> {
        self.entries
            .get(category)
            .iter()
            .find(|(element, _)| *element == index)
            .map(|(_, busbar)| *busbar)
    }

    /// Record that the element should end up on `target`.
    ///
    /// An existing entry is overwritten, or removed when `target` equals the
    /// baseline. Without an entry, one is appended only when `target` differs
    /// from the baseline.
    ///
    /// # Panics
    ///
    /// Panics if `index` is outside `baseline`. Callers only offer elements that
    /// exist in the current observation, so this is a logic error.
    pub fn upsert(
        &mut self,
        category: ElementCategory,
        index: usize,
        target: Busbar,
        baseline: &[Busbar],
    ) {
        assert!(
            index < baseline.len(),
            "{category} index {index} outside baseline of length {}",
            baseline.len()
        );
        let current = baseline[index];
        let entries = self.entries.get_mut(category);

        match entries.iter().position(|(element, _)| *element == index) {
            Some(pos) if target == current => {
                entries.remove(pos);
                debug!(%category, index, %target, "pending change reverted");
            }
            Some(pos) => {
                entries[pos].1 = target;
                debug!(%category, index, %target, "pending change overwritten");
            }
            None if target != current => {
                entries.push((index, target));
                debug!(%category, index, %target, "pending change recorded");
            }
            None => {}
        }
    }

    /// [`upsert`](Self::upsert) against the matching busbar vector of `observation`.
    pub fn upsert_element(&mut self, element: ElementRef, target: Busbar, observation: &Observation) {
        let category = element.category();
        self.upsert(category, element.index(), target, observation.buses(category));
    }

    /// [`effective_busbar`](Self::effective_busbar) against the matching busbar vector of `observation`.
    pub fn effective_for(&self, element: ElementRef, observation: &Observation) -> Busbar {
        let category = element.category();
        self.effective_busbar(category, element.index(), observation.buses(category))
    }

    pub fn entries(&self, category: ElementCategory) -> &[(usize, Busbar)] {
        self.entries.get(category)
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(pending = self.entries.len(), "ledger cleared");
        }
        self.entries = SetBus::default();
    }

    /// Total number of pending changes across all categories.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the ledger in the shape the simulation facade accepts.
    pub fn to_composite_action(&self) -> CompositeAction {
        CompositeAction {
            set_bus: self.entries.clone(),
        }
    }
}

impl std::fmt::Display for ActionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Selected actions: {{'set_bus': {{")?;
        for category in ElementCategory::ALL {
            let pairs: Vec<String> = self
                .entries(category)
                .iter()
                .map(|(index, busbar)| format!("({index}, {busbar})"))
                .collect();
            writeln!(f, "    '{}': [{}],", category.action_key(), pairs.join(", "))?;
        }
        write!(f, "}}}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buses(values: &[i32]) -> Vec<Busbar> {
        values.iter().copied().map(Busbar::new).collect()
    }

    #[test]
    fn test_idempotent_revert() {
        let baseline = buses(&[1, 1, 2]);
        let mut ledger = ActionLedger::new();

        ledger.upsert(ElementCategory::LinesOr, 2, Busbar::new(1), &baseline);
        assert_eq!(ledger.len(), 1);

        ledger.upsert(ElementCategory::LinesOr, 2, Busbar::new(2), &baseline);
        assert!(ledger.is_empty());
        assert_eq!(ledger.pending(ElementCategory::LinesOr, 2), None);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let baseline = buses(&[1, 1]);
        let mut ledger = ActionLedger::new();

        ledger.upsert(ElementCategory::Generators, 0, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::Generators, 0, Busbar::new(3), &baseline);

        assert_eq!(
            ledger.entries(ElementCategory::Generators),
            &[(0, Busbar::new(3))]
        );
    }

    #[test]
    fn test_noop_is_suppressed() {
        let baseline = buses(&[1, 2]);
        let mut ledger = ActionLedger::new();

        ledger.upsert(ElementCategory::Loads, 1, Busbar::new(2), &baseline);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_effective_read_follows_last_upsert() {
        let baseline = buses(&[1, 1, 1]);
        let mut ledger = ActionLedger::new();
        let cat = ElementCategory::LinesEx;

        assert_eq!(ledger.effective_busbar(cat, 1, &baseline), Busbar::new(1));

        ledger.upsert(cat, 1, Busbar::new(2), &baseline);
        assert_eq!(ledger.effective_busbar(cat, 1, &baseline), Busbar::new(2));
        // Reading twice does not disturb anything.
        assert_eq!(ledger.effective_busbar(cat, 1, &baseline), Busbar::new(2));
        assert_eq!(ledger.len(), 1);

        ledger.upsert(cat, 1, Busbar::DISCONNECTED, &baseline);
        assert_eq!(ledger.effective_busbar(cat, 1, &baseline), Busbar::DISCONNECTED);

        ledger.upsert(cat, 1, Busbar::new(1), &baseline);
        assert_eq!(ledger.effective_busbar(cat, 1, &baseline), Busbar::new(1));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_category_isolation() {
        let baseline = buses(&[1, 1]);
        let mut ledger = ActionLedger::new();

        ledger.upsert(ElementCategory::LinesOr, 0, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::Loads, 0, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::Generators, 0, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::Generators, 0, Busbar::new(1), &baseline);

        assert!(ledger.entries(ElementCategory::Generators).is_empty());
        assert_eq!(ledger.entries(ElementCategory::LinesOr), &[(0, Busbar::new(2))]);
        assert_eq!(ledger.entries(ElementCategory::Loads), &[(0, Busbar::new(2))]);
        assert!(ledger.entries(ElementCategory::LinesEx).is_empty());
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let baseline = buses(&[1, 1, 1, 1]);
        let mut ledger = ActionLedger::new();
        let cat = ElementCategory::LinesOr;

        ledger.upsert(cat, 3, Busbar::new(2), &baseline);
        ledger.upsert(cat, 0, Busbar::new(2), &baseline);
        ledger.upsert(cat, 3, Busbar::new(3), &baseline);

        assert_eq!(
            ledger.entries(cat),
            &[(3, Busbar::new(3)), (0, Busbar::new(2))]
        );
    }

    #[test]
    fn test_composite_action_shape() {
        let mut ledger = ActionLedger::new();
        let empty = ledger.to_composite_action();
        for category in ElementCategory::ALL {
            assert!(empty.set_bus.get(category).is_empty());
        }
        assert!(empty.is_do_nothing());

        let baseline = buses(&[1, 1, 1]);
        ledger.upsert(ElementCategory::LinesOr, 0, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::LinesOr, 1, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::Loads, 2, Busbar::new(2), &baseline);
        ledger.upsert(ElementCategory::LinesOr, 1, Busbar::new(1), &baseline);

        let action = ledger.to_composite_action();
        assert_eq!(action.set_bus.lines_or_id.len(), 1);
        assert_eq!(action.set_bus.lines_ex_id.len(), 0);
        assert_eq!(action.set_bus.generators_id.len(), 0);
        assert_eq!(action.set_bus.loads_id.len(), 1);
        assert_eq!(action.set_bus.len(), ledger.len());
    }

    #[test]
    fn test_composite_action_serialization() {
        let baseline = buses(&[1, 1, 1, 1]);
        let mut ledger = ActionLedger::new();
        ledger.upsert(ElementCategory::LinesEx, 3, Busbar::new(2), &baseline);

        let json = serde_json::to_value(ledger.to_composite_action()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "set_bus": {
                    "lines_or_id": [],
                    "lines_ex_id": [[3, 2]],
                    "generators_id": [],
                    "loads_id": []
                }
            })
        );
    }

    #[test]
    fn test_clear_empties_every_category() {
        let baseline = buses(&[1]);
        let mut ledger = ActionLedger::new();
        for category in ElementCategory::ALL {
            ledger.upsert(category, 0, Busbar::new(2), &baseline);
        }
        assert_eq!(ledger.len(), 4);

        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.to_composite_action(), CompositeAction::do_nothing());
    }

    #[test]
    #[should_panic(expected = "outside baseline")]
    fn test_upsert_outside_baseline_panics() {
        let mut ledger = ActionLedger::new();
        ledger.upsert(ElementCategory::Loads, 5, Busbar::new(2), &buses(&[1]));
    }

    #[test]
    fn test_display_lists_every_category() {
        let baseline = buses(&[1, 1]);
        let mut ledger = ActionLedger::new();
        ledger.upsert(ElementCategory::Generators, 1, Busbar::new(2), &baseline);

        let text = ledger.to_string();
        assert!(text.contains("'generators_id': [(1, 2)],"));
        assert!(text.contains("'lines_or_id': [],"));
    }
}
