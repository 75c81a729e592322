//! # switchyard-core: substation busbar game core
//!
//! Provides the pieces of the substation game that carry real logic: resolving
//! which line joins two substations, and keeping a minimal ledger of pending
//! busbar reassignments that can be submitted to a grid simulator.
//!
//! ## Design Philosophy
//!
//! The grid simulator is an external collaborator. This crate only sees it
//! through the [`Environment`] trait: static topology arrays, per-element
//! busbar vectors in each [`Observation`], and a `step` call that accepts a
//! [`CompositeAction`]. Physics, rewards and the `done` signal all belong to
//! the simulator.
//!
//! ## Quick Start
//!
//! ```rust
//! use switchyard_core::*;
//!
//! // Line 0 joins substations 0 and 1, line 1 joins 1 and 2.
//! let topology = Topology::new(
//!     3,
//!     2,
//!     vec![SubstationId::new(0), SubstationId::new(1)],
//!     vec![SubstationId::new(1), SubstationId::new(2)],
//!     vec![SubstationId::new(0)],
//!     vec![SubstationId::new(2)],
//! )
//! .unwrap();
//!
//! let endpoint = topology
//!     .resolve_line(SubstationId::new(1), SubstationId::new(0))
//!     .unwrap();
//! assert_eq!(endpoint.line, 0);
//! assert_eq!(endpoint.side, LineSide::Extremity);
//!
//! // Every element starts on busbar 1.
//! let baseline = vec![Busbar::new(1); topology.n_line()];
//! let mut ledger = ActionLedger::new();
//! ledger.upsert(ElementCategory::LinesEx, 0, Busbar::new(2), &baseline);
//! assert_eq!(ledger.len(), 1);
//!
//! // Selecting the original busbar again cancels the pending change.
//! ledger.upsert(ElementCategory::LinesEx, 0, Busbar::new(1), &baseline);
//! assert!(ledger.is_empty());
//! ```
//!
//! ## Modules
//!
//! - [`topology`] - static element-to-substation maps and line resolution
//! - [`ledger`] - the minimal-diff set of pending busbar changes
//! - [`environment`] - the simulation facade trait and observation types
//! - [`game`] - the run loop that submits the ledger and advances until overload
//! - [`diagnostics`] - validation reporting

use serde::{Deserialize, Serialize};

pub mod diagnostics;
pub mod environment;
pub mod error;
pub mod game;
pub mod ledger;
pub mod topology;

pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use environment::{Environment, Observation, StepOutcome};
pub use error::{SwitchyardError, SwitchyardResult};
pub use game::{Game, GameOptions, RunReport, TickReport};
pub use ledger::{ActionLedger, CompositeAction, SetBus};
pub use topology::{LineEndpoint, Topology};
pub use tokio_util::sync::CancellationToken;

/// Identifier of a substation (0-based, dense).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstationId(usize);

impl SubstationId {
    #[inline]
    pub fn new(value: usize) -> Self {
        SubstationId(value)
    }
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for SubstationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Busbar an element is wired to inside its substation.
///
/// Busbars are numbered from 1; simulators report `-1` for a disconnected element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Busbar(i32);

impl Busbar {
    pub const DISCONNECTED: Busbar = Busbar(-1);

    #[inline]
    pub fn new(value: i32) -> Self {
        Busbar(value)
    }
    #[inline]
    pub fn value(&self) -> i32 {
        self.0
    }
}

impl std::fmt::Display for Busbar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of a line an element reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSide {
    /// The "OR" end
    Origin,
    /// The "EX" end
    Extremity,
}

impl LineSide {
    pub fn category(self) -> ElementCategory {
        match self {
            LineSide::Origin => ElementCategory::LinesOr,
            LineSide::Extremity => ElementCategory::LinesEx,
        }
    }
}

/// Kind of connecting element a user can pick at a substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Line,
    Generator,
    Load,
}

impl ElementKind {
    pub const ALL: [ElementKind; 3] = [ElementKind::Line, ElementKind::Generator, ElementKind::Load];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Line => "line",
            ElementKind::Generator => "generator",
            ElementKind::Load => "load",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementKind::Line => write!(f, "Line"),
            ElementKind::Generator => write!(f, "Generator"),
            ElementKind::Load => write!(f, "Load"),
        }
    }
}

/// Independently settable busbar vectors. A line contributes to two of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementCategory {
    LinesOr,
    LinesEx,
    Generators,
    Loads,
}

impl ElementCategory {
    pub const ALL: [ElementCategory; 4] = [
        ElementCategory::LinesOr,
        ElementCategory::LinesEx,
        ElementCategory::Generators,
        ElementCategory::Loads,
    ];

    /// Key used by the simulator's `set_bus` action dictionary.
    pub fn action_key(&self) -> &'static str {
        match self {
            ElementCategory::LinesOr => "lines_or_id",
            ElementCategory::LinesEx => "lines_ex_id",
            ElementCategory::Generators => "generators_id",
            ElementCategory::Loads => "loads_id",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "lines_or" | "lines_or_id" | "line_or" => Some(ElementCategory::LinesOr),
            "lines_ex" | "lines_ex_id" | "line_ex" => Some(ElementCategory::LinesEx),
            "generators" | "generators_id" | "gen" => Some(ElementCategory::Generators),
            "loads" | "loads_id" | "load" => Some(ElementCategory::Loads),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.action_key())
    }
}

/// Reference to one settable element endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementRef {
    Line { index: usize, side: LineSide },
    Generator { index: usize },
    Load { index: usize },
}

impl ElementRef {
    /// The element addressed by `index` within a `set_bus` category.
    pub fn from_category(category: ElementCategory, index: usize) -> Self {
        match category {
            ElementCategory::LinesOr => ElementRef::Line {
                index,
                side: LineSide::Origin,
            },
            ElementCategory::LinesEx => ElementRef::Line {
                index,
                side: LineSide::Extremity,
            },
            ElementCategory::Generators => ElementRef::Generator { index },
            ElementCategory::Loads => ElementRef::Load { index },
        }
    }

    pub fn category(&self) -> ElementCategory {
        match self {
            ElementRef::Line { side, .. } => side.category(),
            ElementRef::Generator { .. } => ElementCategory::Generators,
            ElementRef::Load { .. } => ElementCategory::Loads,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            ElementRef::Line { index, .. }
            | ElementRef::Generator { index }
            | ElementRef::Load { index } => *index,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ElementRef::Line { .. } => ElementKind::Line,
            ElementRef::Generator { .. } => ElementKind::Generator,
            ElementRef::Load { .. } => ElementKind::Load,
        }
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementRef::Line {
                index,
                side: LineSide::Origin,
            } => write!(f, "Line {index} (OR)"),
            ElementRef::Line {
                index,
                side: LineSide::Extremity,
            } => write!(f, "Line {index} (EX)"),
            ElementRef::Generator { index } => write!(f, "Gen {index}"),
            ElementRef::Load { index } => write!(f, "Load {index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_side_maps_to_category() {
        assert_eq!(LineSide::Origin.category(), ElementCategory::LinesOr);
        assert_eq!(LineSide::Extremity.category(), ElementCategory::LinesEx);
    }

    #[test]
    fn test_element_ref_accessors() {
        let line = ElementRef::Line {
            index: 3,
            side: LineSide::Extremity,
        };
        assert_eq!(line.category(), ElementCategory::LinesEx);
        assert_eq!(line.index(), 3);
        assert_eq!(line.kind(), ElementKind::Line);
        assert_eq!(line.to_string(), "Line 3 (EX)");

        assert_eq!(ElementRef::from_category(ElementCategory::LinesEx, 3), line);

        let load = ElementRef::Load { index: 5 };
        assert_eq!(load.category(), ElementCategory::Loads);
        assert_eq!(load.to_string(), "Load 5");
    }

    #[test]
    fn test_category_parsing_accepts_action_keys() {
        for category in ElementCategory::ALL {
            assert_eq!(ElementCategory::parse(category.action_key()), Some(category));
        }
        assert_eq!(ElementCategory::parse("GEN"), Some(ElementCategory::Generators));
        assert_eq!(ElementCategory::parse("storage"), None);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let json = serde_json::to_string(&(SubstationId::new(4), Busbar::new(2))).unwrap();
        assert_eq!(json, "[4,2]");
    }
}
