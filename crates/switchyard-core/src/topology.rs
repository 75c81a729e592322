//! Static element-to-substation maps and line endpoint resolution.
//!
//! A [`Topology`] is loaded once from the simulation facade and never
//! mutated. Lines are directed only in name: each has an origin ("OR") and an
//! extremity ("EX") substation, and each end is wired to its own busbar.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::error::{SwitchyardError, SwitchyardResult};
use crate::{Busbar, ElementCategory, ElementKind, ElementRef, LineSide, SubstationId};

/// A line together with the end that touches the queried substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineEndpoint {
    pub line: usize,
    pub side: LineSide,
}

impl LineEndpoint {
    pub fn element(&self) -> ElementRef {
        ElementRef::Line {
            index: self.line,
            side: self.side,
        }
    }
}

/// Serialized shape of a topology, validated on conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyData {
    pub n_sub: usize,
    #[serde(default = "default_busbars_per_sub")]
    pub n_busbar_per_sub: usize,
    pub line_or_to_subid: Vec<SubstationId>,
    pub line_ex_to_subid: Vec<SubstationId>,
    #[serde(default)]
    pub gen_to_subid: Vec<SubstationId>,
    #[serde(default)]
    pub load_to_subid: Vec<SubstationId>,
}

fn default_busbars_per_sub() -> usize {
    2
}

/// Immutable grid topology as seen by the substation game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TopologyData", into = "TopologyData")]
pub struct Topology {
    n_sub: usize,
    n_busbar_per_sub: usize,
    line_or_to_subid: Vec<SubstationId>,
    line_ex_to_subid: Vec<SubstationId>,
    gen_to_subid: Vec<SubstationId>,
    load_to_subid: Vec<SubstationId>,
}

impl Topology {
    /// Build a topology, rejecting it if validation reports any error.
    pub fn new(
        n_sub: usize,
        n_busbar_per_sub: usize,
        line_or_to_subid: Vec<SubstationId>,
        line_ex_to_subid: Vec<SubstationId>,
        gen_to_subid: Vec<SubstationId>,
        load_to_subid: Vec<SubstationId>,
    ) -> SwitchyardResult<Self> {
        let topology = Self {
            n_sub,
            n_busbar_per_sub,
            line_or_to_subid,
            line_ex_to_subid,
            gen_to_subid,
            load_to_subid,
        };

        let mut diag = Diagnostics::new();
        topology.validate_into(&mut diag);
        if diag.has_errors() {
            let details: Vec<String> = diag.errors().map(|issue| issue.to_string()).collect();
            return Err(SwitchyardError::Topology(details.join("; ")));
        }
        Ok(topology)
    }

    /// Record structural problems: mismatched line arrays, unknown substations,
    /// self-loops (errors) and parallel lines or empty substations (warnings).
    pub fn validate_into(&self, diag: &mut Diagnostics) {
        if self.n_busbar_per_sub == 0 {
            diag.add_error("topology", "substations must have at least one busbar");
        }
        if self.line_or_to_subid.len() != self.line_ex_to_subid.len() {
            diag.add_error(
                "topology",
                &format!(
                    "line origin/extremity arrays differ in length ({} vs {})",
                    self.line_or_to_subid.len(),
                    self.line_ex_to_subid.len()
                ),
            );
        }

        let check_sub = |diag: &mut Diagnostics, sub: SubstationId, entity: String| {
            if sub.value() >= self.n_sub {
                diag.add_error_with_entity(
                    "topology",
                    &format!("unknown substation {sub} (n_sub = {})", self.n_sub),
                    &entity,
                );
            }
        };

        for (line, (or, ex)) in self
            .line_or_to_subid
            .iter()
            .zip(self.line_ex_to_subid.iter())
            .enumerate()
        {
            let entity = format!("Line {line}");
            check_sub(diag, *or, entity.clone());
            check_sub(diag, *ex, entity.clone());
            if or == ex {
                diag.add_error_with_entity(
                    "topology",
                    "line origin and extremity are the same substation",
                    &entity,
                );
            }
            let parallel = self.line_or_to_subid[..line]
                .iter()
                .zip(self.line_ex_to_subid[..line].iter())
                .position(|(a, b)| (a == or && b == ex) || (a == ex && b == or));
            if let Some(first) = parallel {
                diag.add_warning_with_entity(
                    "topology",
                    &format!("parallel to line {first}; resolution picks the lower index"),
                    &entity,
                );
            }
        }
        for (gen, sub) in self.gen_to_subid.iter().enumerate() {
            check_sub(diag, *sub, format!("Gen {gen}"));
        }
        for (load, sub) in self.load_to_subid.iter().enumerate() {
            check_sub(diag, *sub, format!("Load {load}"));
        }

        for sub in self.substation_ids() {
            if self.element_kinds_at(sub).is_empty() {
                diag.add_warning_with_entity(
                    "topology",
                    "no element is connected to this substation",
                    &format!("Substation {sub}"),
                );
            }
        }
    }

    pub fn n_sub(&self) -> usize {
        self.n_sub
    }

    pub fn n_busbar_per_sub(&self) -> usize {
        self.n_busbar_per_sub
    }

    pub fn n_line(&self) -> usize {
        self.line_or_to_subid.len()
    }

    pub fn n_gen(&self) -> usize {
        self.gen_to_subid.len()
    }

    pub fn n_load(&self) -> usize {
        self.load_to_subid.len()
    }

    pub fn line_or_to_subid(&self) -> &[SubstationId] {
        &self.line_or_to_subid
    }

    pub fn line_ex_to_subid(&self) -> &[SubstationId] {
        &self.line_ex_to_subid
    }

    pub fn gen_to_subid(&self) -> &[SubstationId] {
        &self.gen_to_subid
    }

    pub fn load_to_subid(&self) -> &[SubstationId] {
        &self.load_to_subid
    }

    /// Number of elements in a busbar category.
    pub fn category_len(&self, category: ElementCategory) -> usize {
        match category {
            ElementCategory::LinesOr | ElementCategory::LinesEx => self.n_line(),
            ElementCategory::Generators => self.n_gen(),
            ElementCategory::Loads => self.n_load(),
        }
    }

    /// All substations, in id order.
    pub fn substation_ids(&self) -> Vec<SubstationId> {
        (0..self.n_sub).map(SubstationId::new).collect()
    }

    pub fn contains_substation(&self, substation: SubstationId) -> bool {
        substation.value() < self.n_sub
    }

    /// Legal busbar choices for any element (`1..=n_busbar_per_sub`).
    pub fn busbar_options(&self) -> Vec<Busbar> {
        (1..=self.n_busbar_per_sub as i32).map(Busbar::new).collect()
    }

    pub fn is_valid_busbar(&self, busbar: Busbar) -> bool {
        busbar.value() >= 1 && busbar.value() as usize <= self.n_busbar_per_sub
    }

    /// Find the line joining `substation` to `neighbor` and which of its ends sits at `substation`.
    ///
    /// Returns `None` when no line joins the two (always the case when they are equal).
    /// If parallel lines exist, origin-side matches win over extremity-side matches and
    /// the lowest line index wins within a side.
    pub fn resolve_line(
        &self,
        substation: SubstationId,
        neighbor: SubstationId,
    ) -> Option<LineEndpoint> {
        if substation == neighbor {
            return None;
        }
        let pairs = || {
            self.line_or_to_subid
                .iter()
                .zip(self.line_ex_to_subid.iter())
                .enumerate()
        };

        pairs()
            .find(|(_, (or, ex))| **or == substation && **ex == neighbor)
            .map(|(line, _)| LineEndpoint {
                line,
                side: LineSide::Origin,
            })
            .or_else(|| {
                pairs()
                    .find(|(_, (or, ex))| **ex == substation && **or == neighbor)
                    .map(|(line, _)| LineEndpoint {
                        line,
                        side: LineSide::Extremity,
                    })
            })
    }

    /// Element indices of one category wired to `substation`, ascending.
    pub fn indices_at_substation(
        &self,
        category: ElementCategory,
        substation: SubstationId,
    ) -> Vec<usize> {
        let map = match category {
            ElementCategory::LinesOr => &self.line_or_to_subid,
            ElementCategory::LinesEx => &self.line_ex_to_subid,
            ElementCategory::Generators => &self.gen_to_subid,
            ElementCategory::Loads => &self.load_to_subid,
        };
        map.iter()
            .enumerate()
            .filter(|(_, sub)| **sub == substation)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Elements of one kind at `substation`, ascending by element index.
    ///
    /// For lines both ends are considered, so each line touching the substation
    /// appears once with the side that touches it.
    pub fn elements_at_substation(
        &self,
        kind: ElementKind,
        substation: SubstationId,
    ) -> Vec<ElementRef> {
        match kind {
            ElementKind::Line => (0..self.n_line())
                .filter_map(|index| {
                    if self.line_or_to_subid[index] == substation {
                        Some(ElementRef::Line {
                            index,
                            side: LineSide::Origin,
                        })
                    } else if self.line_ex_to_subid[index] == substation {
                        Some(ElementRef::Line {
                            index,
                            side: LineSide::Extremity,
                        })
                    } else {
                        None
                    }
                })
                .collect(),
            ElementKind::Generator => self
                .indices_at_substation(ElementCategory::Generators, substation)
                .into_iter()
                .map(|index| ElementRef::Generator { index })
                .collect(),
            ElementKind::Load => self
                .indices_at_substation(ElementCategory::Loads, substation)
                .into_iter()
                .map(|index| ElementRef::Load { index })
                .collect(),
        }
    }

    /// Substations reachable by one line from `substation`: the far end of lines
    /// arriving here (EX side) first, then the far end of lines leaving (OR side).
    pub fn line_neighbors(&self, substation: SubstationId) -> Vec<SubstationId> {
        let arriving = self
            .indices_at_substation(ElementCategory::LinesEx, substation)
            .into_iter()
            .map(|line| self.line_or_to_subid[line]);
        let leaving = self
            .indices_at_substation(ElementCategory::LinesOr, substation)
            .into_iter()
            .map(|line| self.line_ex_to_subid[line]);
        arriving.chain(leaving).collect()
    }

    /// Element kinds present at `substation`, in Line, Generator, Load order.
    pub fn element_kinds_at(&self, substation: SubstationId) -> Vec<ElementKind> {
        ElementKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ElementKind::Line => {
                    self.line_or_to_subid.contains(&substation)
                        || self.line_ex_to_subid.contains(&substation)
                }
                ElementKind::Generator => self.gen_to_subid.contains(&substation),
                ElementKind::Load => self.load_to_subid.contains(&substation),
            })
            .collect()
    }

    /// Line-to-substation table used when printing the pending action.
    pub fn render_table(&self, column_width: usize) -> String {
        let mut ids = String::new();
        let mut origins = String::new();
        let mut extremities = String::new();
        for line in 0..self.n_line() {
            ids.push_str(&format!("{:>w$}", line, w = column_width));
            origins.push_str(&format!(
                "{:>w$}",
                self.line_or_to_subid[line].value(),
                w = column_width
            ));
            extremities.push_str(&format!(
                "{:>w$}",
                self.line_ex_to_subid[line].value(),
                w = column_width
            ));
        }
        format!(
            "{:20}{}\n\n{:20}{}\n{:20}{}",
            "Line ID:", ids, "line_or_to_subid:", origins, "line_ex_to_subid:", extremities
        )
    }
}

impl TryFrom<TopologyData> for Topology {
    type Error = SwitchyardError;

    fn try_from(data: TopologyData) -> Result<Self, Self::Error> {
        Topology::new(
            data.n_sub,
            data.n_busbar_per_sub,
            data.line_or_to_subid,
            data.line_ex_to_subid,
            data.gen_to_subid,
            data.load_to_subid,
        )
    }
}

impl From<Topology> for TopologyData {
    fn from(topology: Topology) -> Self {
        TopologyData {
            n_sub: topology.n_sub,
            n_busbar_per_sub: topology.n_busbar_per_sub,
            line_or_to_subid: topology.line_or_to_subid,
            line_ex_to_subid: topology.line_ex_to_subid,
            gen_to_subid: topology.gen_to_subid,
            load_to_subid: topology.load_to_subid,
        }
    }
}
