//! The topology index: buses, branches and the connectivity matrix.
//!
//! Built once per model load. Switch states are mutated in place as the
//! restoration engine and scripted protection events operate; everything else
//! is immutable for the life of the model.

use ndarray::Array2;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::RestoreFailure;

/// Kind of equipment a branch represents. The numeric value is the code
/// stored in the connectivity matrix (0 is reserved for "no link").
#[derive(
    Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize, FromPrimitive, ToPrimitive,
)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Line = 1,
    Fuse = 2,
    Switch = 3,
    Transformer = 4,
}

/// Conduction state of a branch. Every branch carries one, mirroring the
/// status gate on every link of the solver's branch table: a switch is
/// operated open or closed, an open fuse is blown, and a line or transformer
/// is open only when a fault has tripped it out of service.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Open,
    Closed,
}

/// A network node where voltage is defined and devices attach.
#[derive(Clone, Debug)]
pub struct Bus {
    pub name: String,
    /// Which of phases A, B, C exist at this bus.
    pub phases: [bool; PHASE_COUNT],
    /// Nominal line-to-neutral voltage in volts; the base for per-unit checks.
    pub nominal_voltage: f64,
    /// Connected load per phase in volt-amperes. Input to the solver.
    pub load: [f64; PHASE_COUNT],
    /// Feeder this bus belongs to; [`UNASSIGNED`] until a partitioning pass.
    pub feeder: FeederId,
    /// Parent in the tree view, when maintained.
    pub parent: Option<BusIndex>,
    /// Children in the tree view, when maintained.
    pub children: Vec<BusIndex>,
}

/// A network edge connecting two buses.
#[derive(Clone, Debug)]
pub struct Branch {
    pub name: String,
    pub from: BusIndex,
    pub to: BusIndex,
    pub kind: LinkKind,
    pub status: LinkStatus,
    /// Phases this branch carries; always a subset of both endpoints'.
    pub phases: [bool; PHASE_COUNT],
    /// Continuous current rating per phase in amperes, June through
    /// September. Zero means unconstrained.
    pub summer_rating: [f64; PHASE_COUNT],
    /// Continuous current rating per phase in amperes for the rest of the
    /// year. Zero means unconstrained.
    pub winter_rating: [f64; PHASE_COUNT],
    /// Series resistance per phase in ohms. Consumed by the bundled solver.
    pub resistance: [f64; PHASE_COUNT],
}

impl Branch {
    /// The endpoint opposite to `bus`.
    pub fn other_end(&self, bus: BusIndex) -> BusIndex {
        if self.from == bus {
            self.to
        } else {
            self.from
        }
    }

    pub fn is_switch(&self) -> bool {
        self.kind == LinkKind::Switch
    }

    pub fn is_closed(&self) -> bool {
        self.status == LinkStatus::Closed
    }

    /// Continuous current rating for the given season.
    pub fn continuous_rating(&self, season: Season) -> &[f64; PHASE_COUNT] {
        match season {
            Season::Summer => &self.summer_rating,
            Season::Winter => &self.winter_rating,
        }
    }

    /// True if this branch conducts the given phase in its current state.
    pub fn conducts(&self, phase: usize) -> bool {
        self.phases[phase] && self.status == LinkStatus::Closed
    }
}

/// Square, symmetric adjacency structure over bus indices. One entry per
/// unordered bus pair: the link-kind code of the connecting branch (0 when
/// there is none) and the branch index itself.
#[derive(Clone)]
pub struct ConnectivityMatrix {
    kinds: Array2<u8>,
    branches: Array2<usize>,
}

/// Sentinel for "no branch between this pair" in the branch index matrix.
const NO_LINK: usize = usize::MAX;

impl ConnectivityMatrix {
    fn build(bus_count: usize, branches: &[Branch]) -> Result<ConnectivityMatrix, RestoreFailure> {
        let mut kinds = Array2::<u8>::zeros((bus_count, bus_count));
        let mut branch_idx = Array2::<usize>::from_elem((bus_count, bus_count), NO_LINK);
        for (i, branch) in branches.iter().enumerate() {
            let (a, b) = (branch.from, branch.to);
            if a == b {
                return Err(RestoreFailure::BadInput(format!(
                    "Branch {} connects bus {} to itself",
                    branch.name, a
                )));
            }
            if branch_idx[(a, b)] != NO_LINK {
                return Err(RestoreFailure::BadInput(format!(
                    "Parallel branch between buses {} and {}",
                    a, b
                )));
            }
            let code = branch.kind.to_u8().unwrap_or(0);
            kinds[(a, b)] = code;
            kinds[(b, a)] = code;
            branch_idx[(a, b)] = i;
            branch_idx[(b, a)] = i;
        }
        Ok(ConnectivityMatrix {
            kinds,
            branches: branch_idx,
        })
    }

    /// Link kind between two buses, if any branch connects them.
    pub fn link_kind(&self, a: BusIndex, b: BusIndex) -> Option<LinkKind> {
        LinkKind::from_u8(self.kinds[(a, b)])
    }

    /// Index of the branch between two buses, if any.
    pub fn branch_between(&self, a: BusIndex, b: BusIndex) -> Option<BranchIndex> {
        let idx = self.branches[(a, b)];
        if idx == NO_LINK {
            None
        } else {
            Some(idx)
        }
    }
}

/// Snapshot of the whole network: buses, branches, the connectivity matrix
/// and per-bus link tables. Referenced by every analysis component.
#[derive(Clone)]
pub struct Topology {
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    /// The bus directly connected to the upstream source.
    pub source: BusIndex,
    pub matrix: ConnectivityMatrix,
    /// Incident branches per bus, in branch-table order. Traversals follow
    /// this order, so it is part of the observable behavior.
    link_table: Vec<Vec<BranchIndex>>,
}

impl Topology {
    pub fn new(
        buses: Vec<Bus>,
        branches: Vec<Branch>,
        source: BusIndex,
    ) -> Result<Topology, RestoreFailure> {
        if buses.is_empty() {
            return Err(RestoreFailure::BadInput("Model has no buses".to_string()));
        }
        if source >= buses.len() {
            return Err(RestoreFailure::BadInput(format!(
                "Source bus index {} out of range ({} buses)",
                source,
                buses.len()
            )));
        }
        for branch in branches.iter() {
            if branch.from >= buses.len() || branch.to >= buses.len() {
                return Err(RestoreFailure::BadInput(format!(
                    "Branch {} references a bus out of range",
                    branch.name
                )));
            }
            for phase in 0..PHASE_COUNT {
                if branch.phases[phase]
                    && !(buses[branch.from].phases[phase] && buses[branch.to].phases[phase])
                {
                    return Err(RestoreFailure::BadInput(format!(
                        "Branch {} carries phase {} missing from an endpoint",
                        branch.name, PHASE_NAMES[phase]
                    )));
                }
            }
        }
        let matrix = ConnectivityMatrix::build(buses.len(), &branches)?;
        let mut link_table: Vec<Vec<BranchIndex>> = vec![Vec::new(); buses.len()];
        for (i, branch) in branches.iter().enumerate() {
            link_table[branch.from].push(i);
            link_table[branch.to].push(i);
        }
        Ok(Topology {
            buses,
            branches,
            source,
            matrix,
            link_table,
        })
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    /// Incident branches of a bus in branch-table order.
    pub fn links_of(&self, bus: BusIndex) -> &[BranchIndex] {
        &self.link_table[bus]
    }

    /// Operate a branch to the given status.
    pub fn set_status(&mut self, branch: BranchIndex, status: LinkStatus) {
        self.branches[branch].status = status;
    }

    /// Current status of every switch and fuse, for reporting.
    pub fn protection_states(&self) -> Vec<(String, LinkKind, LinkStatus)> {
        self.branches
            .iter()
            .filter(|b| matches!(b.kind, LinkKind::Switch | LinkKind::Fuse))
            .map(|b| (b.name.clone(), b.kind, b.status))
            .collect()
    }
}
