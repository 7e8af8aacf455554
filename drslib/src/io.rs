//! Input output module.
//!
//! Serde representations of network models and simulation scenarios, plus
//! the conversion into the in-memory topology.

use serde::{Deserialize, Serialize};

use crate::restoration::RestorationConfig;
use crate::sim::{Event, EventAction, Simulation};
use crate::solver::NetworkSolver;
use crate::topology::{Branch, Bus, LinkKind, LinkStatus, Topology};
use crate::types::*;
use crate::utils::parse_phases;
use crate::RestoreFailure;

pub mod fs;


/// Tuple for the buses a branch connects.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BranchNodes(pub BusIndex, pub BusIndex);

/// JSON representation of one bus.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusInput {
    pub name: Option<String>,
    /// Phase-set label, e.g. `"ABC"` or `"AC"`.
    #[serde(default = "all_phases")]
    pub phases: String,
    /// Nominal line-to-neutral voltage in volts.
    pub nominal_voltage: f64,
    /// Connected load per phase in volt-amperes.
    #[serde(default)]
    pub load: [f64; PHASE_COUNT],
}

fn all_phases() -> String {
    "ABC".to_string()
}

/// JSON representation of one branch.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchInput {
    pub name: Option<String>,
    pub nodes: BranchNodes,
    pub kind: LinkKind,
    /// Defaults to closed; normally-open tie switches say so here.
    pub status: Option<LinkStatus>,
    /// Defaults to the phases both endpoints share.
    pub phases: Option<String>,
    /// Series resistance per phase in ohms.
    #[serde(default)]
    pub resistance: [f64; PHASE_COUNT],
    /// Continuous current rating per phase, June-September. Zero means
    /// unconstrained.
    #[serde(default)]
    pub summer_rating: [f64; PHASE_COUNT],
    /// Continuous current rating per phase for the rest of the year.
    #[serde(default)]
    pub winter_rating: [f64; PHASE_COUNT],
}

/// JSON representation of a distribution network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkModel {
    pub name: Option<String>,
    /// Index of the bus fed by the upstream source.
    pub source: BusIndex,
    pub buses: Vec<BusInput>,
    pub branches: Vec<BranchInput>,
}

impl NetworkModel {
    /// Builds the in-memory topology, validating phase labels and indices.
    pub fn build(&self) -> Result<Topology, RestoreFailure> {
        let mut buses = Vec::with_capacity(self.buses.len());
        for (i, input) in self.buses.iter().enumerate() {
            let phases = parse_phases(&input.phases).map_err(RestoreFailure::BadInput)?;
            buses.push(Bus {
                name: input
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("bus-{}", i)),
                phases,
                nominal_voltage: input.nominal_voltage,
                load: input.load,
                feeder: UNASSIGNED,
                parent: None,
                children: Vec::new(),
            });
        }
        let mut branches = Vec::with_capacity(self.branches.len());
        for (i, input) in self.branches.iter().enumerate() {
            let BranchNodes(from, to) = input.nodes;
            if from >= buses.len() || to >= buses.len() {
                return Err(RestoreFailure::BadInput(format!(
                    "Branch {} references a bus out of range",
                    i
                )));
            }
            let phases = match &input.phases {
                Some(label) => parse_phases(label).map_err(RestoreFailure::BadInput)?,
                None => {
                    let mut common = [false; PHASE_COUNT];
                    for p in 0..PHASE_COUNT {
                        common[p] = buses[from].phases[p] && buses[to].phases[p];
                    }
                    common
                }
            };
            branches.push(Branch {
                name: input
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("branch-{}", i)),
                from,
                to,
                kind: input.kind,
                status: input.status.unwrap_or(LinkStatus::Closed),
                phases,
                summer_rating: input.summer_rating,
                winter_rating: input.winter_rating,
                resistance: input.resistance,
            });
        }
        Topology::new(buses, branches, self.source)
    }
}

/// A scripted protection or switching event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventInput {
    /// A fault on `branch`. When `clearedBy` names a protective device, that
    /// device opens and the faulted branch stays conducting inside the dead
    /// region; otherwise the faulted branch itself trips open.
    Fault {
        step: usize,
        branch: BranchIndex,
        #[serde(default, rename = "clearedBy")]
        cleared_by: Option<BranchIndex>,
    },
    /// An externally scheduled switch operation.
    Switch {
        step: usize,
        branch: BranchIndex,
        status: LinkStatus,
    },
}

impl EventInput {
    fn step(&self) -> usize {
        match self {
            EventInput::Fault { step, .. } | EventInput::Switch { step, .. } => *step,
        }
    }
}

/// A complete simulation scenario: the network, the calendar month (for
/// seasonal ratings), the number of timesteps, the scripted events and the
/// restoration options.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: Option<String>,
    pub network: NetworkModel,
    #[serde(default = "default_month")]
    pub month: Month,
    pub steps: usize,
    #[serde(default)]
    pub events: Vec<EventInput>,
    #[serde(default)]
    pub config: RestorationConfig,
}

fn default_month() -> Month {
    6
}

impl Scenario {
    /// Builds a ready-to-run simulation around the given solver.
    pub fn prepare<S: NetworkSolver>(self, solver: S) -> Result<Simulation<S>, RestoreFailure> {
        let Scenario {
            name,
            network,
            month,
            steps,
            events,
            config,
        } = self;
        if !(1..=12).contains(&month) {
            return Err(RestoreFailure::BadInput(format!(
                "Month {} out of range",
                month
            )));
        }
        let top = network.build()?;
        let mut converted = Vec::with_capacity(events.len());
        for event in events {
            let step = event.step();
            if step >= steps {
                return Err(RestoreFailure::BadInput(format!(
                    "Event at step {} beyond the last step {}",
                    step,
                    steps.saturating_sub(1)
                )));
            }
            let action = match event {
                EventInput::Fault {
                    branch, cleared_by, ..
                } => {
                    for idx in std::iter::once(branch).chain(cleared_by) {
                        if idx >= top.branch_count() {
                            return Err(RestoreFailure::BadInput(format!(
                                "Event references branch {} out of range",
                                idx
                            )));
                        }
                    }
                    EventAction::Fault { branch, cleared_by }
                }
                EventInput::Switch { branch, status, .. } => {
                    if branch >= top.branch_count() {
                        return Err(RestoreFailure::BadInput(format!(
                            "Event references branch {} out of range",
                            branch
                        )));
                    }
                    EventAction::Operate { branch, status }
                }
            };
            converted.push(Event { step, action });
        }
        Simulation::new(name, top, config, solver, month, steps, converted)
    }
}
