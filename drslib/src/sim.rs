//! The time-stepped simulation loop.
//!
//! Each step applies the scripted protection events, runs the restoration
//! engine (the pre-solve hook), then the main network solve against the
//! now-fixed topology. Fatal restoration outcomes abort the run with the
//! final switch states attached.

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::restoration::{
    RestorationConfig, RestorationEngine, TimestepOutcome, TrialCounters,
};
use crate::solver::{NetworkSolver, SolverError};
use crate::support;
use crate::topology::{LinkKind, LinkStatus, Topology};
use crate::types::*;
use crate::RestoreFailure;

/// What a scripted event does to the topology.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventAction {
    /// An externally scheduled switch operation.
    Operate {
        branch: BranchIndex,
        status: LinkStatus,
    },
    /// A fault on `branch`, cleared either by the named protective device or
    /// by the faulted branch tripping itself.
    Fault {
        branch: BranchIndex,
        cleared_by: Option<BranchIndex>,
    },
}

/// A scripted event bound to a timestep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Event {
    pub step: usize,
    pub action: EventAction,
}

/// Per-timestep record for the run report.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub step: usize,
    pub outcome: TimestepOutcome,
    pub counters: TrialCounters,
    /// Solver iterations of the main solve.
    pub iterations: usize,
    /// Minimum per-unit voltage across energized phases after the main
    /// solve.
    pub min_voltage_pu: Option<f64>,
}

/// Full record of a completed run.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub name: Option<String>,
    pub steps: Vec<StepReport>,
    /// Peak bytes allocated over the run, sampled per timestep.
    pub max_memory: usize,
}

/// Switch or fuse state for failure reporting.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtectionState {
    pub name: String,
    pub kind: LinkKind,
    pub status: LinkStatus,
}

/// Why a run stopped early.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum SimFailureKind {
    Restoration(RestoreFailure),
    MainSolve(SolverError),
}

/// A failed run: the reason plus the last topology examined.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimError {
    pub step: usize,
    pub kind: SimFailureKind,
    pub protection_states: Vec<ProtectionState>,
}

impl std::error::Error for SimError {}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self.kind {
            SimFailureKind::Restoration(failure) => {
                write!(f, "Step {}: {}", self.step, failure)
            }
            SimFailureKind::MainSolve(err) => {
                write!(f, "Step {}: main solve failed: {}", self.step, err)
            }
        }
    }
}

/// One simulated network run: topology, restoration engine and the scripted
/// event list.
pub struct Simulation<S: NetworkSolver> {
    name: Option<String>,
    top: Topology,
    engine: RestorationEngine<S>,
    month: Month,
    steps: usize,
    events: Vec<Event>,
}

impl<S: NetworkSolver> Simulation<S> {
    pub fn new(
        name: Option<String>,
        top: Topology,
        config: RestorationConfig,
        solver: S,
        month: Month,
        steps: usize,
        events: Vec<Event>,
    ) -> Result<Simulation<S>, RestoreFailure> {
        let engine = RestorationEngine::new(config, solver, &top)?;
        Ok(Simulation {
            name,
            top,
            engine,
            month,
            steps,
            events,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.top
    }

    pub fn engine(&self) -> &RestorationEngine<S> {
        &self.engine
    }

    /// Runs every timestep to completion, or stops at the first fatal
    /// failure.
    pub fn run(&mut self) -> Result<RunReport, Box<SimError>> {
        let mut reports = Vec::with_capacity(self.steps);
        let mut max_memory: usize = 0;
        for step in 0..self.steps {
            let faulted = self.apply_events(step);
            let outcome = self
                .engine
                .run_timestep(&mut self.top, self.month, faulted)
                .map_err(|failure| self.fail(step, SimFailureKind::Restoration(failure)))?;
            let output = self
                .engine
                .main_solve(&self.top)
                .map_err(|err| self.fail(step, SimFailureKind::MainSolve(err)))?;

            let flags = support::compute(&self.top);
            let min_voltage_pu = {
                let top = &self.top;
                let output = &output;
                let flags = &flags;
                (0..top.bus_count())
                    .flat_map(|b| {
                        (0..PHASE_COUNT)
                            .filter(move |&p| flags.is_supported(b, p))
                            .map(move |p| output.per_unit(top, b, p))
                    })
                    .min_by_key(|&pu| OrderedFloat(pu))
            };
            max_memory = max_memory.max(crate::allocated_memory());
            reports.push(StepReport {
                step,
                outcome,
                counters: *self.engine.counters(),
                iterations: output.iterations,
                min_voltage_pu,
            });
        }
        Ok(RunReport {
            name: self.name.clone(),
            steps: reports,
            max_memory,
        })
    }

    /// Applies this step's scripted events; returns the faulted branch when
    /// a fault fired.
    fn apply_events(&mut self, step: usize) -> Option<BranchIndex> {
        let mut faulted = None;
        for event in self.events.iter().filter(|e| e.step == step) {
            match event.action {
                EventAction::Operate { branch, status } => {
                    log::info!(
                        "Step {}: scheduled operation of {} to {:?}",
                        step,
                        self.top.branches[branch].name,
                        status
                    );
                    self.top.branches[branch].status = status;
                }
                EventAction::Fault { branch, cleared_by } => {
                    let tripped = cleared_by.unwrap_or(branch);
                    log::info!(
                        "Step {}: fault on {}, cleared by {}",
                        step,
                        self.top.branches[branch].name,
                        self.top.branches[tripped].name
                    );
                    self.top.branches[tripped].status = LinkStatus::Open;
                    faulted = Some(branch);
                }
            }
        }
        faulted
    }

    fn fail(&self, step: usize, kind: SimFailureKind) -> Box<SimError> {
        let states = self
            .top
            .protection_states()
            .into_iter()
            .map(|(name, kind, status)| ProtectionState { name, kind, status })
            .collect();
        Box::new(SimError {
            step,
            kind,
            protection_states: states,
        })
    }
}
