//! The automatic restoration engine.
//!
//! Orchestrated once per simulated timestep, before the main network solve:
//! support analysis detects de-energized buses, the candidate search
//! enumerates switch-operation plans in increasing operation count, and each
//! candidate is trial-applied, solved and checked against voltage and
//! thermal limits until one is accepted or the attempt budget runs out.

mod controller;
mod search;
mod validate;

pub use controller::*;
pub use search::{plan_targets, PlanQueue, SearchContext};
pub use validate::*;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::topology::LinkStatus;
use crate::types::*;
use crate::RestoreFailure;

/// Options recognized by the restoration engine. Validated once at engine
/// construction; fatal problems become [`RestoreFailure::BadInput`],
/// recoverable oddities are logged as warnings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RestorationConfig {
    /// Maximum plan trials per timestep. Zero is rejected at initialization:
    /// it would let the search run forever.
    pub reconfig_attempts: usize,
    /// Iteration ceiling handed to the solver for each trial. Zero defers to
    /// the solver's own ceiling, with a warning.
    pub reconfig_iteration_limit: usize,
    /// Maintain the parent/child tree view on the topology for downstream
    /// consumers.
    pub populate_tree: bool,
    /// Acceptable bus voltage band in per-unit of nominal, [lower, upper].
    pub voltage_limits: [f64; 2],
    /// Optional apparent-power cap per feeder (volt-amperes), checked at the
    /// feeder head. Indexed by feeder id.
    pub feeder_power_limits: Option<Vec<f64>>,
    /// Ceiling on the operation count of candidate plans.
    pub max_switch_ops: usize,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        RestorationConfig {
            reconfig_attempts: 10,
            reconfig_iteration_limit: 20,
            populate_tree: false,
            voltage_limits: [0.927, 1.05],
            feeder_power_limits: None,
            max_switch_ops: 3,
        }
    }
}

impl RestorationConfig {
    pub fn validate(&self) -> Result<(), RestoreFailure> {
        if self.reconfig_attempts == 0 {
            return Err(RestoreFailure::BadInput(
                "reconfig_attempts is zero; the search would be unbounded".to_string(),
            ));
        }
        if self.reconfig_iteration_limit == 0 {
            log::warn!("reconfig_iteration_limit is zero; the solver's own ceiling applies");
        }
        if self.voltage_limits[1] <= self.voltage_limits[0] {
            return Err(RestoreFailure::BadInput(format!(
                "Voltage limits are reversed or equal: [{}, {}]",
                self.voltage_limits[0], self.voltage_limits[1]
            )));
        }
        if self.max_switch_ops == 0 {
            return Err(RestoreFailure::BadInput(
                "max_switch_ops is zero; no plan could ever be generated".to_string(),
            ));
        }
        Ok(())
    }
}

/// One switch operation of a candidate plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PlanAction {
    pub branch: BranchIndex,
    pub status: LinkStatus,
}

impl PlanAction {
    pub fn close(branch: BranchIndex) -> PlanAction {
        PlanAction {
            branch,
            status: LinkStatus::Closed,
        }
    }

    pub fn open(branch: BranchIndex) -> PlanAction {
        PlanAction {
            branch,
            status: LinkStatus::Open,
        }
    }
}

/// An ordered list of switch operations proposed to restore service.
/// Transient: produced by the search, consumed by validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidatePlan {
    pub actions: Vec<PlanAction>,
}

impl CandidatePlan {
    pub fn op_count(&self) -> usize {
        self.actions.len()
    }
}

/// Why a trial was rejected. Recovered locally by the controller, which
/// moves on to the next candidate; never surfaced as an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Rejection {
    /// A target bus was still without support after the trial switching.
    StillUnsupported,
    /// The solver failed to converge on the trial topology.
    SolverFailed,
    /// A voltage, current or feeder-power limit was violated.
    LimitExceeded,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Rejection::StillUnsupported => write!(f, "target buses still unsupported"),
            Rejection::SolverFailed => write!(f, "solver failed to converge"),
            Rejection::LimitExceeded => write!(f, "operating limit exceeded"),
        }
    }
}

/// Observable state of the restoration controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    Idle,
    Searching,
    Validating,
    Restored,
    Exhausted,
}

/// Per-timestep trial accounting. Reset at the start of every timestep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialCounters {
    pub attempts: usize,
    pub still_unsupported: usize,
    pub solver_failed: usize,
    pub limit_exceeded: usize,
}

impl TrialCounters {
    pub fn reset(&mut self) {
        *self = TrialCounters::default();
    }

    pub fn tally(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::StillUnsupported => self.still_unsupported += 1,
            Rejection::SolverFailed => self.solver_failed += 1,
            Rejection::LimitExceeded => self.limit_exceeded += 1,
        }
    }
}

/// A switch operation of an accepted plan, with the branch name resolved for
/// reporting.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanActionRecord {
    pub branch: BranchIndex,
    pub name: String,
    pub status: LinkStatus,
}

/// Minimum per-unit voltage observed on one feeder after restoration.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeederMinimum {
    pub feeder: FeederId,
    pub bus: String,
    pub min_voltage_pu: f64,
}

/// Result of a successful restoration: the ordered switching actions plus
/// the post-restoration minimum voltage per feeder.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredReport {
    pub plan: Vec<PlanActionRecord>,
    pub attempts: usize,
    pub feeder_minimums: Vec<FeederMinimum>,
    /// Buses the plan deliberately left de-energized to isolate the fault.
    /// They stay off the controller's books until repair re-supports them.
    pub isolated: Vec<String>,
}

/// What the controller did for one timestep.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum TimestepOutcome {
    /// Every bus was supported; nothing to do.
    Idle,
    /// A plan was accepted and left applied to the topology.
    Restored(RestoredReport),
}
