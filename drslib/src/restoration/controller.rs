//! Per-timestep orchestration of the restoration engine.

use super::search::{plan_targets, PlanQueue, SearchContext};
use super::validate::validate_plan;
use super::{
    ControllerState, FeederMinimum, PlanActionRecord, RestorationConfig, RestoredReport,
    TimestepOutcome, TrialCounters,
};
use crate::feeders;
use crate::solver::{NetworkSolver, SolverError, SolverOutput};
use crate::support;
use crate::topology::Topology;
use crate::types::*;
use crate::RestoreFailure;

/// The restoration engine context: configuration, the solver it drives, and
/// the state carried between passes. Constructed once per simulated network;
/// one analysis is active at a time.
pub struct RestorationEngine<S: NetworkSolver> {
    config: RestorationConfig,
    solver: S,
    state: ControllerState,
    counters: TrialCounters,
    /// Spanning parents from the most recent pass in which each bus was
    /// supported. For de-energized buses this preserves the pre-fault feed
    /// path, which the search walks to find isolating sectionalizers.
    parents: Vec<Option<BusIndex>>,
    /// Buses an accepted plan deliberately left de-energized to isolate a
    /// fault. They do not re-trigger the search; the mark clears as soon as
    /// a bus regains support.
    isolated: Vec<bool>,
    /// Solution of the last accepted or healthy solve.
    last_output: Option<SolverOutput>,
}

impl<S: NetworkSolver> RestorationEngine<S> {
    /// Validates the configuration against the model and builds the engine.
    pub fn new(
        config: RestorationConfig,
        solver: S,
        top: &Topology,
    ) -> Result<RestorationEngine<S>, RestoreFailure> {
        config.validate()?;
        if let Some(limits) = &config.feeder_power_limits {
            let feeders = feeders::partition(top).count;
            if limits.len() != feeders {
                return Err(RestoreFailure::BadInput(format!(
                    "{} feeder power limits for {} feeders",
                    limits.len(),
                    feeders
                )));
            }
        }
        let (_, parents) = support::compute_with_parents(top);
        Ok(RestorationEngine {
            config,
            solver,
            state: ControllerState::Idle,
            counters: TrialCounters::default(),
            parents,
            isolated: vec![false; top.bus_count()],
            last_output: None,
        })
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn counters(&self) -> &TrialCounters {
        &self.counters
    }

    pub fn config(&self) -> &RestorationConfig {
        &self.config
    }

    /// Solution of the last accepted trial or main solve, if any.
    pub fn last_output(&self) -> Option<&SolverOutput> {
        self.last_output.as_ref()
    }

    /// The pre-solve pass for one timestep.
    ///
    /// Runs support analysis unconditionally; when any bus lacks support,
    /// drives the search/validate loop until a plan is accepted, the attempt
    /// budget is exhausted, or no tie switch reaches the de-energized
    /// region. Must complete before the timestep's main solve, which
    /// consumes the then-fixed topology. All per-timestep counters reset
    /// here.
    pub fn run_timestep(
        &mut self,
        top: &mut Topology,
        month: Month,
        faulted: Option<BranchIndex>,
    ) -> Result<TimestepOutcome, RestoreFailure> {
        self.counters.reset();
        self.state = ControllerState::Idle;

        let (flags, parents_now) = support::compute_with_parents(top);
        for bus in 0..top.bus_count() {
            if flags.bus_supported(top, bus) {
                self.parents[bus] = parents_now[bus];
                self.isolated[bus] = false;
            }
        }
        if self.config.populate_tree {
            support::populate_tree(top);
        }

        // Buses an earlier plan isolated on purpose stay off the books
        // until repair re-supports them.
        let unsupported: Vec<BusIndex> = flags
            .unsupported_buses(top)
            .into_iter()
            .filter(|&b| !self.isolated[b])
            .collect();
        if unsupported.is_empty() {
            return Ok(TimestepOutcome::Idle);
        }
        log::info!(
            "{} of {} buses without source support; searching for a restoration plan",
            unsupported.len(),
            top.bus_count()
        );

        self.state = ControllerState::Searching;
        let partition = feeders::partition(top);

        let mut queue = {
            let ctx = SearchContext {
                top,
                partition: &partition,
                support: &flags,
                unsupported: &unsupported,
                parents: &self.parents,
                faulted,
            };
            // An unrestorable region fails here, before any attempt is
            // spent.
            PlanQueue::new(&ctx, self.config.max_switch_ops)?
        };

        loop {
            if self.counters.attempts >= self.config.reconfig_attempts {
                self.state = ControllerState::Exhausted;
                return Err(RestoreFailure::Exhausted {
                    attempts: self.counters.attempts,
                });
            }
            let (plan, targets) = {
                let ctx = SearchContext {
                    top,
                    partition: &partition,
                    support: &flags,
                    unsupported: &unsupported,
                    parents: &self.parents,
                    faulted,
                };
                match queue.next_plan(&ctx)? {
                    Some(plan) => {
                        let targets = plan_targets(&ctx, &plan);
                        (plan, targets)
                    }
                    None => {
                        self.state = ControllerState::Exhausted;
                        return Err(RestoreFailure::Exhausted {
                            attempts: self.counters.attempts,
                        });
                    }
                }
            };

            self.state = ControllerState::Validating;
            self.counters.attempts += 1;
            match validate_plan(
                top,
                &mut self.solver,
                &self.config,
                &partition,
                &plan,
                &targets,
                month,
            ) {
                Ok(accepted) => {
                    self.state = ControllerState::Restored;
                    let mut isolated = Vec::new();
                    for &bus in unsupported.iter() {
                        if targets.contains(&bus) {
                            continue;
                        }
                        self.isolated[bus] = true;
                        isolated.push(top.buses[bus].name.clone());
                    }
                    let report =
                        self.build_report(top, &plan, accepted.feeder_minimums, isolated);
                    self.last_output = Some(accepted.output);
                    log_acceptance(&report);
                    return Ok(TimestepOutcome::Restored(report));
                }
                Err(rejection) => {
                    self.counters.tally(rejection);
                    log::debug!(
                        "Trial {} rejected: {}",
                        self.counters.attempts,
                        rejection
                    );
                    self.state = ControllerState::Searching;
                }
            }
        }
    }

    /// The timestep's main solve, run after the pre-solve pass has fixed the
    /// topology.
    pub fn main_solve(&mut self, top: &Topology) -> Result<SolverOutput, SolverError> {
        let output = self.solver.solve(top, 0)?;
        self.last_output = Some(output.clone());
        Ok(output)
    }

    fn build_report(
        &self,
        top: &Topology,
        plan: &super::CandidatePlan,
        feeder_minimums: Vec<FeederMinimum>,
        isolated: Vec<String>,
    ) -> RestoredReport {
        let actions = plan
            .actions
            .iter()
            .map(|a| PlanActionRecord {
                branch: a.branch,
                name: top.branches[a.branch].name.clone(),
                status: a.status,
            })
            .collect();
        RestoredReport {
            plan: actions,
            attempts: self.counters.attempts,
            feeder_minimums,
            isolated,
        }
    }
}

fn log_acceptance(report: &RestoredReport) {
    let actions: Vec<String> = report
        .plan
        .iter()
        .map(|a| format!("{} -> {:?}", a.name, a.status))
        .collect();
    log::info!(
        "Restoration accepted after {} trial(s): {}",
        report.attempts,
        actions.join(", ")
    );
}
