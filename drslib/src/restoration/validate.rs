//! Trial application and checking of candidate plans.
//!
//! A trial applies the plan's switch operations, re-runs support analysis,
//! solves the network and checks the solution against configured limits.
//! Every rejected trial reverts its switch changes before returning, so the
//! topology always reflects the last accepted configuration.

use ordered_float::OrderedFloat;

use super::{CandidatePlan, FeederMinimum, Rejection, RestorationConfig};
use crate::feeders::FeederPartition;
use crate::solver::{NetworkSolver, SolverOutput};
use crate::support::{self, SupportFlags};
use crate::topology::{LinkKind, Topology};
use crate::types::*;

/// A trial that passed every check. The plan's switch states are left
/// applied to the topology.
pub struct Accepted {
    pub output: SolverOutput,
    pub support: SupportFlags,
    pub feeder_minimums: Vec<FeederMinimum>,
}

/// Applies `plan` and validates the result, reverting on any rejection.
///
/// `targets` is the set of buses the trial is required to restore; buses the
/// plan deliberately isolates are not in it. `partition` is the pre-trial
/// feeder partition, which indexes the optional feeder power limits and the
/// per-feeder reporting.
pub fn validate_plan<S: NetworkSolver>(
    top: &mut Topology,
    solver: &mut S,
    config: &RestorationConfig,
    partition: &FeederPartition,
    plan: &CandidatePlan,
    targets: &[BusIndex],
    month: Month,
) -> Result<Accepted, Rejection> {
    // Snapshot the touched switches so any rejection can be undone exactly.
    let snapshot: Vec<_> = plan
        .actions
        .iter()
        .map(|a| (a.branch, top.branches[a.branch].status))
        .collect();
    for action in plan.actions.iter() {
        top.set_status(action.branch, action.status);
    }

    let result = check_trial(top, solver, config, partition, targets, month);
    match result {
        Ok(accepted) => Ok(accepted),
        Err(rejection) => {
            for &(branch, status) in snapshot.iter().rev() {
                top.set_status(branch, status);
            }
            Err(rejection)
        }
    }
}

fn check_trial<S: NetworkSolver>(
    top: &Topology,
    solver: &mut S,
    config: &RestorationConfig,
    partition: &FeederPartition,
    targets: &[BusIndex],
    month: Month,
) -> Result<Accepted, Rejection> {
    let flags = support::compute(top);
    if targets.iter().any(|&b| !flags.bus_supported(top, b)) {
        return Err(Rejection::StillUnsupported);
    }

    let output = match solver.solve(top, config.reconfig_iteration_limit) {
        Ok(output) => output,
        Err(err) => {
            log::debug!("Trial solve failed: {}", err);
            return Err(Rejection::SolverFailed);
        }
    };

    check_voltages(top, config, &flags, &output)?;
    check_currents(top, &output, month)?;
    if let Some(limits) = &config.feeder_power_limits {
        check_feeder_power(top, partition, limits, &output)?;
    }

    let feeder_minimums = feeder_minimums(top, partition, &flags, &output);
    Ok(Accepted {
        output,
        support: flags,
        feeder_minimums,
    })
}

/// Every supported phase of every bus must sit inside the per-unit band.
fn check_voltages(
    top: &Topology,
    config: &RestorationConfig,
    flags: &SupportFlags,
    output: &SolverOutput,
) -> Result<(), Rejection> {
    let [lower, upper] = config.voltage_limits;
    for bus in 0..top.bus_count() {
        for phase in 0..PHASE_COUNT {
            if !top.buses[bus].phases[phase] || !flags.is_supported(bus, phase) {
                continue;
            }
            let pu = output.per_unit(top, bus, phase);
            if pu < lower || pu > upper {
                log::debug!(
                    "Voltage violation at bus {} phase {}: {:.4} pu",
                    top.buses[bus].name,
                    PHASE_NAMES[phase],
                    pu
                );
                return Err(Rejection::LimitExceeded);
            }
        }
    }
    Ok(())
}

/// Line currents must respect the seasonal continuous rating. A rating of
/// exactly zero means unconstrained.
fn check_currents(top: &Topology, output: &SolverOutput, month: Month) -> Result<(), Rejection> {
    let season = season_for_month(month);
    for (i, branch) in top.branches.iter().enumerate() {
        if branch.kind != LinkKind::Line {
            continue;
        }
        let rating = branch.continuous_rating(season);
        for phase in 0..PHASE_COUNT {
            if !branch.conducts(phase) || rating[phase] == 0.0 {
                continue;
            }
            let current = output.branch_currents[(i, phase)];
            if current > rating[phase] {
                log::debug!(
                    "Current violation on {} phase {}: {:.1} A over {:.1} A",
                    branch.name,
                    PHASE_NAMES[phase],
                    current,
                    rating[phase]
                );
                return Err(Rejection::LimitExceeded);
            }
        }
    }
    Ok(())
}

/// Apparent power through each feeder head must respect the configured cap.
fn check_feeder_power(
    top: &Topology,
    partition: &FeederPartition,
    limits: &[f64],
    output: &SolverOutput,
) -> Result<(), Rejection> {
    for &head_branch in top.links_of(top.source) {
        let head_bus = top.branches[head_branch].other_end(top.source);
        let feeder = partition.feeder_of[head_bus];
        if feeder == UNASSIGNED {
            continue;
        }
        let limit = match limits.get(feeder as usize) {
            Some(&limit) if limit > 0.0 => limit,
            _ => continue,
        };
        let power: f64 = (0..PHASE_COUNT)
            .map(|p| output.bus_voltages[(head_bus, p)] * output.branch_currents[(head_branch, p)])
            .sum();
        if power > limit {
            log::debug!(
                "Feeder {} overloaded: {:.0} VA over {:.0} VA",
                feeder,
                power,
                limit
            );
            return Err(Rejection::LimitExceeded);
        }
    }
    Ok(())
}

/// Minimum per-unit voltage per feeder, over supported phases, for the
/// acceptance report.
pub fn feeder_minimums(
    top: &Topology,
    partition: &FeederPartition,
    flags: &SupportFlags,
    output: &SolverOutput,
) -> Vec<FeederMinimum> {
    let mut minimums: Vec<FeederMinimum> = Vec::new();
    for feeder in 0..partition.count as FeederId {
        let minimum = (0..top.bus_count())
            .filter(|&b| partition.feeder_of[b] == feeder)
            .flat_map(|b| {
                (0..PHASE_COUNT)
                    .filter(move |&p| top.buses[b].phases[p] && flags.is_supported(b, p))
                    .map(move |p| (b, output.per_unit(top, b, p)))
            })
            .min_by_key(|&(_, pu)| OrderedFloat(pu));
        if let Some((bus, pu)) = minimum {
            minimums.push(FeederMinimum {
                feeder,
                bus: top.buses[bus].name.clone(),
                min_voltage_pu: pu,
            });
        }
    }
    minimums
}
