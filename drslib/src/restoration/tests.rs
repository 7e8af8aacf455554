use ndarray::Array2;

use super::search::{PlanQueue, SearchContext};
use super::*;
use crate::feeders;
use crate::solver::{NetworkSolver, SolverError, SolverOutput};
use crate::support;
use crate::topology::tests::{branch, bus};
use crate::topology::{LinkKind, LinkStatus, Topology};
use crate::types::*;
use crate::RestoreFailure;

/// Solver double: every supported phase lands on the same per-unit voltage,
/// all currents zero.
struct FlatSolver {
    pu: f64,
}

impl NetworkSolver for FlatSolver {
    fn solve(
        &mut self,
        top: &Topology,
        _iteration_limit: usize,
    ) -> Result<SolverOutput, SolverError> {
        let flags = support::compute(top);
        let mut voltages = Array2::<f64>::zeros((top.bus_count(), PHASE_COUNT));
        for b in 0..top.bus_count() {
            for p in 0..PHASE_COUNT {
                if flags.is_supported(b, p) {
                    voltages[(b, p)] = self.pu * top.buses[b].nominal_voltage;
                }
            }
        }
        Ok(SolverOutput {
            iterations: 1,
            bus_voltages: voltages,
            branch_currents: Array2::zeros((top.branch_count(), PHASE_COUNT)),
        })
    }
}

/// Solver double that never converges.
struct FailingSolver;

impl NetworkSolver for FailingSolver {
    fn solve(
        &mut self,
        _top: &Topology,
        iteration_limit: usize,
    ) -> Result<SolverOutput, SolverError> {
        Err(SolverError::DidNotConverge {
            iterations: iteration_limit.max(1),
        })
    }
}

/// Radial feeder of five buses plus a neighboring two-bus feeder, joined by
/// one normally-open tie at the far end:
///
/// ```text
/// src -1-2-[sw23]-3-4-5        feeder A
///  \                  :
///   6-------7......(tie)       feeder B
/// ```
fn two_feeder_network() -> Topology {
    let buses = vec![
        bus("src"),
        bus("a1"),
        bus("a2"),
        bus("a3"),
        bus("a4"),
        bus("a5"),
        bus("b1"),
        bus("b2"),
    ];
    let mut tie = branch("tie", 5, 7, LinkKind::Switch);
    tie.status = LinkStatus::Open;
    let branches = vec![
        branch("fdr-a", 0, 1, LinkKind::Line),
        branch("a12", 1, 2, LinkKind::Line),
        branch("sw23", 2, 3, LinkKind::Switch),
        branch("a34", 3, 4, LinkKind::Line),
        branch("a45", 4, 5, LinkKind::Line),
        branch("fdr-b", 0, 6, LinkKind::Line),
        branch("b67", 6, 7, LinkKind::Line),
        tie,
    ];
    Topology::new(buses, branches, 0).unwrap()
}

const SW23: usize = 2;
const TIE: usize = 7;

#[test]
fn healthy_network_stays_idle() {
    let mut top = two_feeder_network();
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FlatSolver { pu: 1.0 }, &top).unwrap();
    let outcome = engine.run_timestep(&mut top, 1, None).unwrap();
    assert!(matches!(outcome, TimestepOutcome::Idle));
    assert_eq!(engine.state(), ControllerState::Idle);
    assert_eq!(engine.counters().attempts, 0);
}

#[test]
fn single_tie_restores_isolated_tail() {
    let mut top = two_feeder_network();
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FlatSolver { pu: 1.0 }, &top).unwrap();

    // Fault trips the sectionalizer open, de-energizing buses a3..a5.
    top.set_status(SW23, LinkStatus::Open);
    let outcome = engine.run_timestep(&mut top, 7, Some(SW23)).unwrap();

    let report = match outcome {
        TimestepOutcome::Restored(report) => report,
        other => panic!("expected restoration, got {:?}", other),
    };
    assert_eq!(engine.state(), ControllerState::Restored);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.plan.len(), 1);
    assert_eq!(report.plan[0].name, "tie");
    assert_eq!(report.plan[0].status, LinkStatus::Closed);
    assert_eq!(top.branches[TIE].status, LinkStatus::Closed);
    // Both feeders held nominal voltage in the accepted solution.
    assert_eq!(report.feeder_minimums.len(), 2);
    for minimum in &report.feeder_minimums {
        assert!((minimum.min_voltage_pu - 1.0).abs() < 1e-9);
    }
    // The whole network is supported again.
    let flags = support::compute(&top);
    assert!(flags.unsupported_buses(&top).is_empty());
}

#[test]
fn undervoltage_neighbor_exhausts_the_search() {
    let mut top = two_feeder_network();
    // The only tie leads to a feeder that sags to 0.90 pu, below the 0.927
    // lower bound.
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FlatSolver { pu: 0.90 }, &top).unwrap();

    top.set_status(SW23, LinkStatus::Open);
    let failure = engine.run_timestep(&mut top, 7, Some(SW23)).unwrap_err();

    assert_eq!(failure, RestoreFailure::Exhausted { attempts: 1 });
    assert_eq!(engine.state(), ControllerState::Exhausted);
    assert_eq!(engine.counters().limit_exceeded, 1);
    // The rejected closure was rolled back.
    assert_eq!(top.branches[TIE].status, LinkStatus::Open);
}

#[test]
fn no_reachable_tie_is_unrestorable_without_spending_attempts() {
    // Same feeder, but no tie switch exists anywhere.
    let buses = vec![bus("src"), bus("a1"), bus("a2"), bus("a3")];
    let branches = vec![
        branch("fdr-a", 0, 1, LinkKind::Line),
        branch("sw12", 1, 2, LinkKind::Switch),
        branch("a23", 2, 3, LinkKind::Line),
    ];
    let mut top = Topology::new(buses, branches, 0).unwrap();
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FlatSolver { pu: 1.0 }, &top).unwrap();

    top.set_status(1, LinkStatus::Open);
    let failure = engine.run_timestep(&mut top, 1, Some(1)).unwrap_err();

    assert_eq!(failure, RestoreFailure::Unrestorable);
    assert_eq!(engine.counters().attempts, 0);
}

#[test]
fn zero_attempt_budget_is_fatal_at_construction() {
    let top = two_feeder_network();
    let config = RestorationConfig {
        reconfig_attempts: 0,
        ..RestorationConfig::default()
    };
    let result = RestorationEngine::new(config, FlatSolver { pu: 1.0 }, &top);
    assert!(matches!(result, Err(RestoreFailure::BadInput(_))));
}

#[test]
fn rejected_trials_revert_every_switch() {
    let mut top = two_feeder_network();
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FailingSolver, &top).unwrap();

    top.set_status(SW23, LinkStatus::Open);
    let before = top.protection_states();
    let failure = engine.run_timestep(&mut top, 1, Some(SW23)).unwrap_err();

    assert!(matches!(failure, RestoreFailure::Exhausted { .. }));
    assert_eq!(top.protection_states(), before);
    assert_eq!(
        engine.counters().solver_failed,
        engine.counters().attempts
    );
}

#[test]
fn attempt_budget_caps_trials() {
    let mut top = three_feeder_network();
    let config = RestorationConfig {
        reconfig_attempts: 2,
        ..RestorationConfig::default()
    };
    let mut engine = RestorationEngine::new(config, FailingSolver, &top).unwrap();

    top.set_status(0, LinkStatus::Open);
    let failure = engine.run_timestep(&mut top, 1, Some(0)).unwrap_err();

    // Three candidates exist but only two may be tried.
    assert_eq!(failure, RestoreFailure::Exhausted { attempts: 2 });
    assert_eq!(engine.counters().attempts, 2);
}

/// One dead feeder with ties into two healthy neighbors:
///
/// ```text
/// src -1-2   feeder A (trips at the head)
///   \    :\
///    3-4 : (tie-ab)
///     \  :.(tie-ac)
///      5-6
/// ```
fn three_feeder_network() -> Topology {
    let buses = vec![
        bus("src"),
        bus("a1"),
        bus("a2"),
        bus("b1"),
        bus("b2"),
        bus("c1"),
        bus("c2"),
    ];
    let mut tie_ab = branch("tie-ab", 2, 4, LinkKind::Switch);
    tie_ab.status = LinkStatus::Open;
    let mut tie_ac = branch("tie-ac", 2, 6, LinkKind::Switch);
    tie_ac.status = LinkStatus::Open;
    let branches = vec![
        branch("fdr-a", 0, 1, LinkKind::Line),
        branch("a12", 1, 2, LinkKind::Line),
        branch("fdr-b", 0, 3, LinkKind::Line),
        branch("b34", 3, 4, LinkKind::Line),
        branch("fdr-c", 0, 5, LinkKind::Line),
        branch("c56", 5, 6, LinkKind::Line),
        tie_ab,
        tie_ac,
    ];
    Topology::new(buses, branches, 0).unwrap()
}

#[test]
fn plans_come_out_in_nondecreasing_operation_count() {
    let mut top = three_feeder_network();
    top.set_status(0, LinkStatus::Open);

    let (flags, parents) = support::compute_with_parents(&top);
    let unsupported = flags.unsupported_buses(&top);
    assert_eq!(unsupported, vec![1, 2]);
    let partition = feeders::partition(&top);
    let ctx = SearchContext {
        top: &top,
        partition: &partition,
        support: &flags,
        unsupported: &unsupported,
        parents: &parents,
        faulted: Some(0),
    };

    let mut queue = PlanQueue::new(&ctx, 3).unwrap();
    assert_eq!(queue.candidate_tie_count(), 2);
    let mut plans = Vec::new();
    while let Some(plan) = queue.next_plan(&ctx).unwrap() {
        plans.push(plan);
    }

    let ops: Vec<usize> = plans.iter().map(|p| p.op_count()).collect();
    assert_eq!(ops, vec![1, 1, 2]);
    assert!(ops.windows(2).all(|w| w[0] <= w[1]));
    // Discovery order inside each level: tie-ab before tie-ac.
    assert_eq!(plans[0].actions, vec![PlanAction::close(6)]);
    assert_eq!(plans[1].actions, vec![PlanAction::close(7)]);
    assert_eq!(
        plans[2].actions,
        vec![PlanAction::close(6), PlanAction::close(7)]
    );
}

/// A fault on a line cleared by an upstream fuse: the faulted branch itself
/// is still conducting, so restoring through the tie requires opening the
/// sectionalizer between the tie and the fault.
///
/// ```text
/// src -1-[fuse12]-2-3-[sw34]-4      feeder A, fault on line 2-3
///   \                        :
///    5----6...............(tie)     feeder B
/// ```
#[test]
fn still_conducting_fault_is_excised_not_reenergized() {
    let buses = vec![
        bus("src"),
        bus("a1"),
        bus("a2"),
        bus("a3"),
        bus("a4"),
        bus("b1"),
        bus("b2"),
    ];
    let mut tie = branch("tie", 4, 6, LinkKind::Switch);
    tie.status = LinkStatus::Open;
    let branches = vec![
        branch("fdr-a", 0, 1, LinkKind::Line),
        branch("fuse12", 1, 2, LinkKind::Fuse),
        branch("l23", 2, 3, LinkKind::Line),
        branch("sw34", 3, 4, LinkKind::Switch),
        branch("fdr-b", 0, 5, LinkKind::Line),
        branch("b56", 5, 6, LinkKind::Line),
        tie,
    ];
    let mut top = Topology::new(buses, branches, 0).unwrap();
    let mut engine =
        RestorationEngine::new(RestorationConfig::default(), FlatSolver { pu: 1.0 }, &top).unwrap();

    // Prime the engine's healthy-tree view, then blow the fuse; the faulted
    // line l23 stays closed.
    engine.run_timestep(&mut top, 1, None).unwrap();
    top.set_status(1, LinkStatus::Open);
    let outcome = engine.run_timestep(&mut top, 1, Some(2)).unwrap();

    let report = match outcome {
        TimestepOutcome::Restored(report) => report,
        other => panic!("expected restoration, got {:?}", other),
    };
    // No single-operation plan is acceptable; the accepted plan closes the
    // tie and opens sw34 to excise the faulted section.
    assert_eq!(report.plan.len(), 2);
    assert_eq!(report.plan[0].name, "tie");
    assert_eq!(report.plan[0].status, LinkStatus::Closed);
    assert_eq!(report.plan[1].name, "sw34");
    assert_eq!(report.plan[1].status, LinkStatus::Open);

    // Bus a4 is back, the excised section around the fault stays dead and
    // is reported as deliberately isolated.
    let flags = support::compute(&top);
    assert!(flags.bus_supported(&top, 4));
    assert!(!flags.bus_supported(&top, 2));
    assert!(!flags.bus_supported(&top, 3));
    assert_eq!(report.isolated, vec!["a2".to_string(), "a3".to_string()]);

    // The isolated section does not re-trigger the search next timestep.
    let outcome = engine.run_timestep(&mut top, 1, None).unwrap();
    assert!(matches!(outcome, TimestepOutcome::Idle));
}

#[test]
fn feeder_power_cap_rejects_overloaded_transfer() {
    use crate::solver::sweep::SweepSolver;

    let mut top = two_feeder_network();
    for b in 1..top.bus_count() {
        top.buses[b].load = [12_000.0; PHASE_COUNT];
    }
    // Feeder B may carry 100 kVA; picking up the dead tail would put about
    // 180 kVA through its head.
    let config = RestorationConfig {
        feeder_power_limits: Some(vec![1.0e9, 100_000.0]),
        ..RestorationConfig::default()
    };
    let mut engine = RestorationEngine::new(config, SweepSolver::default(), &top).unwrap();

    top.set_status(SW23, LinkStatus::Open);
    let failure = engine.run_timestep(&mut top, 7, Some(SW23)).unwrap_err();

    assert_eq!(failure, RestoreFailure::Exhausted { attempts: 1 });
    assert_eq!(engine.counters().limit_exceeded, 1);
    assert_eq!(top.branches[TIE].status, LinkStatus::Open);
}

#[test]
fn feeder_power_limit_count_is_checked() {
    let top = two_feeder_network();
    let config = RestorationConfig {
        feeder_power_limits: Some(vec![1.0e6]),
        ..RestorationConfig::default()
    };
    let result = RestorationEngine::new(config, FlatSolver { pu: 1.0 }, &top);
    assert!(matches!(result, Err(RestoreFailure::BadInput(_))));
}

mod randomized {
    use super::*;
    use rand::prelude::*;
    use rand::rngs::StdRng;

    /// Random connected topology: a spanning tree plus a few extra links,
    /// with random kinds and switch states.
    fn random_topology(rng: &mut StdRng) -> Topology {
        let n = 12;
        let buses = (0..n).map(|i| bus(&format!("n{}", i))).collect();
        let mut branches = Vec::new();
        let mut taken = std::collections::HashSet::new();
        let add = |branches: &mut Vec<_>, rng: &mut StdRng, a: usize, b: usize| {
            let kind = match rng.gen_range(0..4) {
                0 => LinkKind::Line,
                1 => LinkKind::Fuse,
                2 => LinkKind::Switch,
                _ => LinkKind::Transformer,
            };
            let mut br = branch(&format!("br{}", branches.len()), a, b, kind);
            if rng.gen_bool(0.3) {
                br.status = LinkStatus::Open;
            }
            branches.push(br);
        };
        for i in 1..n {
            let parent = rng.gen_range(0..i);
            taken.insert((parent.min(i), parent.max(i)));
            add(&mut branches, rng, parent, i);
        }
        for _ in 0..6 {
            let a = rng.gen_range(0..n);
            let b = rng.gen_range(0..n);
            if a == b || !taken.insert((a.min(b), a.max(b))) {
                continue;
            }
            add(&mut branches, rng, a, b);
        }
        Topology::new(buses, branches, 0).unwrap()
    }

    /// Ground-truth reachability: relax until fixpoint over conducting
    /// branches.
    fn brute_force_support(top: &Topology, phase: usize) -> Vec<bool> {
        let mut supported = vec![false; top.bus_count()];
        supported[top.source] = top.buses[top.source].phases[phase];
        loop {
            let mut changed = false;
            for branch in top.branches.iter() {
                if !branch.conducts(phase) {
                    continue;
                }
                if supported[branch.from] != supported[branch.to] {
                    supported[branch.from] = true;
                    supported[branch.to] = true;
                    changed = true;
                }
            }
            if !changed {
                return supported;
            }
        }
    }

    #[test]
    fn support_matches_brute_force_reachability() {
        let mut rng = StdRng::seed_from_u64(22);
        for _ in 0..50 {
            let top = random_topology(&mut rng);
            let flags = support::compute(&top);
            for phase in 0..PHASE_COUNT {
                let expected = brute_force_support(&top, phase);
                for b in 0..top.bus_count() {
                    assert_eq!(
                        flags.is_supported(b, phase),
                        expected[b],
                        "bus {} phase {} disagrees with the oracle",
                        b,
                        phase
                    );
                }
            }
        }
    }

    #[test]
    fn partition_respects_structural_connectivity() {
        use crate::feeders::SwitchRole;
        let mut rng = StdRng::seed_from_u64(33);
        for _ in 0..50 {
            let top = random_topology(&mut rng);
            let partition = feeders::partition(&top);
            for (i, branch) in top.branches.iter().enumerate() {
                if branch.from == top.source || branch.to == top.source {
                    continue;
                }
                let same = partition.feeder_of[branch.from] == partition.feeder_of[branch.to];
                if !branch.is_switch() || branch.is_closed() {
                    // Non-switch links bind regardless of status; closed
                    // switches bind too.
                    assert!(same, "branch {} should join one feeder", i);
                }
                if branch.is_switch() {
                    let expected = if same
                        && partition.feeder_of[branch.from] != UNASSIGNED
                    {
                        SwitchRole::Sectionalizing
                    } else {
                        SwitchRole::Tie
                    };
                    assert_eq!(partition.classify(&top, i), Some(expected));
                }
            }
        }
    }
}
