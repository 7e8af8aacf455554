//! Iterative current-summation / voltage-drop solver for radial networks.
//!
//! A stand-in for a full Newton-Raphson powerflow with the same observable
//! contract: backward sweep accumulating load currents toward the source,
//! forward sweep applying series voltage drops, repeated until the largest
//! per-unit voltage change falls under tolerance. Works per phase on the
//! energized subtree; a conducting loop or a voltage collapse is reported as
//! a solve failure rather than a wrong answer.

use bitvec::prelude::*;
use ndarray::Array2;

use super::{NetworkSolver, SolverError, SolverOutput};
use crate::support;
use crate::topology::Topology;
use crate::types::*;

/// Voltage floor (per-unit) below which the load-current model is considered
/// collapsed and the solve abandoned.
const COLLAPSE_FLOOR: f64 = 0.2;

pub struct SweepSolver {
    /// Convergence tolerance on per-unit voltage change between sweeps.
    pub tolerance: f64,
    /// Iteration ceiling used when the caller passes zero.
    pub default_iteration_limit: usize,
}

impl Default for SweepSolver {
    fn default() -> Self {
        SweepSolver {
            tolerance: 1e-6,
            default_iteration_limit: 50,
        }
    }
}

/// Rooted view of the energized subgraph: discovery order, parents and the
/// branch each bus hangs from.
struct EnergizedTree {
    order: Vec<BusIndex>,
    parent: Vec<Option<BusIndex>>,
    parent_branch: Vec<Option<BranchIndex>>,
}

impl EnergizedTree {
    /// Depth-first tree over conducting branches. Returns `NonRadial` if a
    /// conducting branch closes a loop among energized buses.
    fn build(top: &Topology) -> Result<EnergizedTree, SolverError> {
        let n = top.bus_count();
        let mut order = Vec::with_capacity(n);
        let mut parent: Vec<Option<BusIndex>> = vec![None; n];
        let mut parent_branch: Vec<Option<BranchIndex>> = vec![None; n];
        let mut visited = bitvec![0; n];
        visited.set(top.source, true);
        order.push(top.source);
        let mut stack: Vec<(BusIndex, usize)> = vec![(top.source, 0)];
        while let Some(&mut (bus, ref mut next)) = stack.last_mut() {
            let links = top.links_of(bus);
            if *next >= links.len() {
                stack.pop();
                continue;
            }
            let branch_idx = links[*next];
            *next += 1;
            let branch = &top.branches[branch_idx];
            if !(0..PHASE_COUNT).any(|p| branch.conducts(p)) {
                continue;
            }
            let other = branch.other_end(bus);
            if visited[other] {
                if parent_branch[bus] != Some(branch_idx) && parent_branch[other] != Some(branch_idx)
                {
                    return Err(SolverError::NonRadial);
                }
                continue;
            }
            visited.set(other, true);
            parent[other] = Some(bus);
            parent_branch[other] = Some(branch_idx);
            order.push(other);
            stack.push((other, 0));
        }
        Ok(EnergizedTree {
            order,
            parent,
            parent_branch,
        })
    }
}

impl NetworkSolver for SweepSolver {
    fn solve(
        &mut self,
        top: &Topology,
        iteration_limit: usize,
    ) -> Result<SolverOutput, SolverError> {
        let limit = if iteration_limit == 0 {
            self.default_iteration_limit
        } else {
            iteration_limit
        };
        let n = top.bus_count();
        let flags = support::compute(top);
        let tree = EnergizedTree::build(top)?;

        let mut voltages = Array2::<f64>::zeros((n, PHASE_COUNT));
        let mut currents = Array2::<f64>::zeros((top.branch_count(), PHASE_COUNT));
        let mut total_iterations = 0;

        for phase in 0..PHASE_COUNT {
            // Per-unit voltage estimates; start flat at nominal.
            let mut v: Vec<f64> = (0..n)
                .map(|b| {
                    if flags.is_supported(b, phase) {
                        1.0
                    } else {
                        0.0
                    }
                })
                .collect();
            let mut branch_current: Vec<f64> = vec![0.0; top.branch_count()];
            let mut converged = false;

            for iteration in 1..=limit {
                // Backward: accumulate load currents from the leaves up.
                let mut accumulated: Vec<f64> = vec![0.0; n];
                for &bus in tree.order.iter().rev() {
                    if !flags.is_supported(bus, phase) {
                        continue;
                    }
                    if v[bus] < COLLAPSE_FLOOR {
                        return Err(SolverError::Singular(format!(
                            "Voltage collapse at bus {}",
                            top.buses[bus].name
                        )));
                    }
                    let injection =
                        top.buses[bus].load[phase] / (v[bus] * top.buses[bus].nominal_voltage);
                    accumulated[bus] += injection;
                    if let (Some(parent), Some(pb)) = (tree.parent[bus], tree.parent_branch[bus]) {
                        if top.branches[pb].conducts(phase) {
                            branch_current[pb] = accumulated[bus];
                            accumulated[parent] += accumulated[bus];
                        }
                    }
                }
                // Forward: apply series drops from the source down.
                let mut delta: f64 = 0.0;
                for &bus in tree.order.iter() {
                    if bus == top.source || !flags.is_supported(bus, phase) {
                        continue;
                    }
                    let (parent, pb) = match (tree.parent[bus], tree.parent_branch[bus]) {
                        (Some(p), Some(pb)) => (p, pb),
                        _ => continue,
                    };
                    if !top.branches[pb].conducts(phase) {
                        continue;
                    }
                    let drop_pu = branch_current[pb] * top.branches[pb].resistance[phase]
                        / top.buses[bus].nominal_voltage;
                    let updated = v[parent] - drop_pu;
                    delta = delta.max((updated - v[bus]).abs());
                    v[bus] = updated;
                }
                total_iterations = total_iterations.max(iteration);
                if delta < self.tolerance {
                    converged = true;
                    break;
                }
            }
            if !converged {
                return Err(SolverError::DidNotConverge { iterations: limit });
            }
            for bus in 0..n {
                voltages[(bus, phase)] = v[bus] * top.buses[bus].nominal_voltage;
            }
            for branch in 0..top.branch_count() {
                currents[(branch, phase)] = branch_current[branch];
            }
        }

        Ok(SolverOutput {
            iterations: total_iterations,
            bus_voltages: voltages,
            branch_currents: currents,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::tests::{branch, bus};
    use crate::topology::{LinkKind, LinkStatus};

    fn loaded_feeder() -> Topology {
        let mut buses = vec![bus("src"), bus("n1"), bus("n2")];
        buses[1].load = [12_000.0; PHASE_COUNT];
        buses[2].load = [12_000.0; PHASE_COUNT];
        let mut l01 = branch("l01", 0, 1, LinkKind::Line);
        l01.resistance = [0.5; PHASE_COUNT];
        let mut l12 = branch("l12", 1, 2, LinkKind::Line);
        l12.resistance = [0.5; PHASE_COUNT];
        Topology::new(buses, vec![l01, l12], 0).unwrap()
    }

    #[test]
    fn flat_voltage_without_load() {
        let buses = vec![bus("src"), bus("n1")];
        let top = Topology::new(buses, vec![branch("l01", 0, 1, LinkKind::Line)], 0).unwrap();
        let out = SweepSolver::default().solve(&top, 0).unwrap();
        assert_eq!(out.per_unit(&top, 1, 0), 1.0);
        assert_eq!(out.branch_currents[(0, 0)], 0.0);
    }

    #[test]
    fn voltage_drops_along_loaded_feeder() {
        let top = loaded_feeder();
        let out = SweepSolver::default().solve(&top, 0).unwrap();
        let v1 = out.per_unit(&top, 1, 0);
        let v2 = out.per_unit(&top, 2, 0);
        assert!(v1 < 1.0);
        assert!(v2 < v1);
        assert!(v2 > 0.9, "unexpected collapse: {}", v2);
        // Head branch carries both loads, tail branch only the far one.
        assert!(out.branch_currents[(0, 0)] > out.branch_currents[(1, 0)]);
    }

    #[test]
    fn dead_buses_read_zero() {
        let mut top = loaded_feeder();
        top.set_status(1, LinkStatus::Open);
        let out = SweepSolver::default().solve(&top, 0).unwrap();
        assert_eq!(out.bus_voltages[(2, 0)], 0.0);
        assert_eq!(out.branch_currents[(1, 0)], 0.0);
    }

    #[test]
    fn conducting_loop_is_rejected() {
        let buses = vec![bus("src"), bus("n1"), bus("n2")];
        let branches = vec![
            branch("l01", 0, 1, LinkKind::Line),
            branch("l12", 1, 2, LinkKind::Line),
            branch("l20", 2, 0, LinkKind::Line),
        ];
        let top = Topology::new(buses, branches, 0).unwrap();
        assert_eq!(
            SweepSolver::default().solve(&top, 0),
            Err(SolverError::NonRadial)
        );
    }

    #[test]
    fn iteration_ceiling_reported() {
        let mut top = loaded_feeder();
        top.buses[2].load = [400_000.0; PHASE_COUNT];
        let result = SweepSolver::default().solve(&top, 3);
        assert!(matches!(
            result,
            Err(SolverError::DidNotConverge { iterations: 3 }) | Err(SolverError::Singular(_))
        ));
    }
}
