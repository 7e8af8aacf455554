//! Source-support analysis.
//!
//! Determines, per phase, which buses are still energized from the source:
//! a depth-first traversal over the connectivity matrix in which lines,
//! fuses and transformers conduct while closed and switches conduct only
//! while closed. Fully recomputed on every call; the flags are derived data,
//! never authoritative.

use bitvec::prelude::*;
use ndarray::Array2;

use crate::topology::Topology;
use crate::types::*;

/// Per-bus, per-phase support flags produced by [`compute`].
#[derive(Clone, Debug, PartialEq)]
pub struct SupportFlags {
    flags: Array2<bool>,
}

impl SupportFlags {
    pub fn is_supported(&self, bus: BusIndex, phase: usize) -> bool {
        self.flags[(bus, phase)]
    }

    /// True if every present phase of the bus is supported.
    pub fn bus_supported(&self, top: &Topology, bus: BusIndex) -> bool {
        (0..PHASE_COUNT).all(|p| !top.buses[bus].phases[p] || self.flags[(bus, p)])
    }

    /// Buses with at least one present phase lacking support, ascending.
    pub fn unsupported_buses(&self, top: &Topology) -> Vec<BusIndex> {
        (0..top.bus_count())
            .filter(|&b| !self.bus_supported(top, b))
            .collect()
    }
}

/// Computes support flags for the current topology.
///
/// All flags are re-zeroed before traversal; the source bus is always
/// supported on its present phases. Total over any topology, including
/// disconnected graphs, and idempotent while the topology is unchanged.
pub fn compute(top: &Topology) -> SupportFlags {
    let n = top.bus_count();
    let mut flags = Array2::from_elem((n, PHASE_COUNT), false);
    for phase in 0..PHASE_COUNT {
        if !top.buses[top.source].phases[phase] {
            continue;
        }
        let mut visited = bitvec![0; n];
        visited.set(top.source, true);
        flags[(top.source, phase)] = true;
        depth_first(top, top.source, &mut visited, |branch| {
            top.branches[branch].conducts(phase)
        })
        .for_each(|bus| flags[(bus, phase)] = true);
    }
    SupportFlags { flags }
}

/// Computes support flags together with the spanning parents of the
/// traversal: for each bus reached on any phase, the bus it was first
/// discovered from. Used by the restoration engine to walk from a tie switch
/// back toward a fault, and to populate the public tree view.
pub fn compute_with_parents(top: &Topology) -> (SupportFlags, Vec<Option<BusIndex>>) {
    let flags = compute(top);
    let n = top.bus_count();
    let mut parents: Vec<Option<BusIndex>> = vec![None; n];
    let mut visited = bitvec![0; n];
    visited.set(top.source, true);
    // Same traversal as the per-phase passes, gated on any conducting phase,
    // so parent order matches discovery order.
    let mut stack: Vec<(BusIndex, usize)> = vec![(top.source, 0)];
    while let Some(&mut (bus, ref mut next)) = stack.last_mut() {
        let links = top.links_of(bus);
        if *next >= links.len() {
            stack.pop();
            continue;
        }
        let branch = links[*next];
        *next += 1;
        if !(0..PHASE_COUNT).any(|p| top.branches[branch].conducts(p)) {
            continue;
        }
        let other = top.branches[branch].other_end(bus);
        if !visited[other] {
            visited.set(other, true);
            parents[other] = Some(bus);
            stack.push((other, 0));
        }
    }
    (flags, parents)
}

/// Writes the parent/child tree view onto the topology's buses, for
/// downstream consumers that want a rooted view of the network.
pub fn populate_tree(top: &mut Topology) {
    let (_, parents) = compute_with_parents(top);
    for bus in 0..top.bus_count() {
        top.buses[bus].parent = parents[bus];
        top.buses[bus].children.clear();
    }
    for bus in 0..top.bus_count() {
        if let Some(parent) = parents[bus] {
            top.buses[parent].children.push(bus);
        }
    }
}

/// Iterative depth-first traversal from `start` over branches accepted by
/// `conducts`, yielding each newly discovered bus. Neighbor order is the
/// branch-table order of each bus, matching what natural recursion would
/// visit; the explicit stack keeps large networks off the call stack.
fn depth_first<'a, F>(
    top: &'a Topology,
    start: BusIndex,
    visited: &'a mut BitVec,
    conducts: F,
) -> impl Iterator<Item = BusIndex> + 'a
where
    F: Fn(BranchIndex) -> bool + 'a,
{
    let mut stack: Vec<(BusIndex, usize)> = vec![(start, 0)];
    std::iter::from_fn(move || {
        while let Some(&mut (bus, ref mut next)) = stack.last_mut() {
            let links = top.links_of(bus);
            if *next >= links.len() {
                stack.pop();
                continue;
            }
            let branch = links[*next];
            *next += 1;
            if !conducts(branch) {
                continue;
            }
            let other = top.branches[branch].other_end(bus);
            if !visited[other] {
                visited.set(other, true);
                stack.push((other, 0));
                return Some(other);
            }
        }
        None
    })
}
