//! Feeder partitioning and switch classification.
//!
//! Segments the network into independent feeders rooted at the buses
//! directly linked to the source, and classifies every switch as a tie
//! (joining two feeders) or sectionalizing (internal to one feeder) switch
//! based on the resulting per-bus feeder ids.

use bitvec::prelude::*;

use crate::topology::{LinkStatus, Topology};
use crate::types::*;

/// Role of a switch with respect to the feeder partition.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SwitchRole {
    /// Normally-open switch whose closure can join two feeders.
    Tie,
    /// Normally-closed switch internal to one feeder.
    Sectionalizing,
}

/// Result of a partitioning pass. Recomputed in full each time; feeder ids
/// have no identity across passes.
#[derive(Clone, Debug)]
pub struct FeederPartition {
    /// Feeder id per bus; [`UNASSIGNED`] for the source bus and for any bus
    /// unreachable from every feeder head.
    pub feeder_of: Vec<FeederId>,
    /// Number of feeders found.
    pub count: usize,
}

impl FeederPartition {
    /// Classifies the switch at `branch`, or returns `None` for non-switch
    /// branches. A switch whose endpoints sit in different feeders, or with
    /// an unassigned endpoint, is a tie; one internal to a feeder is
    /// sectionalizing.
    pub fn classify(&self, top: &Topology, branch: BranchIndex) -> Option<SwitchRole> {
        let b = &top.branches[branch];
        if !b.is_switch() {
            return None;
        }
        let (fa, fb) = (self.feeder_of[b.from], self.feeder_of[b.to]);
        if fa == UNASSIGNED || fb == UNASSIGNED || fa != fb {
            Some(SwitchRole::Tie)
        } else {
            Some(SwitchRole::Sectionalizing)
        }
    }

    /// Feeder ids of a branch's endpoints.
    pub fn endpoints_of(&self, top: &Topology, branch: BranchIndex) -> [FeederId; 2] {
        let b = &top.branches[branch];
        [self.feeder_of[b.from], self.feeder_of[b.to]]
    }

    /// True if two branches have a (real) feeder id in common between their
    /// endpoint feeders.
    pub fn feeders_overlap(&self, top: &Topology, a: BranchIndex, b: BranchIndex) -> bool {
        let fa = self.endpoints_of(top, a);
        let fb = self.endpoints_of(top, b);
        fa.iter()
            .any(|f| *f != UNASSIGNED && fb.contains(f))
    }
}

/// Partitions the network into feeders.
///
/// Each bus directly linked to the source is a feeder head. Source-incident
/// links are skipped during traversal, which is equivalent to temporarily
/// removing them and restoring them afterwards. One depth-first pass per
/// unassigned head assigns a fresh feeder id to every bus reached; switch
/// traversal is gated on the closed state while every other link kind is
/// traversed regardless of status, so the partition reflects network
/// structure rather than the present fault state.
pub fn partition(top: &Topology) -> FeederPartition {
    let n = top.bus_count();
    let mut feeder_of: Vec<FeederId> = vec![UNASSIGNED; n];
    let mut count: usize = 0;

    let heads: Vec<BusIndex> = top
        .links_of(top.source)
        .iter()
        .map(|&b| top.branches[b].other_end(top.source))
        .collect();

    for head in heads {
        if feeder_of[head] != UNASSIGNED {
            continue;
        }
        let id = count as FeederId;
        count += 1;
        let mut visited = bitvec![0; n];
        visited.set(top.source, true); // never cross back into the source
        visited.set(head, true);
        feeder_of[head] = id;
        let mut stack: Vec<(BusIndex, usize)> = vec![(head, 0)];
        while let Some(&mut (bus, ref mut next)) = stack.last_mut() {
            let links = top.links_of(bus);
            if *next >= links.len() {
                stack.pop();
                continue;
            }
            let branch = &top.branches[links[*next]];
            *next += 1;
            if branch.other_end(bus) == top.source {
                continue;
            }
            if branch.is_switch() && branch.status != LinkStatus::Closed {
                continue;
            }
            let other = branch.other_end(bus);
            if !visited[other] {
                visited.set(other, true);
                feeder_of[other] = id;
                stack.push((other, 0));
            }
        }
    }

    FeederPartition { feeder_of, count }
}
