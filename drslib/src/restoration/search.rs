//! Candidate plan enumeration.
//!
//! Plans are produced level by level in increasing operation count; inside a
//! level, switch-discovery (branch table) order. The first candidate the
//! validator accepts wins, so enumeration order is part of the contract.

use std::collections::VecDeque;

use itertools::Itertools;

use super::{CandidatePlan, PlanAction};
use crate::feeders::{FeederPartition, SwitchRole};
use crate::support::SupportFlags;
use crate::topology::{LinkStatus, Topology};
use crate::types::*;
use crate::RestoreFailure;

/// Inputs the search reads while enumerating. All borrowed; the topology
/// must be in its pre-trial state whenever the queue is advanced.
pub struct SearchContext<'a> {
    pub top: &'a Topology,
    pub partition: &'a FeederPartition,
    pub support: &'a SupportFlags,
    /// Buses lacking support, ascending.
    pub unsupported: &'a [BusIndex],
    /// Last-healthy spanning parents; stale entries for dead buses point the
    /// way back toward the fault.
    pub parents: &'a [Option<BusIndex>],
    /// The branch carrying the fault this timestep, when known.
    pub faulted: Option<BranchIndex>,
}

impl<'a> SearchContext<'a> {
    fn is_dead(&self, bus: BusIndex) -> bool {
        !self.support.bus_supported(self.top, bus)
    }
}

/// Lazily enumerated queue of candidate plans. Finite and not restartable:
/// once a level is consumed its candidates are gone.
pub struct PlanQueue {
    /// Operation count currently being emitted.
    level: usize,
    /// Ceiling on plan operation count.
    max_ops: usize,
    /// Candidates of the current level, in discovery order.
    pending: VecDeque<CandidatePlan>,
    /// All open tie switches, branch-table order.
    ties: Vec<BranchIndex>,
    /// Ties with an endpoint in or adjacent to the de-energized region.
    candidate_ties: Vec<BranchIndex>,
    /// Single-tie candidates that would re-energize the fault, deferred to
    /// the next level paired with their isolating sectionalizer.
    withheld_singles: Vec<(BranchIndex, BranchIndex)>,
    /// Tie pairs deferred to level three with their isolating sectionalizer.
    withheld_pairs: Vec<(BranchIndex, BranchIndex, BranchIndex)>,
    /// Worst-case candidate count; generating past it is a hard error.
    bound: usize,
    /// Candidates generated so far, across all levels.
    generated: usize,
}

impl PlanQueue {
    /// Scans the switch population and prepares level one.
    ///
    /// Returns [`RestoreFailure::Unrestorable`] when no tie switch touches
    /// the de-energized region at all; by contract this consumes none of the
    /// caller's attempt budget.
    pub fn new(ctx: &SearchContext, max_ops: usize) -> Result<PlanQueue, RestoreFailure> {
        let mut ties = Vec::new();
        let mut secs = Vec::new();
        for (i, branch) in ctx.top.branches.iter().enumerate() {
            // The faulted section itself is never a reclose candidate.
            if ctx.faulted == Some(i) {
                continue;
            }
            match ctx.partition.classify(ctx.top, i) {
                Some(SwitchRole::Tie) if branch.status == LinkStatus::Open => ties.push(i),
                Some(SwitchRole::Sectionalizing) if branch.status == LinkStatus::Closed => {
                    secs.push(i)
                }
                _ => {}
            }
        }

        let candidate_ties: Vec<BranchIndex> = ties
            .iter()
            .copied()
            .filter(|&t| touches_region(ctx, t))
            .collect();
        if candidate_ties.is_empty() {
            return Err(RestoreFailure::Unrestorable);
        }

        let bound = ties.len() * (ties.len() + 6 * secs.len() + candidate_ties.len());

        Ok(PlanQueue {
            level: 0,
            max_ops,
            pending: VecDeque::new(),
            ties,
            candidate_ties,
            withheld_singles: Vec::new(),
            withheld_pairs: Vec::new(),
            bound,
            generated: 0,
        })
    }

    /// Number of tie switches eligible as single-operation candidates.
    pub fn candidate_tie_count(&self) -> usize {
        self.candidate_ties.len()
    }

    /// Yields the next candidate, or `None` when the enumeration is done.
    pub fn next_plan(
        &mut self,
        ctx: &SearchContext,
    ) -> Result<Option<CandidatePlan>, RestoreFailure> {
        loop {
            if let Some(plan) = self.pending.pop_front() {
                return Ok(Some(plan));
            }
            if self.level >= self.max_ops {
                return Ok(None);
            }
            self.level += 1;
            match self.level {
                1 => self.generate_singles(ctx)?,
                2 => self.generate_pairs(ctx)?,
                3 => self.generate_triples()?,
                _ => return Ok(None),
            }
        }
    }

    fn push(&mut self, actions: Vec<PlanAction>) -> Result<(), RestoreFailure> {
        if self.generated >= self.bound {
            return Err(RestoreFailure::CandidateOverflow {
                needed: self.generated + 1,
                bound: self.bound,
            });
        }
        self.generated += 1;
        self.pending.push_back(CandidatePlan { actions });
        Ok(())
    }

    /// Level one: close a single eligible tie. A tie whose closure would
    /// re-energize a still-conducting faulted branch is withheld and paired
    /// with its isolating sectionalizer at the next level, excising the
    /// faulted section instead of re-feeding it.
    fn generate_singles(&mut self, ctx: &SearchContext) -> Result<(), RestoreFailure> {
        let candidates = self.candidate_ties.clone();
        for tie in candidates {
            if fault_reenergized(ctx, tie) {
                match isolating_sectionalizer(ctx, tie) {
                    Some(sec) => self.withheld_singles.push((tie, sec)),
                    None => log::debug!(
                        "Tie {} cannot isolate the fault; dropped",
                        ctx.top.branches[tie].name
                    ),
                }
            } else {
                self.push(vec![PlanAction::close(tie)])?;
            }
        }
        Ok(())
    }

    /// Level two: first the withheld singles as (close tie, open sec), then
    /// every unordered pair of ties with overlapping feeders where at least
    /// one is an eligible candidate.
    fn generate_pairs(&mut self, ctx: &SearchContext) -> Result<(), RestoreFailure> {
        let withheld = std::mem::take(&mut self.withheld_singles);
        for (tie, sec) in withheld {
            self.push(vec![PlanAction::close(tie), PlanAction::open(sec)])?;
        }

        let pairs: Vec<(BranchIndex, BranchIndex)> = self
            .ties
            .iter()
            .copied()
            .tuple_combinations()
            .filter(|&(a, b)| {
                (self.candidate_ties.contains(&a) || self.candidate_ties.contains(&b))
                    && ctx.partition.feeders_overlap(ctx.top, a, b)
            })
            .collect();
        for (a, b) in pairs {
            if fault_reenergized(ctx, a) || fault_reenergized(ctx, b) {
                let sec = isolating_sectionalizer(ctx, a).or_else(|| isolating_sectionalizer(ctx, b));
                match sec {
                    Some(sec) => self.withheld_pairs.push((a, b, sec)),
                    None => log::debug!(
                        "Tie pair {}+{} cannot isolate the fault; dropped",
                        ctx.top.branches[a].name,
                        ctx.top.branches[b].name
                    ),
                }
            } else {
                self.push(vec![PlanAction::close(a), PlanAction::close(b)])?;
            }
        }
        Ok(())
    }

    /// Level three: the deferred tie pairs with their isolating open.
    fn generate_triples(&mut self) -> Result<(), RestoreFailure> {
        let withheld = std::mem::take(&mut self.withheld_pairs);
        for (a, b, sec) in withheld {
            self.push(vec![
                PlanAction::close(a),
                PlanAction::close(b),
                PlanAction::open(sec),
            ])?;
        }
        Ok(())
    }
}

/// True if the tie has an endpoint inside the de-energized region or
/// directly adjacent to it.
fn touches_region(ctx: &SearchContext, tie: BranchIndex) -> bool {
    let branch = &ctx.top.branches[tie];
    [branch.from, branch.to].into_iter().any(|end| {
        ctx.is_dead(end)
            || ctx
                .top
                .links_of(end)
                .iter()
                .any(|&b| ctx.is_dead(ctx.top.branches[b].other_end(end)))
    })
}

/// The tie endpoint inside the de-energized region, if any.
fn dead_end_of(ctx: &SearchContext, tie: BranchIndex) -> Option<BusIndex> {
    let branch = &ctx.top.branches[tie];
    [branch.from, branch.to]
        .into_iter()
        .find(|&end| ctx.is_dead(end))
}

/// Flood fill over closed branches restricted to de-energized buses,
/// starting from `start` and never crossing a branch in `blocked`. Returns a
/// per-bus membership mask.
fn dead_component(ctx: &SearchContext, start: BusIndex, blocked: &[BranchIndex]) -> Vec<bool> {
    let mut member = vec![false; ctx.top.bus_count()];
    if !ctx.is_dead(start) {
        return member;
    }
    member[start] = true;
    let mut stack = vec![start];
    while let Some(bus) = stack.pop() {
        for &b in ctx.top.links_of(bus) {
            if blocked.contains(&b) || !ctx.top.branches[b].is_closed() {
                continue;
            }
            let other = ctx.top.branches[b].other_end(bus);
            if !member[other] && ctx.is_dead(other) {
                member[other] = true;
                stack.push(other);
            }
        }
    }
    member
}

/// True if closing the tie would re-feed a faulted branch that is still
/// conducting (its protection tripped elsewhere).
fn fault_reenergized(ctx: &SearchContext, tie: BranchIndex) -> bool {
    let faulted = match ctx.faulted {
        Some(f) if ctx.top.branches[f].is_closed() => f,
        _ => return false,
    };
    let start = match dead_end_of(ctx, tie) {
        Some(bus) => bus,
        None => return false,
    };
    let component = dead_component(ctx, start, &[]);
    let branch = &ctx.top.branches[faulted];
    component[branch.from] || component[branch.to]
}

/// Walks the last-healthy parent chain from the tie's dead endpoint toward
/// the fault and returns the first closed sectionalizing switch crossed, if
/// one exists before the faulted branch itself.
fn isolating_sectionalizer(ctx: &SearchContext, tie: BranchIndex) -> Option<BranchIndex> {
    let faulted = ctx.faulted?;
    let mut bus = dead_end_of(ctx, tie)?;
    for _ in 0..ctx.top.bus_count() {
        let parent = ctx.parents[bus]?;
        let crossed = ctx.top.matrix.branch_between(bus, parent)?;
        if crossed == faulted {
            return None;
        }
        let branch = &ctx.top.branches[crossed];
        if branch.is_switch()
            && branch.is_closed()
            && ctx.partition.classify(ctx.top, crossed) == Some(SwitchRole::Sectionalizing)
        {
            return Some(crossed);
        }
        bus = parent;
    }
    None
}

/// Buses a trial must restore: the de-energized set minus any segment the
/// plan deliberately excises by opening switches around the fault.
pub fn plan_targets(ctx: &SearchContext, plan: &CandidatePlan) -> Vec<BusIndex> {
    let opens: Vec<BranchIndex> = plan
        .actions
        .iter()
        .filter(|a| a.status == LinkStatus::Open)
        .map(|a| a.branch)
        .collect();
    let faulted = match ctx.faulted {
        Some(f) if !opens.is_empty() => f,
        _ => return ctx.unsupported.to_vec(),
    };
    let branch = &ctx.top.branches[faulted];
    let mut excised = vec![false; ctx.top.bus_count()];
    for end in [branch.from, branch.to] {
        for (bus, member) in dead_component(ctx, end, &opens).into_iter().enumerate() {
            excised[bus] = excised[bus] || member;
        }
    }
    ctx.unsupported
        .iter()
        .copied()
        .filter(|&b| !excised[b])
        .collect()
}
