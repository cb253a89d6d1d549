//! Single-agent A* under per-agent constraints (spec.md C7).
//!
//! Grounded in the teacher's `solver/algorithm/astar.rs`: a `BinaryHeap` of
//! `(position, time)` nodes ordered by f then a tie-break, a closed set
//! keyed by `(position, time)`, and a `trace` map for path reconstruction.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::agent::Agent;
use crate::grid::Grid;
use crate::heuristic::sic::SicTable;
use crate::movement::Direction;
use crate::stats::Stats;

/// A constraint forbidding either a cell at a timestep (vertex) or a
/// directed edge traversal at a timestep (swap), as scoped to one agent
/// (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    Vertex {
        position: (usize, usize),
        time_step: usize,
        /// `true` for a "must stay away forever after" target constraint
        /// (spec.md §4.6 Target conflict); `false` for a single timestep.
        is_permanent: bool,
    },
    Edge {
        from_position: (usize, usize),
        to_position: (usize, usize),
        to_time_step: usize,
    },
}

impl Constraint {
    pub fn is_violated(&self, prev_position: (usize, usize), next_position: (usize, usize), time: usize) -> bool {
        match *self {
            Constraint::Vertex {
                position,
                time_step,
                is_permanent,
            } => {
                if next_position != position {
                    return false;
                }
                if is_permanent {
                    time >= time_step
                } else {
                    time == time_step
                }
            }
            Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
            } => prev_position == from_position && next_position == to_position && time == to_time_step,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
struct LowLevelNode {
    position: (usize, usize),
    f_cost: usize,
    g_cost: usize,
    time_step: usize,
}

impl Ord for LowLevelNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert f (then prefer deeper nodes, per
        // spec.md §4.1's "currentStep descending" A* tie-break) to get
        // min-f-first, then max-g-first behavior.
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| self.g_cost.cmp(&other.g_cost))
    }
}

impl PartialOrd for LowLevelNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A single agent's timed path: `positions[t]` is its cell at step `t`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedPath {
    pub positions: Vec<(usize, usize)>,
}

impl TimedPath {
    /// Sum-of-costs contribution: number of moves, i.e. `len() - 1`.
    pub fn cost(&self) -> usize {
        self.positions.len() - 1
    }
}

/// Runs A* for one agent under `constraints`, requiring the returned path to
/// be at least `min_length` long (the "must-stay-until" rule of spec.md
/// §4.4: a target constraint elsewhere may force this agent to keep
/// replanning past an early goal arrival).
#[instrument(skip_all, fields(agent = agent.agent_num))]
pub fn a_star_search(
    grid: &Grid,
    agent: &Agent,
    sic: &SicTable,
    constraints: &HashSet<Constraint>,
    min_length: usize,
    allowed_directions: usize,
    stats: &mut Stats,
) -> Option<TimedPath> {
    let constraint_limit = constraints
        .iter()
        .map(|c| match c {
            Constraint::Vertex { time_step, .. } => *time_step,
            Constraint::Edge { to_time_step, .. } => *to_time_step,
        })
        .max()
        .unwrap_or(0);

    let mut open = BinaryHeap::new();
    let mut closed = HashSet::new();
    let mut trace: HashMap<((usize, usize), usize), ((usize, usize), usize)> = HashMap::new();
    let mut best_g: HashMap<((usize, usize), usize), usize> = HashMap::new();

    let start_h = sic.dist(agent.agent_num, grid, agent.start.0, agent.start.1);
    open.push(LowLevelNode {
        position: agent.start,
        f_cost: start_h,
        g_cost: 0,
        time_step: 0,
    });
    best_g.insert((agent.start, 0), 0);

    while let Some(current) = open.pop() {
        stats.low_level_expanded += 1;

        if current.position == agent.goal && current.g_cost >= min_length {
            let path = construct_path(&trace, (current.position, current.time_step));
            return Some(TimedPath { positions: path });
        }

        closed.insert((current.position, current.time_step));

        // Once past every constraint's timestep, no further waiting can
        // avoid anything; demote to plain shortest-path search so time
        // stops advancing and `Wait` stops being generated (spec.md §4.4).
        let past_constraint_limit = current.time_step > constraint_limit;
        let tentative_g = current.g_cost + 1;
        let tentative_time = if past_constraint_limit {
            current.time_step
        } else {
            current.time_step + 1
        };

        for (neighbor, direction) in grid.neighbors(current.position.0, current.position.1, allowed_directions) {
            if direction == Direction::Wait && past_constraint_limit {
                continue;
            }

            if closed.contains(&(neighbor, tentative_time)) {
                continue;
            }

            if constraints
                .iter()
                .any(|c| c.is_violated(current.position, neighbor, tentative_time))
            {
                continue;
            }

            let key = (neighbor, tentative_time);
            if tentative_g < *best_g.get(&key).unwrap_or(&usize::MAX) {
                best_g.insert(key, tentative_g);
                trace.insert(key, (current.position, current.time_step));
                let h = sic.dist(agent.agent_num, grid, neighbor.0, neighbor.1);
                open.push(LowLevelNode {
                    position: neighbor,
                    f_cost: tentative_g + h,
                    g_cost: tentative_g,
                    time_step: tentative_time,
                });
            }
        }
    }

    None
}

fn construct_path(
    trace: &HashMap<((usize, usize), usize), ((usize, usize), usize)>,
    mut current: ((usize, usize), usize),
) -> Vec<(usize, usize)> {
    let mut path = vec![current.0];
    while let Some(&(pos, time)) = trace.get(&current) {
        path.push(pos);
        current = (pos, time);
    }
    path.reverse();
    path
}
