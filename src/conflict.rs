//! Pairwise conflict detection between single-agent timed paths (spec.md
//! C11), used by CBS (C9) to grow its constraint tree.

use crate::lowlevel::{Constraint, TimedPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Vertex {
        agent_a: usize,
        agent_b: usize,
        position: (usize, usize),
        time_step: usize,
    },
    Edge {
        agent_a: usize,
        agent_b: usize,
        position_a: (usize, usize),
        position_b: (usize, usize),
        time_step: usize,
    },
}

impl Conflict {
    /// The per-agent constraint a standard (non-disjoint) CBS split adds
    /// to forbid `agent` from repeating its half of this conflict
    /// (spec.md §4.6).
    pub fn constraint_for(&self, agent: usize) -> Constraint {
        match *self {
            Conflict::Vertex { position, time_step, .. } => Constraint::Vertex {
                position,
                time_step,
                is_permanent: false,
            },
            Conflict::Edge {
                agent_a,
                position_a,
                position_b,
                time_step,
                ..
            } => {
                if agent == agent_a {
                    Constraint::Edge {
                        from_position: position_a,
                        to_position: position_b,
                        to_time_step: time_step,
                    }
                } else {
                    Constraint::Edge {
                        from_position: position_b,
                        to_position: position_a,
                        to_time_step: time_step,
                    }
                }
            }
        }
    }

    pub fn agents(&self) -> (usize, usize) {
        match *self {
            Conflict::Vertex { agent_a, agent_b, .. } => (agent_a, agent_b),
            Conflict::Edge { agent_a, agent_b, .. } => (agent_a, agent_b),
        }
    }
}

/// Position of `path` at `time`, clamped to its last cell once the agent
/// has arrived (an agent "waits at goal" forever past the end of its own
/// plan, for conflict-checking purposes).
fn position_at(path: &TimedPath, time: usize) -> (usize, usize) {
    let idx = time.min(path.positions.len() - 1);
    path.positions[idx]
}

/// The first conflict between two agents' paths, in time order, or `None`
/// if they never collide. A vertex conflict is reported before an edge
/// conflict at the same timestep, matching the teacher's `find_conflict`
/// scan order.
pub fn first_conflict_between(agent_a: usize, path_a: &TimedPath, agent_b: usize, path_b: &TimedPath) -> Option<Conflict> {
    let makespan = path_a.positions.len().max(path_b.positions.len());

    for t in 0..makespan {
        let pos_a = position_at(path_a, t);
        let pos_b = position_at(path_b, t);
        if pos_a == pos_b {
            return Some(Conflict::Vertex {
                agent_a,
                agent_b,
                position: pos_a,
                time_step: t,
            });
        }

        if t == 0 {
            continue;
        }
        let prev_a = position_at(path_a, t - 1);
        let prev_b = position_at(path_b, t - 1);
        if prev_a == pos_b && prev_b == pos_a && prev_a != pos_a {
            return Some(Conflict::Edge {
                agent_a,
                agent_b,
                position_a: prev_a,
                position_b: prev_b,
                time_step: t,
            });
        }
    }

    None
}

/// Every pairwise conflict across a full set of paths, used for picking
/// which conflict to branch on (spec.md §4.6 cardinal/semi-cardinal
/// classification needs to see them all, not just the first).
pub fn all_conflicts(paths: &[TimedPath]) -> Vec<Conflict> {
    let mut out = Vec::new();
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            if let Some(c) = first_conflict_between(i, &paths[i], j, &paths[j]) {
                out.push(c);
            }
        }
    }
    out
}
