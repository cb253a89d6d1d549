//! A complete joint plan and its validator (spec.md C10).

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::conflict::all_conflicts;
use crate::grid::Grid;
use crate::lowlevel::TimedPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub paths: Vec<TimedPath>,
}

impl Plan {
    pub fn cost(&self) -> usize {
        self.paths.iter().map(|p| p.cost()).sum()
    }

    pub fn makespan(&self) -> usize {
        self.paths.iter().map(|p| p.positions.len() - 1).max().unwrap_or(0)
    }

    /// Re-checks every structural invariant a solved plan must hold
    /// (spec.md §4.7/§7 edge cases): each path starts and ends where its
    /// agent says it should, every step is a legal grid move (adjacent
    /// cell or wait) under `allowed_directions`, and no two agents ever
    /// collide.
    pub fn validate(&self, agents: &[Agent], grid: &Grid, allowed_directions: usize) -> Result<(), String> {
        if self.paths.len() != agents.len() {
            return Err(format!(
                "plan has {} paths for {} agents",
                self.paths.len(),
                agents.len()
            ));
        }

        for (path, agent) in self.paths.iter().zip(agents.iter()) {
            if path.positions.first() != Some(&agent.start) {
                return Err(format!("agent {} path does not start at its start cell", agent.agent_num));
            }
            if path.positions.last() != Some(&agent.goal) {
                return Err(format!("agent {} path does not end at its goal cell", agent.agent_num));
            }

            for pair in path.positions.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                if to == from {
                    continue;
                }
                let reachable = grid
                    .neighbors(from.0, from.1, allowed_directions)
                    .into_iter()
                    .any(|(pos, _)| pos == to);
                if !reachable {
                    return Err(format!(
                        "agent {} path steps from {:?} to {:?}, which is not a legal move",
                        agent.agent_num, from, to
                    ));
                }
            }
        }

        let conflicts = all_conflicts(&self.paths);
        if let Some(c) = conflicts.first() {
            return Err(format!("plan has an unresolved conflict: {c:?}"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(cells: &[(usize, usize)]) -> TimedPath {
        TimedPath {
            positions: cells.to_vec(),
        }
    }

    #[test]
    fn cost_is_sum_of_individual_path_lengths() {
        let plan = Plan {
            paths: vec![p(&[(0, 0), (1, 0)]), p(&[(0, 1), (1, 1), (2, 1)])],
        };
        assert_eq!(plan.cost(), 1 + 2);
        assert_eq!(plan.makespan(), 2);
    }

    fn open_grid(w: usize, h: usize) -> Grid {
        Grid::new(vec![vec![false; h]; w])
    }

    #[test]
    fn validate_rejects_a_plan_with_a_collision() {
        let grid = open_grid(3, 2);
        let agents = vec![Agent::new(0, (0, 0), (2, 0)), Agent::new(1, (2, 0), (0, 0))];
        let plan = Plan {
            paths: vec![p(&[(0, 0), (1, 0), (2, 0)]), p(&[(2, 0), (1, 0), (0, 0)])],
        };
        assert!(plan.validate(&agents, &grid, 5).is_err());
    }

    #[test]
    fn validate_accepts_a_conflict_free_plan() {
        let grid = open_grid(3, 2);
        let agents = vec![Agent::new(0, (0, 0), (2, 0)), Agent::new(1, (0, 1), (2, 1))];
        let plan = Plan {
            paths: vec![p(&[(0, 0), (1, 0), (2, 0)]), p(&[(0, 1), (1, 1), (2, 1)])],
        };
        assert!(plan.validate(&agents, &grid, 5).is_ok());
    }

    #[test]
    fn validate_rejects_a_path_that_teleports_over_a_non_adjacent_cell() {
        let grid = open_grid(3, 2);
        let agents = vec![Agent::new(0, (0, 0), (2, 0))];
        let plan = Plan {
            paths: vec![p(&[(0, 0), (2, 0)])],
        };
        let err = plan.validate(&agents, &grid, 5).unwrap_err();
        assert!(err.contains("not a legal move"));
    }
}
