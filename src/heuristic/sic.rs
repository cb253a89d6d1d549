//! Sum-of-Individual-Costs heuristic (spec.md C4).
//!
//! For each agent, a backward BFS from its goal over the 4- (or 8-)
//! connected traversable grid yields `dist[agent][cell]` and a best-move
//! table. Grounded in the teacher's `Map::heuristic_dji`
//! (`map.rs`), generalized from a single Dijkstra pass to one BFS per agent
//! plus the `opt_move` table the round-trip testable property needs.

use std::collections::VecDeque;

use anyhow::{bail, Result};

use crate::agent::Agent;
use crate::grid::Grid;
use crate::movement::Direction;
use crate::world::WorldState;

const UNREACHABLE: i64 = -1;

/// Immutable once built; shared read-only across nested solver invocations
/// (spec.md §5).
#[derive(Debug, Clone)]
pub struct SicTable {
    num_locations: usize,
    /// `dist[agent][cardinality(cell)]`; `-1` means unreachable.
    dist: Vec<Vec<i64>>,
    opt_move: Vec<Vec<Option<Direction>>>,
}

impl SicTable {
    /// Runs one BFS per agent. Returns an error (instance is unsolvable) if
    /// any agent's start cannot reach its goal.
    pub fn build(grid: &Grid, agents: &[Agent], allowed_directions: usize) -> Result<Self> {
        let num_locations = grid.num_locations();
        let mut dist = Vec::with_capacity(agents.len());
        let mut opt_move = Vec::with_capacity(agents.len());

        for agent in agents {
            let (d, m) = bfs_from_goal(grid, agent.goal, allowed_directions);
            let start_idx = grid
                .cardinality(agent.start.0, agent.start.1)
                .expect("start must be traversable");
            if d[start_idx] == UNREACHABLE {
                bail!(
                    "agent {} cannot reach its goal: instance is unsolvable",
                    agent.agent_num
                );
            }
            dist.push(d);
            opt_move.push(m);
        }

        Ok(SicTable {
            num_locations,
            dist,
            opt_move,
        })
    }

    pub fn dist(&self, agent: usize, grid: &Grid, x: usize, y: usize) -> usize {
        let idx = grid.cardinality(x, y).expect("cell must be traversable");
        let d = self.dist[agent][idx];
        debug_assert!(d >= 0, "heuristic lookup on unreachable cell");
        d as usize
    }

    pub fn opt_move(&self, agent: usize, grid: &Grid, x: usize, y: usize) -> Option<Direction> {
        let idx = grid.cardinality(x, y).expect("cell must be traversable");
        self.opt_move[agent][idx]
    }

    pub fn num_locations(&self) -> usize {
        self.num_locations
    }

    /// `h_SIC = Σᵢ dist[i][pos(i)]` (spec.md §4.2).
    pub fn h(&self, grid: &Grid, state: &WorldState) -> usize {
        state
            .agents
            .iter()
            .map(|a| self.dist(a.agent_num, grid, a.x, a.y))
            .sum()
    }
}

fn bfs_from_goal(
    grid: &Grid,
    goal: (usize, usize),
    allowed_directions: usize,
) -> (Vec<i64>, Vec<Option<Direction>>) {
    let n = grid.num_locations();
    let mut dist = vec![UNREACHABLE; n];
    let mut opt_move = vec![None; n];

    let goal_idx = grid
        .cardinality(goal.0, goal.1)
        .expect("goal must be traversable");
    dist[goal_idx] = 0;

    let mut queue = VecDeque::new();
    queue.push_back(goal);

    while let Some((x, y)) = queue.pop_front() {
        let cur_idx = grid.cardinality(x, y).unwrap();
        let cur_dist = dist[cur_idx];

        for (neighbor, direction) in grid.neighbors(x, y, allowed_directions) {
            if direction == Direction::Wait {
                continue; // waits are never expanded by the BFS (spec.md §4.2)
            }
            let idx = grid.cardinality(neighbor.0, neighbor.1).unwrap();
            if dist[idx] == UNREACHABLE {
                dist[idx] = cur_dist + 1;
                // The move from `neighbor` back toward the goal passes
                // through `(x, y)`, i.e. in direction `direction.opposite()`.
                opt_move[idx] = Some(direction.opposite());
                queue.push_back(neighbor);
            }
        }
    }

    (dist, opt_move)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_grid(w: usize, h: usize) -> Grid {
        Grid::new(vec![vec![false; h]; w])
    }

    #[test]
    fn dist_matches_manhattan_distance_on_open_grid() {
        let grid = open_grid(5, 5);
        let agents = vec![Agent::new(0, (0, 0), (4, 4))];
        let table = SicTable::build(&grid, &agents, 5).unwrap();
        assert_eq!(table.dist(0, &grid, 0, 0), 8);
        assert_eq!(table.dist(0, &grid, 4, 4), 0);
    }

    #[test]
    fn unreachable_goal_is_rejected() {
        // A single obstacle column separates (0,0) from (2,0).
        let grid = Grid::new(vec![
            vec![false, false],
            vec![true, true],
            vec![false, false],
        ]);
        let agents = vec![Agent::new(0, (0, 0), (2, 0))];
        assert!(SicTable::build(&grid, &agents, 5).is_err());
    }

    #[test]
    fn opt_move_round_trip_reaches_goal_in_dist_steps() {
        let grid = open_grid(6, 6);
        let agents = vec![Agent::new(0, (5, 5), (0, 0))];
        let table = SicTable::build(&grid, &agents, 5).unwrap();

        let (mut x, mut y) = (5usize, 5usize);
        let mut steps = 0;
        while (x, y) != (0, 0) {
            let d = table.opt_move(0, &grid, x, y).expect("must have a move");
            let (dx, dy) = d.delta();
            x = (x as i32 + dx) as usize;
            y = (y as i32 + dy) as usize;
            steps += 1;
            assert!(steps <= table.dist(0, &grid, 5, 5));
        }
        assert_eq!(steps, table.dist(0, &grid, 5, 5));
    }
}
