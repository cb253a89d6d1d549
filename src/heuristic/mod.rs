//! Heuristic capability (spec.md §9 Design Notes: "model heuristics as a
//! capability: `init`, `h`, `clearStats`"). SIC (C4) and Pairs/SPC/MPC (C5)
//! are both variants of `JointHeuristic`.

pub mod pairs;
pub mod sic;

use crate::grid::Grid;
use crate::world::WorldState;

/// A heuristic over joint world states, immutable once built (spec.md §5).
///
/// `h` is the authoritative joint estimate consulted at every fully
/// committed node. `single_h` is a per-agent, always-admissible proxy used
/// by the EPEA* engine (C8) to bound partial-expansion branches cheaply
/// during Operator Decomposition; for SIC the two coincide exactly (their
/// sum over agents equals the joint value), for Pairs `single_h` is the
/// weaker SIC component the pair table is built from.
pub trait JointHeuristic {
    fn h(&self, grid: &Grid, state: &WorldState) -> usize;
    fn single_h(&self, grid: &Grid, agent: usize, x: usize, y: usize) -> usize;
}

impl JointHeuristic for sic::SicTable {
    fn h(&self, grid: &Grid, state: &WorldState) -> usize {
        sic::SicTable::h(self, grid, state)
    }

    fn single_h(&self, grid: &Grid, agent: usize, x: usize, y: usize) -> usize {
        self.dist(agent, grid, x, y)
    }
}
