//! Library surface for `mapf_core`: the CLI binary (`main.rs`) is a thin
//! wrapper over this crate, and integration tests under `tests/` exercise
//! the same modules directly, following the lib/bin split the pack's
//! other multi-solver workspace (`solvers/mapf-core`) uses.

pub mod agent;
pub mod arena;
pub mod cbs;
pub mod conflict;
pub mod config;
pub mod epea;
pub mod grid;
pub mod heuristic;
pub mod instance;
pub mod io;
pub mod lowlevel;
pub mod movement;
pub mod plan;
pub mod stats;
pub mod world;
