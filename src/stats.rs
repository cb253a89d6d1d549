//! Per-run statistics and CSV export (SPEC_FULL.md A3), grounded in the
//! teacher's `stat.rs`.

use std::fs::OpenOptions;
use std::io::Write;

use tracing::error;

use crate::config::Config;

/// Solver-run statistics (spec.md §5 "A solver run reports..."). Negative
/// outcomes are represented as `None`/`success = false` rather than sentinel
/// numbers, since Rust has `Option` where the original design used `-1`.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub success: bool,
    pub cost: usize,
    pub time_ms: u128,
    pub low_level_expanded: usize,
    pub low_level_generated: usize,
    pub high_level_expanded: usize,
    pub high_level_generated: usize,
    pub max_subgroup_size: usize,
    pub solution_depth: usize,
    pub timed_out: bool,
}

impl Stats {
    /// Append one CSV row: `map,scen,agents,solver,success,cost,time_ms,
    /// high_expanded,low_expanded,max_subgroup,depth`.
    pub fn append_csv(&self, config: &Config, output_path: &str) -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(output_path)?;

        let row = format!(
            "{},{},{},{:?},{},{},{},{},{},{},{}\n",
            config.map_path,
            config.scen_path,
            config.num_agents,
            config.solver,
            self.success,
            self.cost,
            self.time_ms,
            self.high_level_expanded,
            self.low_level_expanded,
            self.max_subgroup_size,
            self.solution_depth,
        );

        if let Err(e) = file.write_all(row.as_bytes()) {
            error!("failed to write stats row to '{output_path}': {e}");
            return Err(e.into());
        }
        Ok(())
    }
}
