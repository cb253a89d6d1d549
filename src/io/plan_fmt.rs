//! JSON export of a solved plan (spec.md §6 "combined" result format), for
//! consumers that want structured paths rather than the CSV stats row.

use std::fs::File;

use anyhow::{Context, Result};

use crate::plan::Plan;

pub fn write_plan_json(path: &str, plan: &Plan) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating plan file {path}"))?;
    serde_json::to_writer_pretty(file, plan).with_context(|| format!("writing plan json to {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowlevel::TimedPath;

    #[test]
    fn round_trips_a_plan_through_json() {
        let path = std::env::temp_dir().join(format!("mapf_core_test_{}.json", std::process::id()));
        let path = path.to_str().unwrap();

        let plan = Plan {
            paths: vec![TimedPath {
                positions: vec![(0, 0), (1, 0), (2, 0)],
            }],
        };
        write_plan_json(path, &plan).unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        let loaded: Plan = serde_json::from_str(&contents).unwrap();
        assert_eq!(loaded, plan);
        std::fs::remove_file(path).ok();
    }
}
