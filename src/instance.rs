//! A fully loaded, immutable problem instance (spec.md §3 Lifecycle):
//! grid, agents, and whichever heuristic table the configured solver
//! needs, built once per experiment and then shared read-only across the
//! run.

use std::collections::HashSet;

use anyhow::{bail, Result};

use crate::agent::Agent;
use crate::config::{Config, HeuristicKind};
use crate::grid::Grid;
use crate::heuristic::pairs::{Aggregator, PairsTable};
use crate::heuristic::sic::SicTable;
use crate::heuristic::JointHeuristic;

pub struct ProblemInstance {
    pub grid: Grid,
    pub agents: Vec<Agent>,
    pub sic: SicTable,
    pub heuristic: Box<dyn JointHeuristic>,
    /// Scenario id, carried through to `Stats`/CSV rows rather than looked
    /// up again from `Config` at report time.
    pub name: Option<String>,
    pub allowed_directions: usize,
}

impl ProblemInstance {
    pub fn build(grid: Grid, agents: Vec<Agent>, config: &Config) -> Result<Self> {
        check_initial_collisions(&grid, &agents)?;

        let sic = SicTable::build(&grid, &agents, config.allowed_directions)?;

        let heuristic: Box<dyn JointHeuristic> = match config.heuristic {
            HeuristicKind::Sic => Box::new(sic.clone()),
            HeuristicKind::Pairs => {
                let aggregator = match config.pairs_aggregator {
                    crate::config::PairsAggregator::Spc => Aggregator::Spc,
                    crate::config::PairsAggregator::Mpc => Aggregator::Mpc,
                };
                Box::new(PairsTable::build(
                    &grid,
                    &agents,
                    config.allowed_directions,
                    config.sum_of_costs_variant,
                    aggregator,
                )?)
            }
        };

        Ok(ProblemInstance {
            grid,
            agents,
            sic,
            heuristic,
            name: Some(config.scen_path.clone()),
            allowed_directions: config.allowed_directions,
        })
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }
}

/// Rejects an instance at load rather than letting it panic or silently
/// misbehave deeper in the heuristic builders (spec.md §7 "Initial
/// collision"): two agents sharing a start cell, or any start/goal lying
/// on an obstacle.
fn check_initial_collisions(grid: &Grid, agents: &[Agent]) -> Result<()> {
    let mut seen_starts = HashSet::new();
    for agent in agents {
        if !grid.is_traversable(agent.start.0, agent.start.1) {
            bail!("agent {} start {:?} lies on an obstacle", agent.agent_num, agent.start);
        }
        if !grid.is_traversable(agent.goal.0, agent.goal.1) {
            bail!("agent {} goal {:?} lies on an obstacle", agent.agent_num, agent.goal);
        }
        if !seen_starts.insert(agent.start) {
            bail!("two agents share start cell {:?}", agent.start);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Cli, CbsSplitMode, CostVariant, PairsAggregator, TopLevelSolver};

    fn base_cli() -> Cli {
        Cli {
            map_path: "m.map".into(),
            scen_path: "s.scen".into(),
            output_path: None,
            plan_output_path: None,
            num_agents: 2,
            seed: 0,
            solver: TopLevelSolver::Cbs,
            heuristic: HeuristicKind::Sic,
            pairs_aggregator: PairsAggregator::Spc,
            sum_of_costs_variant: CostVariant::Orig,
            allowed_directions: 5,
            cbs_split_mode: CbsSplitMode::Local,
            bypass: true,
            time_budget_ms: 1000,
            max_agents: 10,
            max_fail_count: 3,
        }
    }

    #[test]
    fn builds_sic_instance() {
        let grid = Grid::new(vec![vec![false; 3]; 3]);
        let agents = vec![Agent::new(0, (0, 0), (2, 2)), Agent::new(1, (2, 0), (0, 2))];
        let config = Config::new(&base_cli());
        let instance = ProblemInstance::build(grid, agents, &config).unwrap();
        assert_eq!(instance.num_agents(), 2);
    }

    #[test]
    fn builds_pairs_instance() {
        let grid = Grid::new(vec![vec![false; 3]; 3]);
        let agents = vec![Agent::new(0, (0, 0), (2, 2)), Agent::new(1, (2, 0), (0, 2))];
        let mut cli = base_cli();
        cli.heuristic = HeuristicKind::Pairs;
        let config = Config::new(&cli);
        let instance = ProblemInstance::build(grid, agents, &config).unwrap();
        assert_eq!(instance.num_agents(), 2);
    }

    #[test]
    fn rejects_an_unsolvable_instance() {
        // 1-row corridor with an obstacle column cutting it in half.
        let grid = Grid::new(vec![vec![false], vec![true], vec![false]]);
        let agents = vec![Agent::new(0, (0, 0), (2, 0))];
        let config = Config::new(&base_cli());
        assert!(ProblemInstance::build(grid, agents, &config).is_err());
    }

    #[test]
    fn rejects_two_agents_sharing_a_start_cell() {
        let grid = Grid::new(vec![vec![false; 3]; 3]);
        let agents = vec![Agent::new(0, (0, 0), (2, 2)), Agent::new(1, (0, 0), (0, 2))];
        let config = Config::new(&base_cli());
        assert!(ProblemInstance::build(grid, agents, &config).is_err());
    }

    #[test]
    fn rejects_a_start_cell_on_an_obstacle() {
        let mut obstacle = vec![vec![false; 3]; 3];
        obstacle[0][0] = true;
        let grid = Grid::new(obstacle);
        let agents = vec![Agent::new(0, (0, 0), (2, 2))];
        let config = Config::new(&base_cli());
        assert!(ProblemInstance::build(grid, agents, &config).is_err());
    }
}
