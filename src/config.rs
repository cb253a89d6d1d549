//! CLI surface and run configuration (spec.md §6 Configuration flags, ambient
//! per SPEC_FULL.md A1). Grounded in the teacher's `config.rs`: a `clap`
//! derive struct plus a validated `Config` built from it.

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};

/// `sumOfCostsVariant` (spec.md §4.5/§6): selects cost accounting and the
/// ΔF formula used by the EPEA* engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CostVariant {
    /// Waits at the goal are counted in g once the agent has left it.
    Orig,
    /// Waiting at the goal is never counted; arrival time drops out of
    /// joint-state identity (spec.md §3).
    WaitingAtGoalAlwaysFree,
}

/// `cbsSplitMode` (spec.md §4.6/§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CbsSplitMode {
    Local,
    Disjoint,
}

/// Which pairwise aggregator the Pairs heuristic (C5) uses, when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PairsAggregator {
    Spc,
    Mpc,
}

/// Which heuristic the EPEA* / CBS low level should consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HeuristicKind {
    Sic,
    Pairs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TopLevelSolver {
    Cbs,
    Epea,
}

#[derive(Parser, Debug)]
#[command(
    name = "mapf-core",
    about = "EPEA*/CBS multi-agent path finding solver",
    author = "Moriarty Yu",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to the map file (octile or Liron format)")]
    pub map_path: String,

    #[arg(long, help = "Path to the scenario file (.scen, .agents, or combined)")]
    pub scen_path: String,

    #[arg(long, help = "Path to the CSV output file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Path to write the solved plan as JSON")]
    pub plan_output_path: Option<String>,

    #[arg(long, help = "Number of agents", default_value_t = 10)]
    pub num_agents: usize,

    #[arg(long, help = "Seed for the random number generator", default_value_t = 0)]
    pub seed: usize,

    #[arg(long, value_enum, help = "Top-level solver", default_value = "cbs")]
    pub solver: TopLevelSolver,

    #[arg(long, value_enum, default_value = "sic")]
    pub heuristic: HeuristicKind,

    #[arg(long, value_enum, default_value = "spc")]
    pub pairs_aggregator: PairsAggregator,

    #[arg(long, value_enum, default_value = "orig")]
    pub sum_of_costs_variant: CostVariant,

    #[arg(long, help = "5 = orthogonal+wait, 9 = +diagonals", default_value_t = 5)]
    pub allowed_directions: usize,

    #[arg(long, value_enum, default_value = "local")]
    pub cbs_split_mode: CbsSplitMode,

    #[arg(long, help = "CBS bypass (cost-neutral conflict reduction)", default_value_t = true)]
    pub bypass: bool,

    #[arg(long, help = "Wall-clock budget in milliseconds", default_value_t = 60_000)]
    pub time_budget_ms: u64,

    #[arg(long, default_value_t = 1000)]
    pub max_agents: usize,

    #[arg(long, default_value_t = 3)]
    pub max_fail_count: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub map_path: String,
    pub scen_path: String,
    pub output_path: Option<String>,
    pub plan_output_path: Option<String>,
    pub num_agents: usize,
    pub seed: usize,
    pub solver: TopLevelSolver,
    pub heuristic: HeuristicKind,
    pub pairs_aggregator: PairsAggregator,
    pub sum_of_costs_variant: CostVariant,
    pub allowed_directions: usize,
    pub cbs_split_mode: CbsSplitMode,
    pub bypass: bool,
    pub time_budget_ms: u64,
    pub max_agents: usize,
    pub max_fail_count: usize,
}

impl Config {
    pub fn new(cli: &Cli) -> Self {
        Config {
            map_path: cli.map_path.clone(),
            scen_path: cli.scen_path.clone(),
            output_path: cli.output_path.clone(),
            plan_output_path: cli.plan_output_path.clone(),
            num_agents: cli.num_agents,
            seed: cli.seed,
            solver: cli.solver,
            heuristic: cli.heuristic,
            pairs_aggregator: cli.pairs_aggregator,
            sum_of_costs_variant: cli.sum_of_costs_variant,
            allowed_directions: cli.allowed_directions,
            cbs_split_mode: cli.cbs_split_mode,
            bypass: cli.bypass,
            time_budget_ms: cli.time_budget_ms,
            max_agents: cli.max_agents,
            max_fail_count: cli.max_fail_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.allowed_directions != 5 && self.allowed_directions != 9 {
            return Err(anyhow!(
                "allowed_directions must be 5 or 9, got {}",
                self.allowed_directions
            ));
        }

        if self.num_agents == 0 {
            return Err(anyhow!("num_agents must be at least 1"));
        }

        if self.num_agents > self.max_agents {
            return Err(anyhow!(
                "num_agents {} exceeds max_agents {}",
                self.num_agents,
                self.max_agents
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            map_path: "m.map".into(),
            scen_path: "s.scen".into(),
            output_path: None,
            plan_output_path: None,
            num_agents: 5,
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
    fn rejects_bad_direction_count() {
        let mut cli = base_cli();
        cli.allowed_directions = 6;
        let config = Config::new(&cli);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_too_many_agents() {
        let mut cli = base_cli();
        cli.num_agents = 20;
        let config = Config::new(&cli);
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_valid_config() {
        let config = Config::new(&base_cli());
        assert!(config.validate().is_ok());
    }
}
