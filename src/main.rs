use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mapf_core::config::{Cli, Config, TopLevelSolver};
use mapf_core::grid::Grid;
use mapf_core::instance::ProblemInstance;
use mapf_core::lowlevel::TimedPath;
use mapf_core::plan::Plan;
use mapf_core::stats::Stats;
use mapf_core::{agent, cbs, epea, io};

fn load_grid(map_path: &str) -> Result<Grid> {
    if map_path.ends_with(".map") {
        Grid::from_octile_file(map_path).with_context(|| format!("loading octile map {map_path}"))
    } else {
        Grid::from_liron_file(map_path).with_context(|| format!("loading liron map {map_path}"))
    }
}

fn load_agents(scen_path: &str, num_agents: usize, seed: usize) -> Result<Vec<agent::Agent>> {
    if scen_path.ends_with(".agents") {
        let mut agents = io::scenario::load_agents_file(scen_path)?;
        agents.truncate(num_agents);
        Ok(agents)
    } else {
        use rand::SeedableRng;
        let scenario = io::scenario::Scenario::load_from_scen(scen_path)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed as u64);
        scenario.generate_agents_randomly(num_agents, &mut rng)
    }
}

fn run_cbs(instance: &ProblemInstance, config: &Config, deadline: Instant, stats: &mut Stats) -> Option<Plan> {
    cbs::solve(
        &instance.grid,
        &instance.agents,
        &instance.sic,
        config.allowed_directions,
        config.cbs_split_mode,
        config.bypass,
        deadline,
        stats,
    )
}

fn run_epea(instance: &ProblemInstance, config: &Config, deadline: Instant, stats: &mut Stats) -> Option<Plan> {
    let solution = epea::solve(
        &instance.grid,
        &instance.agents,
        instance.heuristic.as_ref(),
        config.allowed_directions,
        config.sum_of_costs_variant,
        deadline,
        stats,
    )?;
    Some(Plan {
        paths: solution
            .paths
            .into_iter()
            .map(|positions| TimedPath { positions })
            .collect(),
    })
}

/// Loads the instance, dispatches to the configured solver under a
/// wall-clock deadline, and validates whatever comes back before reporting
/// success (spec.md §5/§6). The deadline is enforced inside the solver
/// itself (an elapsed-time check at each open-list pop), not by wrapping
/// this synchronous call in an external timer.
fn solve(config: Config) -> Result<Stats> {
    let grid = load_grid(&config.map_path)?;
    let agents = load_agents(&config.scen_path, config.num_agents, config.seed)?;
    let instance = ProblemInstance::build(grid, agents, &config)?;

    let mut stats = Stats::default();
    let start = Instant::now();
    let deadline = start + Duration::from_millis(config.time_budget_ms);

    let outcome = match config.solver {
        TopLevelSolver::Cbs => run_cbs(&instance, &config, deadline, &mut stats),
        TopLevelSolver::Epea => run_epea(&instance, &config, deadline, &mut stats),
    };

    stats.time_ms = start.elapsed().as_millis();

    if stats.timed_out {
        warn!(budget_ms = config.time_budget_ms, "solver exceeded its time budget");
        stats.success = false;
        return Ok(stats);
    }

    match outcome {
        None => {
            info!("instance has no collision-free joint plan");
            stats.success = false;
        }
        Some(plan) => {
            plan.validate(&instance.agents, &instance.grid, instance.allowed_directions)
                .map_err(|e| anyhow::anyhow!("solver returned an invalid plan: {e}"))?;
            stats.success = true;
            stats.cost = plan.cost();
            stats.solution_depth = plan.makespan();
            if let Some(plan_output_path) = &config.plan_output_path {
                io::plan_fmt::write_plan_json(plan_output_path, &plan)?;
            }
        }
    }

    Ok(stats)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::new(&cli);
    config.validate()?;

    let stats = solve(config.clone())?;

    info!(
        success = stats.success,
        cost = stats.cost,
        time_ms = stats.time_ms,
        "run complete"
    );

    if let Some(output_path) = &config.output_path {
        stats.append_csv(&config, output_path)?;
    }

    Ok(())
}
