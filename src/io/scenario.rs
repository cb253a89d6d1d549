//! Scenario file parsing: the MovingAI `.scen` bucketed-route format, and
//! the flat `.agents` format (spec.md §6: count header, then one
//! `goalX,goalY,startX,startY` per line). Grounded in the teacher's
//! `scenario.rs` (`Scenario::load_from_scen`, bucketed random sampling),
//! generalized from a single hardcoded column layout to our `Agent` type's
//! field names.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use anyhow::{Context, Result};
use rand::prelude::*;
use tracing::info;

use crate::agent::Agent;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

#[derive(Debug, Default)]
pub struct Scenario {
    pub map: String,
    pub map_width: usize,
    pub map_height: usize,
    pub buckets: HashMap<usize, Vec<Route>>,
}

impl Scenario {
    /// Parses a `.scen` file: a `version` header line, then one route per
    /// line as `bucket map width height start_y start_x goal_y goal_x ...`
    /// (spec.md §6).
    pub fn load_from_scen(path: &str) -> Result<Scenario> {
        let file = File::open(path).with_context(|| format!("opening scenario file {path}"))?;
        let mut lines = BufReader::new(file).lines();
        let _version = lines.next().context("missing version header")??;

        let mut scenario = Scenario::default();

        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 8 {
                continue;
            }
            let bucket_index: usize = parts[0].parse()?;

            if scenario.map.is_empty() {
                scenario.map = parts[1].to_string();
                scenario.map_width = parts[2].parse()?;
                scenario.map_height = parts[3].parse()?;
            }

            let route = Route {
                start: (parts[5].parse()?, parts[4].parse()?),
                goal: (parts[7].parse()?, parts[6].parse()?),
            };
            scenario.buckets.entry(bucket_index).or_default().push(route);
        }

        Ok(scenario)
    }

    /// One agent sampled from each requested bucket, without replacement
    /// within a bucket.
    pub fn generate_agents_by_buckets<R: Rng + ?Sized>(&self, agent_buckets: &[usize], rng: &mut R) -> Result<Vec<Agent>> {
        let mut agents = Vec::with_capacity(agent_buckets.len());
        let mut used: HashMap<usize, HashSet<usize>> = HashMap::new();

        for (agent_num, &bucket_index) in agent_buckets.iter().enumerate() {
            let bucket = self
                .buckets
                .get(&bucket_index)
                .with_context(|| format!("bucket {bucket_index} not found"))?;

            let available: Vec<usize> = (0..bucket.len())
                .filter(|idx| !used.get(&bucket_index).is_some_and(|u| u.contains(idx)))
                .collect();
            let &route_index = available
                .choose(rng)
                .with_context(|| format!("bucket {bucket_index} has no unused routes left"))?;

            let route = &bucket[route_index];
            agents.push(Agent::new(agent_num, route.start, route.goal));
            used.entry(bucket_index).or_default().insert(route_index);
        }

        info!(count = agents.len(), "generated agents from buckets");
        Ok(agents)
    }

    /// `num_agents` distinct routes drawn uniformly at random across every
    /// bucket, without replacement.
    pub fn generate_agents_randomly<R: Rng + ?Sized>(&self, num_agents: usize, rng: &mut R) -> Result<Vec<Agent>> {
        let mut available: Vec<Route> = self.buckets.values().flatten().cloned().collect();
        available.sort();
        anyhow::ensure!(
            available.len() >= num_agents,
            "only {} unique routes available for {num_agents} agents",
            available.len()
        );
        available.shuffle(rng);

        let agents: Vec<Agent> = available
            .into_iter()
            .take(num_agents)
            .enumerate()
            .map(|(agent_num, route)| Agent::new(agent_num, route.start, route.goal))
            .collect();

        info!(count = agents.len(), "generated agents at random");
        Ok(agents)
    }
}

/// Parses a flat `.agents` file (spec.md §6): first line is the agent
/// count, each following line `goalX,goalY,startX,startY`, agent index
/// assigned by line order.
pub fn load_agents_file(path: &str) -> Result<Vec<Agent>> {
    let file = File::open(path).with_context(|| format!("opening agents file {path}"))?;
    let mut lines = BufReader::new(file).lines();

    let count: usize = lines.next().context("missing agent count")??.trim().parse()?;
    let mut agents = Vec::with_capacity(count);

    for agent_num in 0..count {
        let line = lines
            .next()
            .with_context(|| format!("missing agents line {agent_num}"))??;
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        anyhow::ensure!(parts.len() == 4, "malformed agents line {agent_num}: {line}");
        let goal = (parts[0].parse()?, parts[1].parse()?);
        let start = (parts[2].parse()?, parts[3].parse()?);
        agents.push(Agent::new(agent_num, start, goal));
    }

    Ok(agents)
}

/// Writes the flat `.agents` format back out (spec.md §6 export formats).
pub fn write_agents_file(path: &str, agents: &[Agent]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating agents file {path}"))?;
    let mut out = format!("{}\n", agents.len());
    for agent in agents {
        out.push_str(&format!(
            "{},{},{},{}\n",
            agent.goal.0, agent.goal.1, agent.start.0, agent.start.1
        ));
    }
    file.write_all(out.as_bytes())?;
    Ok(())
}

/// Writes the `.scen` format back out (spec.md §6 export formats):
/// `version 1` header, then one tab-separated row per agent, all in bucket
/// 0, with `optimalCost` left at 0 since this writer has no solved plan to
/// draw it from.
pub fn write_scen_file(path: &str, map_name: &str, map_width: usize, map_height: usize, agents: &[Agent]) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating scen file {path}"))?;
    let mut out = String::from("version 1\n");
    for agent in agents {
        out.push_str(&format!(
            "0\t{map_name}\t{map_width}\t{map_height}\t{}\t{}\t{}\t{}\t0\n",
            agent.start.1, agent.start.0, agent.goal.1, agent.goal.0
        ));
    }
    file.write_all(out.as_bytes())?;
    Ok(())
}
