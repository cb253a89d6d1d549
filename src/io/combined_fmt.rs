//! The "combined" instance format (spec.md §6): an optional `id,gridName`
//! line, a `Grid:` block (Liron-style `W,H` header then grid rows), and an
//! `Agents:` block (count then `agentNum,goalX,goalY,startX,startY` rows).
//! Lets a single file carry both the map and the agent set instead of the
//! two-file `.map`/`.scen` split. Grounded in the teacher's `scenario.rs`
//! line-oriented parsing style.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};

use anyhow::{bail, Context, Result};

use crate::agent::Agent;
use crate::grid::Grid;

/// A loaded combined file: the grid, its agents, and the optional
/// `id,gridName` header if the file carried one.
pub struct CombinedInstance {
    pub id: Option<String>,
    pub grid_name: Option<String>,
    pub grid: Grid,
    pub agents: Vec<Agent>,
}

pub fn load_combined_file(path: &str) -> Result<CombinedInstance> {
    let file = File::open(path).with_context(|| format!("opening combined file {path}"))?;
    let mut lines = BufReader::new(file).lines();

    let mut first = lines.next().context("empty combined file")??;
    let (id, grid_name) = if first.trim() == "Grid:" {
        (None, None)
    } else {
        let mut parts = first.splitn(2, ',');
        let id = parts.next().context("malformed id,gridName line")?.trim().to_string();
        let grid_name = parts.next().context("malformed id,gridName line")?.trim().to_string();
        first = lines.next().context("missing Grid: marker")??;
        (Some(id), Some(grid_name))
    };
    if first.trim() != "Grid:" {
        bail!("expected \"Grid:\" marker, found {first:?}");
    }

    let header = lines.next().context("missing W,H header")??;
    let mut header_parts = header.split(',');
    let width: usize = header_parts.next().context("missing width")?.trim().parse()?;
    let height: usize = header_parts.next().context("missing height")?.trim().parse()?;

    let mut obstacle = vec![vec![false; height]; width];
    for x in 0..width {
        let line = lines.next().with_context(|| format!("missing grid row {x}"))??;
        let row: Vec<char> = line.chars().collect();
        if row.len() < height {
            bail!("grid row {x} shorter than declared height {height}");
        }
        for y in 0..height {
            obstacle[x][y] = row[y] == '1';
        }
    }
    let grid = Grid::new(obstacle);

    let marker = lines.next().context("missing Agents: marker")??;
    if marker.trim() != "Agents:" {
        bail!("expected \"Agents:\" marker, found {marker:?}");
    }
    let count: usize = lines.next().context("missing agent count")??.trim().parse()?;

    let mut agents = Vec::with_capacity(count);
    for i in 0..count {
        let line = lines.next().with_context(|| format!("missing agent row {i}"))??;
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        anyhow::ensure!(parts.len() == 5, "malformed agent row {i}: {line}");
        let agent_num: usize = parts[0].parse()?;
        let goal = (parts[1].parse()?, parts[2].parse()?);
        let start = (parts[3].parse()?, parts[4].parse()?);
        agents.push(Agent::new(agent_num, start, goal));
    }

    Ok(CombinedInstance {
        id,
        grid_name,
        grid,
        agents,
    })
}

pub fn write_combined_file(path: &str, grid: &Grid, agents: &[Agent], id: Option<&str>, grid_name: Option<&str>) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating combined file {path}"))?;

    let mut out = String::new();
    if let (Some(id), Some(grid_name)) = (id, grid_name) {
        out.push_str(&format!("{id},{grid_name}\n"));
    }

    out.push_str("Grid:\n");
    out.push_str(&format!("{},{}\n", grid.width, grid.height));
    for x in 0..grid.width {
        for y in 0..grid.height {
            out.push(if grid.is_obstacle(x, y) { '1' } else { '0' });
        }
        out.push('\n');
    }

    out.push_str("Agents:\n");
    out.push_str(&format!("{}\n", agents.len()));
    for agent in agents {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            agent.agent_num, agent.goal.0, agent.goal.1, agent.start.0, agent.start.1
        ));
    }

    file.write_all(out.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("{name}_{}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn parses_a_combined_file_with_an_id_header() {
        let path = write_temp(
            "mapf_core_test.combined",
            "inst1,map1\nGrid:\n3,2\n000\n010\nAgents:\n1\n0,2,0,0,0\n",
        );
        let instance = load_combined_file(&path).unwrap();
        assert_eq!(instance.id.as_deref(), Some("inst1"));
        assert_eq!(instance.grid_name.as_deref(), Some("map1"));
        assert_eq!(instance.grid.width, 3);
        assert_eq!(instance.grid.height, 2);
        assert!(instance.grid.is_obstacle(1, 1));
        assert_eq!(instance.agents, vec![Agent::new(0, (0, 0), (2, 0))]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn parses_a_combined_file_without_an_id_header() {
        let path = write_temp("mapf_core_test2.combined", "Grid:\n2,2\n00\n00\nAgents:\n1\n0,1,1,0,0\n");
        let instance = load_combined_file(&path).unwrap();
        assert!(instance.id.is_none());
        assert!(instance.grid_name.is_none());
        assert_eq!(instance.agents, vec![Agent::new(0, (0, 0), (1, 1))]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn round_trips_grid_and_agents_through_write_and_load() {
        let grid = Grid::new(vec![vec![false, true], vec![false, false]]);
        let agents = vec![Agent::new(0, (0, 0), (1, 1))];
        let path = write_temp("mapf_core_test3.combined", "");
        write_combined_file(&path, &grid, &agents, Some("inst2"), Some("map2")).unwrap();

        let loaded = load_combined_file(&path).unwrap();
        assert_eq!(loaded.id.as_deref(), Some("inst2"));
        assert_eq!(loaded.grid.width, grid.width);
        assert_eq!(loaded.grid.height, grid.height);
        assert_eq!(loaded.agents, agents);
        std::fs::remove_file(path).ok();
    }
}
