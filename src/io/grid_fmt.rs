//! Map file writers, the filesystem counterpart of `Grid::from_octile_file`
//! / `Grid::from_liron_file`.

use std::fs::File;
use std::io::Write;

use anyhow::{Context, Result};

use crate::grid::Grid;

pub fn write_octile_file(path: &str, grid: &Grid) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating map file {path}"))?;
    file.write_all(grid.to_octile_string().as_bytes())?;
    Ok(())
}

pub fn write_liron_file(path: &str, grid: &Grid) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("creating map file {path}"))?;
    file.write_all(grid.to_liron_string().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_the_octile_format() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("mapf_core_test_{}.map", std::process::id()));
        let path = path.to_str().unwrap();

        let grid = Grid::new(vec![vec![false, true], vec![false, false]]);
        write_octile_file(path, &grid).unwrap();
        let loaded = Grid::from_octile_file(path).unwrap();

        assert_eq!(loaded.width, grid.width);
        assert_eq!(loaded.height, grid.height);
        assert_eq!(loaded.num_locations(), grid.num_locations());
        std::fs::remove_file(path).ok();
    }
}
